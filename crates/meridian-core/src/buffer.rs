//! Audio and event buffers plus the per-node buffer pool.
//!
//! [`AudioBuffer`] is a planar (channel-major) block of `f32` samples with a
//! fixed allocation and a resizable *active* shape, so a node can shrink or grow
//! its view of the block without touching the allocator. [`EventBuffer`] holds
//! timestamped [`MidiEvent`]s in a pre-reserved `Vec`.
//!
//! The [`BufferPool`] is the arena the executor hands out to nodes: one
//! [`NodeBuffers`] slot per node that owns its output, indexed by slot number.
//! Every slot has the same capacity (graph-wide maximum channel count × block
//! size), which is what makes swapping two slots a valid way to hand a buffer
//! from one node to the next.

#[cfg(not(feature = "std"))]
use alloc::vec;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// A planar multichannel audio block.
///
/// Samples for channel `c` live at `data[c * frame_capacity..][..num_frames]`.
/// The stride never changes after construction, so [`set_size()`](Self::set_size)
/// leaves existing sample data where it is.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    data: Vec<f32>,
    channel_capacity: usize,
    frame_capacity: usize,
    num_channels: usize,
    num_frames: usize,
}

impl AudioBuffer {
    /// Creates a zeroed buffer whose capacity and active shape are both
    /// `num_channels × num_frames`.
    pub fn new(num_channels: usize, num_frames: usize) -> Self {
        Self {
            data: vec![0.0; num_channels * num_frames],
            channel_capacity: num_channels,
            frame_capacity: num_frames,
            num_channels,
            num_frames,
        }
    }

    /// Builds a buffer from per-channel sample vectors.
    ///
    /// Shorter channels are zero-padded to the longest one.
    pub fn from_channels(channels: &[Vec<f32>]) -> Self {
        let num_frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        let mut buffer = Self::new(channels.len(), num_frames);
        for (ch, samples) in channels.iter().enumerate() {
            buffer.channel_mut(ch)[..samples.len()].copy_from_slice(samples);
        }
        buffer
    }

    /// Active channel count.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Active frame count.
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Maximum channel count this buffer can hold without reallocating.
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Maximum frame count this buffer can hold without reallocating.
    pub fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    /// Changes the active shape. Never allocates.
    ///
    /// Requests beyond capacity are clamped; the executor sizes every pool slot
    /// at prepare time so the clamp is never hit during playback.
    #[inline]
    pub fn set_size(&mut self, num_channels: usize, num_frames: usize) {
        debug_assert!(
            num_channels <= self.channel_capacity && num_frames <= self.frame_capacity,
            "requested {num_channels}x{num_frames}, capacity {}x{}",
            self.channel_capacity,
            self.frame_capacity
        );
        self.num_channels = num_channels.min(self.channel_capacity);
        self.num_frames = num_frames.min(self.frame_capacity);
    }

    /// Grows the allocation. Off the audio thread only.
    ///
    /// Existing contents are discarded and the active shape becomes the new
    /// capacity.
    pub fn reserve(&mut self, channel_capacity: usize, frame_capacity: usize) {
        self.data.clear();
        self.data.resize(channel_capacity * frame_capacity, 0.0);
        self.channel_capacity = channel_capacity;
        self.frame_capacity = frame_capacity;
        self.num_channels = channel_capacity;
        self.num_frames = frame_capacity;
    }

    /// Samples of one active channel.
    ///
    /// # Panics
    ///
    /// Panics if `channel >= num_channels()`.
    #[inline]
    pub fn channel(&self, channel: usize) -> &[f32] {
        assert!(channel < self.num_channels, "channel {channel} out of range");
        let start = channel * self.frame_capacity;
        &self.data[start..start + self.num_frames]
    }

    /// Mutable samples of one active channel.
    ///
    /// # Panics
    ///
    /// Panics if `channel >= num_channels()`.
    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        assert!(channel < self.num_channels, "channel {channel} out of range");
        let start = channel * self.frame_capacity;
        &mut self.data[start..start + self.num_frames]
    }

    /// Zeroes the active region.
    pub fn clear(&mut self) {
        for ch in 0..self.num_channels {
            self.channel_mut(ch).fill(0.0);
        }
    }

    /// Copies `other` into the active region of `self`.
    ///
    /// Channels and frames missing from `other` are zeroed.
    pub fn copy_from(&mut self, other: &AudioBuffer) {
        let frames = self.num_frames.min(other.num_frames);
        for ch in 0..self.num_channels {
            let dst = self.channel_mut(ch);
            if ch < other.num_channels {
                dst[..frames].copy_from_slice(&other.channel(ch)[..frames]);
                dst[frames..].fill(0.0);
            } else {
                dst.fill(0.0);
            }
        }
    }

    /// Adds `other` into `self` sample-by-sample (mix/accumulate).
    pub fn add_from(&mut self, other: &AudioBuffer) {
        let channels = self.num_channels.min(other.num_channels);
        for ch in 0..channels {
            for (dst, src) in self.channel_mut(ch).iter_mut().zip(other.channel(ch)) {
                *dst += *src;
            }
        }
    }

    /// Address of the first sample, for identity checks between nodes.
    #[inline]
    pub fn as_ptr(&self) -> *const f32 {
        self.data.as_ptr()
    }
}

/// A short MIDI message stamped with a block-relative frame offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    /// Frame offset within the block.
    pub frame: usize,
    /// Raw message bytes; unused trailing bytes are zero.
    pub message: [u8; 3],
}

impl MidiEvent {
    /// Creates an event from raw bytes.
    pub fn new(frame: usize, message: [u8; 3]) -> Self {
        Self { frame, message }
    }

    /// Note-on on `channel` (0-15).
    pub fn note_on(frame: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(frame, [0x90 | (channel & 0x0f), note & 0x7f, velocity & 0x7f])
    }

    /// Note-off on `channel` (0-15).
    pub fn note_off(frame: usize, channel: u8, note: u8) -> Self {
        Self::new(frame, [0x80 | (channel & 0x0f), note & 0x7f, 0])
    }

    /// True for a note-on with non-zero velocity.
    pub fn is_note_on(&self) -> bool {
        self.message[0] & 0xf0 == 0x90 && self.message[2] > 0
    }

    /// Returns a copy moved to a different frame.
    #[inline]
    pub fn at_frame(self, frame: usize) -> Self {
        Self { frame, ..self }
    }
}

/// Fixed-capacity list of [`MidiEvent`]s for one block.
///
/// The backing `Vec` is reserved once; [`push()`](Self::push) refuses to grow
/// it, so filling the buffer on the audio thread never allocates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBuffer {
    events: Vec<MidiEvent>,
}

impl EventBuffer {
    /// Creates an empty buffer able to hold `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Appends an event. Returns `false` (dropping it) when full.
    #[inline]
    pub fn push(&mut self, event: MidiEvent) -> bool {
        if self.events.len() == self.events.capacity() {
            return false;
        }
        self.events.push(event);
        true
    }

    /// Removes all events, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.events.capacity()
    }

    /// Events in insertion order.
    pub fn as_slice(&self) -> &[MidiEvent] {
        &self.events
    }

    /// Iterates the events in insertion order.
    pub fn iter(&self) -> core::slice::Iter<'_, MidiEvent> {
        self.events.iter()
    }

    /// Exchanges contents (and allocations) with `other`.
    #[inline]
    pub fn swap_with(&mut self, other: &mut EventBuffer) {
        core::mem::swap(&mut self.events, &mut other.events);
    }

    /// Replaces contents with a copy of `other`, truncated to capacity.
    pub fn copy_from(&mut self, other: &EventBuffer) {
        self.events.clear();
        let n = other.len().min(self.events.capacity());
        self.events.extend_from_slice(&other.events[..n]);
    }

    /// Stable in-place sort by frame. Insertion sort: event lists per block are
    /// short and `slice::sort` may allocate.
    pub fn sort_by_frame(&mut self) {
        for i in 1..self.events.len() {
            let mut j = i;
            while j > 0 && self.events[j - 1].frame > self.events[j].frame {
                self.events.swap(j - 1, j);
                j -= 1;
            }
        }
    }
}

impl<'a> IntoIterator for &'a EventBuffer {
    type Item = &'a MidiEvent;
    type IntoIter = core::slice::Iter<'a, MidiEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// The audio and event output of one node for one block.
#[derive(Debug, Clone)]
pub struct NodeBuffers {
    /// Audio output.
    pub audio: AudioBuffer,
    /// Event output.
    pub events: EventBuffer,
}

impl NodeBuffers {
    /// Allocates a slot with the given capacities.
    pub fn new(channel_capacity: usize, frame_capacity: usize, event_capacity: usize) -> Self {
        Self {
            audio: AudioBuffer::new(channel_capacity, frame_capacity),
            events: EventBuffer::with_capacity(event_capacity),
        }
    }

    /// Sets the active audio shape and clears audio and events.
    #[inline]
    pub fn reset(&mut self, num_channels: usize, num_frames: usize) {
        self.audio.set_size(num_channels, num_frames);
        self.audio.clear();
        self.events.clear();
    }

    /// Copies audio and events from `other`.
    pub fn copy_from(&mut self, other: &NodeBuffers) {
        self.audio.copy_from(&other.audio);
        self.events.copy_from(&other.events);
    }
}

/// Pool of node output slots, indexed by slot number.
///
/// Slots are assigned at prepare time: one per node that owns its output.
/// Nodes aliasing a single-consumer input share that input's slot instead.
pub struct BufferPool {
    slots: Vec<NodeBuffers>,
    channel_capacity: usize,
    frame_capacity: usize,
    event_capacity: usize,
}

impl BufferPool {
    /// Creates `count` slots with identical capacities.
    pub fn new(
        count: usize,
        channel_capacity: usize,
        frame_capacity: usize,
        event_capacity: usize,
    ) -> Self {
        let slots = (0..count)
            .map(|_| NodeBuffers::new(channel_capacity, frame_capacity, event_capacity))
            .collect();
        Self {
            slots,
            channel_capacity,
            frame_capacity,
            event_capacity,
        }
    }

    /// Number of slots.
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// Channel capacity of every slot.
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Frame capacity of every slot.
    pub fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    /// Event capacity of every slot.
    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    /// Returns the slot at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= count()`.
    #[inline]
    pub fn get(&self, idx: usize) -> &NodeBuffers {
        &self.slots[idx]
    }

    /// Returns the slot at `idx` mutably.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= count()`.
    #[inline]
    pub fn get_mut(&mut self, idx: usize) -> &mut NodeBuffers {
        &mut self.slots[idx]
    }

    /// Borrows one slot immutably and a different one mutably.
    ///
    /// # Panics
    ///
    /// Panics if `src == dst` or either index is out of range.
    #[inline]
    pub fn get_ref_and_mut(&mut self, src: usize, dst: usize) -> (&NodeBuffers, &mut NodeBuffers) {
        assert_ne!(src, dst, "get_ref_and_mut needs two distinct slots");
        if src < dst {
            let (lo, hi) = self.slots.split_at_mut(dst);
            (&lo[src], &mut hi[0])
        } else {
            let (lo, hi) = self.slots.split_at_mut(src);
            (&hi[0], &mut lo[dst])
        }
    }

    /// Exchanges two slots. Moves the allocations, copies no samples.
    #[inline]
    pub fn swap(&mut self, a: usize, b: usize) {
        self.slots.swap(a, b);
    }
}
