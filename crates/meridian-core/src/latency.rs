//! Fixed-delay buffering for audio and events.
//!
//! A [`LatencyProcessor`] sits on a signal path that reaches a join point
//! earlier than its siblings. Each block the owner writes its input in and reads
//! the same number of frames back out, `n` samples later, so the path lines up
//! with one whose intrinsic latency is `n` samples larger.
//!
//! Storage is a per-channel ring of `n + block_size` frames allocated in
//! [`prepare_to_play()`](LatencyProcessor::prepare_to_play) and primed with `n`
//! frames of silence. Writes and reads after that never allocate.
//!
//! Event timestamps are stored relative to the read head: a write adds `n` to
//! each event's block-relative frame, a read pops everything due inside the
//! requested frame count and rebases the rest.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use crate::buffer::{AudioBuffer, EventBuffer, MidiEvent};
use crate::graph::GraphError;

/// Default number of pending events held per block of delay.
pub const DEFAULT_EVENTS_PER_BLOCK: usize = 256;

/// Delays audio and events by a fixed number of samples.
#[derive(Debug, Clone)]
pub struct LatencyProcessor {
    latency_num_samples: Option<usize>,
    events_per_block: usize,
    sample_rate: f64,
    block_size: usize,
    num_channels: usize,
    capacity: usize,
    audio: Vec<f32>,
    read_pos: usize,
    write_pos: usize,
    num_ready: usize,
    events: Vec<MidiEvent>,
}

impl Default for LatencyProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyProcessor {
    /// Creates an unconfigured processor. Call
    /// [`set_latency_num_samples()`](Self::set_latency_num_samples) and then
    /// [`prepare_to_play()`](Self::prepare_to_play) before use.
    pub fn new() -> Self {
        Self {
            latency_num_samples: None,
            events_per_block: DEFAULT_EVENTS_PER_BLOCK,
            sample_rate: 0.0,
            block_size: 0,
            num_channels: 0,
            capacity: 0,
            audio: Vec::new(),
            read_pos: 0,
            write_pos: 0,
            num_ready: 0,
            events: Vec::new(),
        }
    }

    /// Sets how many events one block may carry. Takes effect at the next
    /// [`prepare_to_play()`](Self::prepare_to_play).
    pub fn with_events_per_block(mut self, events_per_block: usize) -> Self {
        self.events_per_block = events_per_block;
        self
    }

    /// Configures the delay. Takes effect at the next
    /// [`prepare_to_play()`](Self::prepare_to_play).
    pub fn set_latency_num_samples(&mut self, num_samples: usize) {
        self.latency_num_samples = Some(num_samples);
    }

    /// Configured delay in samples, or `None` if never set.
    pub fn latency_num_samples(&self) -> Option<usize> {
        self.latency_num_samples
    }

    /// Sample rate passed to the last successful prepare.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Block size passed to the last successful prepare.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Channel count passed to the last successful prepare.
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Frames per channel the ring can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames written and not yet read, including the priming silence.
    pub fn num_ready(&self) -> usize {
        self.num_ready
    }

    /// Events currently waiting to be read.
    pub fn num_pending_events(&self) -> usize {
        self.events.len()
    }

    /// Allocates storage for `latency + block_size` frames per channel and
    /// primes the ring with `latency` frames of silence.
    ///
    /// # Errors
    ///
    /// - [`GraphError::LatencyNotConfigured`] if no latency was set
    /// - [`GraphError::InvalidBlockSize`] if `block_size` is zero
    /// - [`GraphError::InvalidSampleRate`] if `sample_rate` is not finite and positive
    pub fn prepare_to_play(
        &mut self,
        sample_rate: f64,
        block_size: usize,
        num_channels: usize,
    ) -> Result<(), GraphError> {
        let latency = self
            .latency_num_samples
            .ok_or(GraphError::LatencyNotConfigured)?;
        if block_size == 0 {
            return Err(GraphError::InvalidBlockSize(block_size));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(GraphError::InvalidSampleRate);
        }

        self.sample_rate = sample_rate;
        self.block_size = block_size;
        self.num_channels = num_channels;
        self.capacity = latency + block_size;
        self.audio = vec![0.0; self.capacity * num_channels];

        let blocks_in_flight = latency.div_ceil(block_size) + 1;
        self.events = Vec::with_capacity(self.events_per_block * blocks_in_flight);

        self.reset_cursors(latency);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            latency,
            block_size,
            num_channels,
            capacity = self.capacity,
            "latency_prepare"
        );
        Ok(())
    }

    /// Drops all buffered data and returns to the freshly primed state.
    pub fn clear(&mut self) {
        self.audio.fill(0.0);
        self.events.clear();
        self.reset_cursors(self.latency_num_samples.unwrap_or(0));
    }

    fn reset_cursors(&mut self, latency: usize) {
        self.read_pos = 0;
        self.write_pos = if self.capacity == 0 {
            0
        } else {
            latency % self.capacity
        };
        self.num_ready = latency.min(self.capacity);
    }

    /// Appends one block of audio.
    ///
    /// Writing more than the ring can hold overwrites the oldest unread
    /// frames. Input channels beyond [`num_channels()`](Self::num_channels)
    /// are ignored; missing ones are written as silence.
    pub fn write_audio(&mut self, input: &AudioBuffer) {
        if self.capacity == 0 {
            return;
        }
        let frames = input.num_frames().min(self.capacity);

        for ch in 0..self.num_channels {
            let ring = &mut self.audio[ch * self.capacity..(ch + 1) * self.capacity];
            let first = frames.min(self.capacity - self.write_pos);
            if ch < input.num_channels() {
                let src = &input.channel(ch)[..frames];
                ring[self.write_pos..self.write_pos + first].copy_from_slice(&src[..first]);
                ring[..frames - first].copy_from_slice(&src[first..]);
            } else {
                ring[self.write_pos..self.write_pos + first].fill(0.0);
                ring[..frames - first].fill(0.0);
            }
        }

        self.write_pos = (self.write_pos + frames) % self.capacity;
        let total = self.num_ready + frames;
        if total > self.capacity {
            let overrun = total - self.capacity;
            self.read_pos = (self.read_pos + overrun) % self.capacity;
            self.num_ready = self.capacity;
        } else {
            self.num_ready = total;
        }
    }

    /// Reads `output.num_frames()` frames of delayed audio into `output`,
    /// replacing its contents.
    ///
    /// Frames not yet written read as silence.
    pub fn read_audio_overwriting(&mut self, output: &mut AudioBuffer) {
        let frames = output.num_frames();
        let available = self.num_ready.min(frames);

        for ch in 0..output.num_channels() {
            let dst = output.channel_mut(ch);
            if ch >= self.num_channels {
                dst.fill(0.0);
                continue;
            }
            let ring = &self.audio[ch * self.capacity..(ch + 1) * self.capacity];
            let first = available.min(self.capacity - self.read_pos);
            dst[..first].copy_from_slice(&ring[self.read_pos..self.read_pos + first]);
            dst[first..available].copy_from_slice(&ring[..available - first]);
            dst[available..].fill(0.0);
        }

        if self.capacity > 0 {
            self.read_pos = (self.read_pos + available) % self.capacity;
        }
        self.num_ready -= available;
    }

    /// Queues one block of events, shifted later by the configured delay.
    ///
    /// Events beyond the pending capacity are dropped.
    pub fn write_midi(&mut self, input: &EventBuffer) {
        let latency = self.latency_num_samples.unwrap_or(0);
        for event in input {
            if self.events.len() == self.events.capacity() {
                break;
            }
            self.events.push(event.at_frame(event.frame + latency));
        }
    }

    /// Moves every event due within the next `num_frames` into `output`
    /// (appending, block-relative) and rebases the rest.
    ///
    /// Due events that do not fit in `output` stay pending and fall due at
    /// frame 0 of the next read.
    pub fn read_midi(&mut self, output: &mut EventBuffer, num_frames: usize) {
        let mut kept = 0;
        for i in 0..self.events.len() {
            let event = self.events[i];
            if event.frame < num_frames && output.push(event) {
                continue;
            }
            self.events[kept] = event.at_frame(event.frame.saturating_sub(num_frames));
            kept += 1;
        }
        self.events.truncate(kept);
    }
}
