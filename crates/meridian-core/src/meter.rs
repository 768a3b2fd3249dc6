//! External meter interfaces and a lock-free level measurer.
//!
//! The graph talks to a meter through two narrow traits:
//!
//! - [`MeterPlugin`]: lifecycle (`initialise` / `deinitialise`) and settings of
//!   the external meter, shared between the graph and whoever displays it
//! - [`MeasurementSink`]: where the audio thread pushes each block
//!
//! [`LevelMeterPlugin`] and [`LevelMeasurer`] are the concrete pair. The
//! measurer computes per-channel peak and RMS on the audio thread and publishes
//! them with a single-writer sequence lock: the writer never waits, and a
//! reader on another thread spins with [`cpu::pause()`](crate::cpu::pause)
//! until it sees a consistent snapshot.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering, fence};

use crate::buffer::{AudioBuffer, EventBuffer};
use crate::cpu;

/// Channels a [`LevelMeasurer`] tracks. Extra channels are ignored.
pub const MAX_METER_CHANNELS: usize = 8;

/// Timing passed to [`MeterPlugin::initialise()`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InitialTimingInfo {
    /// Sample rate in Hz, `0.0` when not known.
    pub sample_rate: f64,
    /// Block size, `0` when not known.
    pub block_size: usize,
    /// Timeline position at start, in samples.
    pub start_position: i64,
}

/// Receives blocks from the audio thread.
///
/// All methods run on the audio thread and must not block or allocate.
pub trait MeasurementSink: Send + Sync {
    /// Measures one block of audio.
    fn process_buffer(&self, audio: &AudioBuffer);
    /// Measures one block of events.
    fn process_midi(&self, events: &EventBuffer);
    /// Enables or disables event activity tracking.
    fn set_show_midi(&self, show: bool);
}

/// An external meter shared between the graph and its display.
pub trait MeterPlugin: Send + Sync {
    /// Stable per-instance id, folded into the measuring node's identity.
    fn item_id(&self) -> u64;
    /// Prepares the meter. Called off the audio thread.
    fn initialise(&self, info: &InitialTimingInfo);
    /// Releases what `initialise` set up. Called off the audio thread.
    fn deinitialise(&self);
    /// True while the meter is not initialised.
    fn needs_initialising(&self) -> bool;
    /// Whether the display wants event activity.
    fn show_midi_activity(&self) -> bool;
    /// Where measured blocks go.
    fn measurer(&self) -> &dyn MeasurementSink;
}

#[inline]
fn load_f32(a: &AtomicU32) -> f32 {
    f32::from_bits(a.load(Ordering::Relaxed))
}

#[inline]
fn store_f32(a: &AtomicU32, v: f32) {
    a.store(v.to_bits(), Ordering::Relaxed);
}

/// Linear amplitude to dBFS, floored at -120 dB.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        -120.0
    } else {
        (20.0 * libm::log10f(linear)).max(-120.0)
    }
}

/// A consistent copy of the meter's published state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterReading {
    /// Channels measured in the last block.
    pub num_channels: usize,
    /// Per-channel absolute peak of the last block.
    pub peak: [f32; MAX_METER_CHANNELS],
    /// Per-channel RMS of the last block.
    pub rms: [f32; MAX_METER_CHANNELS],
    /// Blocks measured so far.
    pub blocks: u32,
}

impl MeterReading {
    /// Highest peak across channels.
    pub fn max_peak(&self) -> f32 {
        self.peak[..self.num_channels]
            .iter()
            .copied()
            .fold(0.0, f32::max)
    }

    /// Peak of `channel` in dBFS.
    pub fn peak_db(&self, channel: usize) -> f32 {
        linear_to_db(self.peak.get(channel).copied().unwrap_or(0.0))
    }

    /// RMS of `channel` in dBFS.
    pub fn rms_db(&self, channel: usize) -> f32 {
        linear_to_db(self.rms.get(channel).copied().unwrap_or(0.0))
    }
}

/// Per-channel peak/RMS meter written by the audio thread, read anywhere.
///
/// Only one thread may call [`process_buffer()`](MeasurementSink::process_buffer)
/// at a time.
#[derive(Debug)]
pub struct LevelMeasurer {
    sequence: AtomicU32,
    num_channels: AtomicUsize,
    blocks: AtomicU32,
    peak: [AtomicU32; MAX_METER_CHANNELS],
    rms: [AtomicU32; MAX_METER_CHANNELS],
    held_peak: [AtomicU32; MAX_METER_CHANNELS],
    show_midi: AtomicBool,
    midi_events: AtomicU32,
}

impl Default for LevelMeasurer {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelMeasurer {
    /// Creates a silent meter.
    pub fn new() -> Self {
        Self {
            sequence: AtomicU32::new(0),
            num_channels: AtomicUsize::new(0),
            blocks: AtomicU32::new(0),
            peak: [const { AtomicU32::new(0) }; MAX_METER_CHANNELS],
            rms: [const { AtomicU32::new(0) }; MAX_METER_CHANNELS],
            held_peak: [const { AtomicU32::new(0) }; MAX_METER_CHANNELS],
            show_midi: AtomicBool::new(false),
            midi_events: AtomicU32::new(0),
        }
    }

    /// Returns the last published block's levels.
    ///
    /// Spins while a write is in progress; never called from the audio thread.
    pub fn snapshot(&self) -> MeterReading {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before & 1 == 1 {
                cpu::pause();
                continue;
            }

            let mut reading = MeterReading {
                num_channels: self.num_channels.load(Ordering::Relaxed),
                blocks: self.blocks.load(Ordering::Relaxed),
                ..MeterReading::default()
            };
            for ch in 0..MAX_METER_CHANNELS {
                reading.peak[ch] = load_f32(&self.peak[ch]);
                reading.rms[ch] = load_f32(&self.rms[ch]);
            }

            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == before {
                return reading;
            }
            cpu::pause();
        }
    }

    /// Highest peak on `channel` since the last call, then resets it.
    pub fn take_peak(&self, channel: usize) -> f32 {
        self.held_peak
            .get(channel)
            .map_or(0.0, |a| f32::from_bits(a.swap(0, Ordering::AcqRel)))
    }

    /// Events seen while event activity was shown.
    pub fn midi_activity(&self) -> u32 {
        self.midi_events.load(Ordering::Relaxed)
    }

    /// Whether event activity is being counted.
    pub fn shows_midi(&self) -> bool {
        self.show_midi.load(Ordering::Relaxed)
    }

    /// Zeroes levels, held peaks and counters.
    pub fn reset(&self) {
        self.publish(0, &[0.0; MAX_METER_CHANNELS], &[0.0; MAX_METER_CHANNELS]);
        self.blocks.store(0, Ordering::Relaxed);
        for held in &self.held_peak {
            held.store(0, Ordering::Relaxed);
        }
        self.midi_events.store(0, Ordering::Relaxed);
    }

    fn publish(
        &self,
        num_channels: usize,
        peak: &[f32; MAX_METER_CHANNELS],
        rms: &[f32; MAX_METER_CHANNELS],
    ) {
        let seq = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.num_channels.store(num_channels, Ordering::Relaxed);
        for ch in 0..MAX_METER_CHANNELS {
            store_f32(&self.peak[ch], peak[ch]);
            store_f32(&self.rms[ch], rms[ch]);
        }
        self.blocks.fetch_add(1, Ordering::Relaxed);

        self.sequence.store(seq.wrapping_add(2), Ordering::Release);
    }
}

impl MeasurementSink for LevelMeasurer {
    fn process_buffer(&self, audio: &AudioBuffer) {
        let channels = audio.num_channels().min(MAX_METER_CHANNELS);
        let mut peak = [0.0f32; MAX_METER_CHANNELS];
        let mut rms = [0.0f32; MAX_METER_CHANNELS];

        let frames = audio.num_frames();
        for ch in 0..channels {
            let mut sum_sq = 0.0f32;
            for &s in audio.channel(ch) {
                peak[ch] = peak[ch].max(s.abs());
                sum_sq += s * s;
            }
            if frames > 0 {
                rms[ch] = libm::sqrtf(sum_sq / frames as f32);
            }
            // Non-negative floats order the same as their bit patterns.
            self.held_peak[ch].fetch_max(peak[ch].to_bits(), Ordering::AcqRel);
        }

        self.publish(channels, &peak, &rms);
    }

    fn process_midi(&self, events: &EventBuffer) {
        if self.show_midi.load(Ordering::Relaxed) && !events.is_empty() {
            self.midi_events
                .fetch_add(events.len() as u32, Ordering::Relaxed);
        }
    }

    fn set_show_midi(&self, show: bool) {
        self.show_midi.store(show, Ordering::Relaxed);
    }
}

/// A level meter with an initialisation lifecycle.
#[derive(Debug)]
pub struct LevelMeterPlugin {
    item_id: u64,
    initialised: AtomicBool,
    initialise_calls: AtomicUsize,
    deinitialise_calls: AtomicUsize,
    sample_rate_bits: AtomicU32,
    show_midi: AtomicBool,
    measurer: LevelMeasurer,
}

impl LevelMeterPlugin {
    /// Creates an uninitialised meter with the given item id.
    pub fn new(item_id: u64) -> Self {
        Self {
            item_id,
            initialised: AtomicBool::new(false),
            initialise_calls: AtomicUsize::new(0),
            deinitialise_calls: AtomicUsize::new(0),
            sample_rate_bits: AtomicU32::new(0),
            show_midi: AtomicBool::new(false),
            measurer: LevelMeasurer::new(),
        }
    }

    /// The concrete measurer, for reading levels.
    pub fn levels(&self) -> &LevelMeasurer {
        &self.measurer
    }

    /// Turns event activity display on or off.
    pub fn set_show_midi_activity(&self, show: bool) {
        self.show_midi.store(show, Ordering::Relaxed);
    }

    /// Sample rate from the last `initialise`.
    pub fn sample_rate(&self) -> f32 {
        f32::from_bits(self.sample_rate_bits.load(Ordering::Relaxed))
    }

    /// How many times `initialise` ran.
    pub fn initialise_count(&self) -> usize {
        self.initialise_calls.load(Ordering::Acquire)
    }

    /// How many times `deinitialise` ran.
    pub fn deinitialise_count(&self) -> usize {
        self.deinitialise_calls.load(Ordering::Acquire)
    }
}

impl MeterPlugin for LevelMeterPlugin {
    fn item_id(&self) -> u64 {
        self.item_id
    }

    fn initialise(&self, info: &InitialTimingInfo) {
        self.sample_rate_bits
            .store((info.sample_rate as f32).to_bits(), Ordering::Relaxed);
        self.measurer.reset();
        self.initialise_calls.fetch_add(1, Ordering::AcqRel);
        self.initialised.store(true, Ordering::Release);
    }

    fn deinitialise(&self) {
        self.initialised.store(false, Ordering::Release);
        self.deinitialise_calls.fetch_add(1, Ordering::AcqRel);
    }

    fn needs_initialising(&self) -> bool {
        !self.initialised.load(Ordering::Acquire)
    }

    fn show_midi_activity(&self) -> bool {
        self.show_midi.load(Ordering::Relaxed)
    }

    fn measurer(&self) -> &dyn MeasurementSink {
        &self.measurer
    }
}
