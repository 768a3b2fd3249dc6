//! Source node that plays a waveform and timestamped events.
//!
//! Output is a pure function of the timeline position handed to
//! [`process()`](crate::graph::Node::process), so two blocks covering the same
//! range always produce the same samples.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use core::f64::consts::TAU;

use crate::buffer::MidiEvent;
use crate::graph::{
    BufferStrategy, GraphError, Node, NodeId, NodeProperties, NodeTable,
    PlaybackInitialisationInfo, ProcessContext, hash_combine,
};

/// Type component of a signal node's identity hash.
pub const SIGNAL_TYPE_ID: u64 = 0x51a7_c0de_0000_0001;

/// What a [`SignalNode`] plays.
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    /// Preloaded samples, one `Vec` per channel.
    Samples(Vec<Vec<f32>>),
    /// Sine wave on every channel.
    Sine {
        /// Frequency in Hz.
        frequency_hz: f64,
        /// Peak amplitude.
        amplitude: f32,
    },
    /// One sample of `amplitude` every `period` samples, starting at zero.
    ImpulseTrain {
        /// Samples between impulses.
        period: usize,
        /// Impulse height.
        amplitude: f32,
    },
}

/// A source node with no inputs.
#[derive(Debug, Clone)]
pub struct SignalNode {
    item_id: u64,
    num_channels: usize,
    waveform: Waveform,
    events: Vec<MidiEvent>,
    length: Option<usize>,
    sample_rate: f64,
}

impl SignalNode {
    /// Plays `waveform` on `num_channels` channels.
    ///
    /// `item_id` identifies the instance; `0` makes every node downstream
    /// uncacheable.
    pub fn new(item_id: u64, num_channels: usize, waveform: Waveform) -> Self {
        Self {
            item_id,
            num_channels,
            waveform,
            events: Vec::new(),
            length: None,
            sample_rate: 0.0,
        }
    }

    /// Plays preloaded per-channel samples once.
    pub fn from_samples(item_id: u64, channels: Vec<Vec<f32>>) -> Self {
        let length = channels.iter().map(Vec::len).max().unwrap_or(0);
        Self::new(item_id, channels.len(), Waveform::Samples(channels)).with_length(length)
    }

    /// Continuous sine wave.
    pub fn sine(item_id: u64, num_channels: usize, frequency_hz: f64, amplitude: f32) -> Self {
        Self::new(
            item_id,
            num_channels,
            Waveform::Sine {
                frequency_hz,
                amplitude,
            },
        )
    }

    /// Unit impulse every `period` samples.
    pub fn impulse_train(item_id: u64, num_channels: usize, period: usize) -> Self {
        Self::new(
            item_id,
            num_channels,
            Waveform::ImpulseTrain {
                period: period.max(1),
                amplitude: 1.0,
            },
        )
    }

    /// Stops output (audio and events) after `length` samples.
    #[must_use]
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Adds events stamped with absolute timeline frames.
    #[must_use]
    pub fn with_events(mut self, mut events: Vec<MidiEvent>) -> Self {
        self.events.append(&mut events);
        self.events.sort_by_key(|e| e.frame);
        self
    }

    /// The instance id.
    pub fn item_id(&self) -> u64 {
        self.item_id
    }

    fn sample_at(&self, channel: usize, position: usize) -> f32 {
        if self.length.is_some_and(|len| position >= len) {
            return 0.0;
        }
        match &self.waveform {
            Waveform::Samples(channels) => channels
                .get(channel)
                .and_then(|c| c.get(position))
                .copied()
                .unwrap_or(0.0),
            Waveform::Sine {
                frequency_hz,
                amplitude,
            } => {
                if self.sample_rate <= 0.0 {
                    return 0.0;
                }
                let phase = TAU * frequency_hz * position as f64 / self.sample_rate;
                amplitude * libm::sin(phase) as f32
            }
            Waveform::ImpulseTrain { period, amplitude } => {
                if position % period == 0 {
                    *amplitude
                } else {
                    0.0
                }
            }
        }
    }
}

impl Node for SignalNode {
    fn name(&self) -> &str {
        "signal"
    }

    fn node_properties(&self, _graph: &NodeTable<'_>) -> NodeProperties {
        let node_id = if self.item_id == 0 {
            0
        } else {
            let mut seed = SIGNAL_TYPE_ID;
            hash_combine(&mut seed, self.item_id);
            seed
        };
        NodeProperties {
            node_id,
            number_of_channels: self.num_channels,
            latency_num_samples: 0,
        }
    }

    fn direct_input_nodes(&self) -> &[NodeId] {
        &[]
    }

    fn prepare_to_play(
        &mut self,
        info: &PlaybackInitialisationInfo<'_>,
    ) -> Result<BufferStrategy, GraphError> {
        self.sample_rate = info.sample_rate;
        Ok(BufferStrategy::Exclusive)
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let range = ctx.reference_sample_range();
        let start = range.start.max(0) as usize;
        let end = range.end.max(0) as usize;

        {
            let audio = &mut ctx.output().audio;
            for ch in 0..audio.num_channels() {
                let samples = audio.channel_mut(ch);
                for (i, s) in samples.iter_mut().enumerate() {
                    *s = self.sample_at(ch, start + i);
                }
            }
        }

        let limit = self.length.map_or(end, |len| end.min(len));
        let first = self.events.partition_point(|e| e.frame < start);
        let events = &mut ctx.output().events;
        for event in self.events[first..].iter().take_while(|e| e.frame < limit) {
            events.push(event.at_frame(event.frame - start));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_item_id_is_uncacheable() {
        let node = SignalNode::sine(0, 2, 440.0, 0.5);
        assert_eq!(node.node_properties(&NodeTable::default()).node_id, 0);
    }

    #[test]
    fn identity_depends_on_item_id() {
        let a = SignalNode::sine(1, 2, 440.0, 0.5).node_properties(&NodeTable::default());
        let b = SignalNode::sine(2, 2, 440.0, 0.5).node_properties(&NodeTable::default());
        assert_ne!(a.node_id, b.node_id);
        assert_eq!(a.number_of_channels, 2);
    }

    #[test]
    fn impulse_train_respects_length() {
        let node = SignalNode::impulse_train(1, 1, 4).with_length(8);
        let samples: Vec<f32> = (0..12).map(|i| node.sample_at(0, i)).collect();
        assert_eq!(
            samples,
            vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn sample_playback_pads_short_channels() {
        let node = SignalNode::from_samples(3, vec![vec![1.0, 2.0, 3.0], vec![4.0]]);
        assert_eq!(node.sample_at(0, 2), 3.0);
        assert_eq!(node.sample_at(1, 2), 0.0);
        assert_eq!(node.sample_at(0, 3), 0.0);
    }
}
