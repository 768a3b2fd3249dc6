//! Property-based tests for meridian-core.
//!
//! Uses proptest to check structural identity hashing across randomly built
//! chains and the exactness of the latency processor for arbitrary delays,
//! block sizes and channel counts.

use std::sync::Arc;

use meridian_core::buffer::{AudioBuffer, EventBuffer, MidiEvent};
use meridian_core::graph::{NodeGraph, NodeId};
use meridian_core::meter::LevelMeterPlugin;
use meridian_core::nodes::{LatencyNode, LevelMeasurerNode, SignalNode};
use meridian_core::LatencyProcessor;
use proptest::prelude::*;

/// One stage of a randomly built chain.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Latency { item_id: u64, samples: usize },
    Meter { item_id: u64 },
}

fn stage() -> impl Strategy<Value = Stage> {
    prop_oneof![
        (1u64..u64::MAX, 0usize..512)
            .prop_map(|(item_id, samples)| Stage::Latency { item_id, samples }),
        (1u64..u64::MAX).prop_map(|item_id| Stage::Meter { item_id }),
    ]
}

/// Builds source -> stages... and returns the root's `node_id`.
fn root_identity(source_item: u64, stages: &[Stage]) -> u64 {
    let mut graph = NodeGraph::new();
    let mut last: NodeId = graph.add(SignalNode::sine(source_item, 2, 440.0, 0.5)).unwrap();
    for stage in stages {
        last = match *stage {
            Stage::Latency { item_id, samples } => {
                graph.add(LatencyNode::new(last, item_id, samples)).unwrap()
            }
            Stage::Meter { item_id } => graph
                .add(LevelMeasurerNode::new(last, Arc::new(LevelMeterPlugin::new(item_id))))
                .unwrap(),
        };
    }
    graph.node_properties(last).unwrap().node_id
}

fn mutate(stage: Stage, delta: u64) -> Stage {
    match stage {
        Stage::Latency { item_id, samples } => Stage::Latency {
            item_id: item_id.wrapping_add(delta).max(1),
            samples,
        },
        Stage::Meter { item_id } => Stage::Meter {
            item_id: item_id.wrapping_add(delta).max(1),
        },
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Identical structure and identity values hash identically.
    #[test]
    fn identical_chains_share_identity(
        source in 1u64..u64::MAX,
        stages in prop::collection::vec(stage(), 0..8),
    ) {
        prop_assert_eq!(root_identity(source, &stages), root_identity(source, &stages));
    }

    /// Changing any single identity value changes the root hash.
    #[test]
    fn single_identity_change_changes_hash(
        source in 1u64..u64::MAX,
        stages in prop::collection::vec(stage(), 1..8),
        index in any::<prop::sample::Index>(),
        delta in 1u64..1_000_000,
    ) {
        let original = root_identity(source, &stages);

        let mut changed = stages.clone();
        let i = index.index(changed.len());
        changed[i] = mutate(changed[i], delta);
        prop_assume!(format!("{:?}", changed[i]) != format!("{:?}", stages[i]));
        prop_assert_ne!(original, root_identity(source, &changed));

        let other_source = source.wrapping_add(delta).max(1);
        prop_assume!(other_source != source);
        prop_assert_ne!(original, root_identity(other_source, &stages));
    }

    /// An uncacheable source makes every downstream node uncacheable.
    #[test]
    fn zero_identity_propagates(stages in prop::collection::vec(stage(), 0..8)) {
        prop_assert_eq!(root_identity(0, &stages), 0);
    }

    /// After the first `delay` samples of silence, output equals input exactly.
    #[test]
    fn latency_round_trip(
        delay in 0usize..400,
        block_size in 1usize..200,
        num_channels in 1usize..4,
        num_blocks in 1usize..12,
        seed in any::<u32>(),
    ) {
        let mut lp = LatencyProcessor::new();
        lp.set_latency_num_samples(delay);
        lp.prepare_to_play(48_000.0, block_size, num_channels).unwrap();

        let total = num_blocks * block_size;
        let input: Vec<Vec<f32>> = (0..num_channels)
            .map(|ch| {
                (0..total)
                    .map(|i| ((i as u32 ^ seed).wrapping_mul(2_654_435_761) >> 8) as f32 + ch as f32)
                    .collect()
            })
            .collect();

        // Keep reading until every written sample has come back out.
        let blocks_needed = num_blocks + delay.div_ceil(block_size);
        let mut output = vec![Vec::new(); num_channels];
        let mut block = AudioBuffer::new(num_channels, block_size);
        for b in 0..blocks_needed {
            let mut write = AudioBuffer::new(num_channels, block_size);
            if b < num_blocks {
                for ch in 0..num_channels {
                    write
                        .channel_mut(ch)
                        .copy_from_slice(&input[ch][b * block_size..(b + 1) * block_size]);
                }
            }
            lp.write_audio(&write);
            lp.read_audio_overwriting(&mut block);
            for ch in 0..num_channels {
                output[ch].extend_from_slice(block.channel(ch));
            }
        }

        for ch in 0..num_channels {
            prop_assert!(output[ch][..delay].iter().all(|&s| s == 0.0));
            prop_assert_eq!(&output[ch][delay..delay + total], &input[ch][..]);
        }
    }

    /// Events come back in order, each exactly `delay` frames later.
    #[test]
    fn events_shift_by_delay(
        delay in 0usize..300,
        block_size in 1usize..128,
        mut frames in prop::collection::vec(0usize..1024, 0..24),
    ) {
        frames.sort_unstable();
        let mut lp = LatencyProcessor::new().with_events_per_block(32);
        lp.set_latency_num_samples(delay);
        lp.prepare_to_play(48_000.0, block_size, 1).unwrap();

        let last = frames.last().copied().unwrap_or(0) + delay;
        let blocks = last / block_size + 2;
        let mut input = EventBuffer::with_capacity(32);
        let mut output = EventBuffer::with_capacity(32);
        let mut seen = Vec::new();
        for b in 0..blocks {
            let range = b * block_size..(b + 1) * block_size;
            input.clear();
            for (n, &f) in frames.iter().enumerate() {
                if range.contains(&f) {
                    input.push(MidiEvent::note_on(f - range.start, 0, n as u8, 1));
                }
            }
            lp.write_midi(&input);
            output.clear();
            lp.read_midi(&mut output, block_size);
            seen.extend(output.iter().map(|e| (range.start + e.frame, e.message[1])));
        }

        let expected: Vec<(usize, u8)> = frames
            .iter()
            .enumerate()
            .map(|(n, &f)| (f + delay, n as u8))
            .collect();
        prop_assert_eq!(seen, expected);
    }

    /// `node_properties` is a pure function of the graph.
    #[test]
    fn node_properties_idempotent(
        source in 0u64..u64::MAX,
        stages in prop::collection::vec(stage(), 0..8),
    ) {
        let mut graph = NodeGraph::new();
        let mut last = graph.add(SignalNode::sine(source, 1, 440.0, 0.5)).unwrap();
        for (i, stage) in stages.iter().enumerate() {
            let samples = match stage {
                Stage::Latency { samples, .. } => *samples,
                Stage::Meter { .. } => 0,
            };
            last = graph.add(LatencyNode::new(last, i as u64 + 1, samples)).unwrap();
        }
        let first = graph.all_node_properties();
        prop_assert_eq!(&first, &graph.all_node_properties());
        prop_assert_eq!(first[last.index() as usize], graph.node_properties(last).unwrap());
    }
}
