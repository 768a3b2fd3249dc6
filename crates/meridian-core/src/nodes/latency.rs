//! A node that adds a fixed latency to its input.

use core::ops::Range;

use crate::graph::{
    BufferStrategy, BufferViews, GraphError, Node, NodeId, NodeProperties, NodeTable,
    PlaybackInitialisationInfo, ProcessContext,
};
use crate::latency::LatencyProcessor;

/// Type component of a latency node's identity hash.
pub const LATENCY_NODE_TYPE_ID: u64 = 0x1a7e_0c70_0000_0002;

/// Delays audio and events by `latency_num_samples` and reports it.
///
/// Models a processor with intrinsic latency (a lookahead limiter, a linear
/// phase filter) so branches of differing latency can be built.
pub struct LatencyNode {
    input: [NodeId; 1],
    item_id: u64,
    latency_num_samples: usize,
    strategy: BufferStrategy,
    processor: Option<LatencyProcessor>,
}

impl LatencyNode {
    /// Delays `input` by `latency_num_samples`.
    pub fn new(input: NodeId, item_id: u64, latency_num_samples: usize) -> Self {
        Self {
            input: [input],
            item_id,
            latency_num_samples,
            strategy: BufferStrategy::Exclusive,
            processor: None,
        }
    }

    /// Intrinsic latency in samples.
    pub fn latency_num_samples(&self) -> usize {
        self.latency_num_samples
    }
}

impl Node for LatencyNode {
    fn name(&self) -> &str {
        "latency"
    }

    fn node_properties(&self, graph: &NodeTable<'_>) -> NodeProperties {
        let mut props = graph.properties(self.input[0]).combine_identity(&[
            self.item_id,
            LATENCY_NODE_TYPE_ID,
            self.latency_num_samples as u64,
        ]);
        props.latency_num_samples = props
            .latency_num_samples
            .saturating_add(i32::try_from(self.latency_num_samples).unwrap_or(i32::MAX));
        props
    }

    fn direct_input_nodes(&self) -> &[NodeId] {
        &self.input
    }

    fn prepare_to_play(
        &mut self,
        info: &PlaybackInitialisationInfo<'_>,
    ) -> Result<BufferStrategy, GraphError> {
        let input = self.input[0];
        let channels = info.graph.properties(input).number_of_channels;

        self.processor = if self.latency_num_samples > 0 {
            let mut processor = LatencyProcessor::new().with_events_per_block(info.event_capacity);
            processor.set_latency_num_samples(self.latency_num_samples);
            processor.prepare_to_play(info.sample_rate, info.block_size, channels)?;
            Some(processor)
        } else {
            None
        };

        self.strategy =
            if info.enable_node_memory_sharing && info.graph.num_output_nodes(input) == 1 {
                BufferStrategy::AliasedFromSingleConsumerInput(input)
            } else {
                BufferStrategy::Exclusive
            };
        Ok(self.strategy)
    }

    fn pre_process(
        &mut self,
        _num_frames: usize,
        _reference_sample_range: Range<i64>,
        views: &mut BufferViews<'_>,
    ) {
        if let Some(input) = self.strategy.aliased_input() {
            views.use_input_buffer(input);
        }
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        ctx.take_input(self.input[0]);
        let num_frames = ctx.num_frames();
        let Some(processor) = &mut self.processor else {
            return;
        };

        // In place: the ring holds a copy, so the output can be overwritten.
        let output = ctx.output();
        processor.write_audio(&output.audio);
        processor.read_audio_overwriting(&mut output.audio);
        processor.write_midi(&output.events);
        output.events.clear();
        processor.read_midi(&mut output.events, num_frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_latency_to_input() {
        let props = [NodeProperties {
            node_id: 9,
            number_of_channels: 1,
            latency_num_samples: 10,
        }];
        let node = LatencyNode::new(NodeId(0), 4, 32);
        let mine = node.node_properties(&NodeTable::new(&props, &[], &[]));
        assert_eq!(mine.latency_num_samples, 42);
        assert_ne!(mine.node_id, 9);
        assert_ne!(
            mine.node_id,
            LatencyNode::new(NodeId(0), 4, 33)
                .node_properties(&NodeTable::new(&props, &[], &[]))
                .node_id
        );
    }
}
