//! Level measurement node.
//!
//! Passes its input through unchanged and feeds a copy of each block to an
//! external [`MeterPlugin`]. When the input arrives earlier than the root's
//! output, the copy sent to the meter is delayed by the difference so the
//! display lines up with what is heard. The node's own output is never delayed.

#[cfg(not(feature = "std"))]
use alloc::sync::Arc;
#[cfg(feature = "std")]
use std::sync::Arc;

use core::ops::Range;

use crate::buffer::NodeBuffers;
use crate::graph::{
    BufferStrategy, BufferViews, GraphError, Node, NodeId, NodeProperties, NodeTable,
    PlaybackInitialisationInfo, ProcessContext,
};
use crate::latency::LatencyProcessor;
use crate::meter::{InitialTimingInfo, MeterPlugin};

/// Type component of a level measurer's identity hash.
pub const LEVEL_MEASURER_TYPE_ID: u64 = 3_731_138_684_616_245_860;

/// Latency processor plus the one-block scratch it reads into.
struct MeterDelay {
    processor: LatencyProcessor,
    scratch: NodeBuffers,
}

/// Measures its input with an external meter.
pub struct LevelMeasurerNode {
    input: [NodeId; 1],
    plugin: Arc<dyn MeterPlugin>,
    initialised: bool,
    strategy: BufferStrategy,
    delay: Option<MeterDelay>,
}

impl LevelMeasurerNode {
    /// Creates a node measuring `input` with `plugin`.
    pub fn new(input: NodeId, plugin: Arc<dyn MeterPlugin>) -> Self {
        Self {
            input: [input],
            plugin,
            initialised: false,
            strategy: BufferStrategy::Exclusive,
            delay: None,
        }
    }

    /// The measured input.
    pub fn input(&self) -> NodeId {
        self.input[0]
    }

    /// The external meter.
    pub fn plugin(&self) -> &Arc<dyn MeterPlugin> {
        &self.plugin
    }

    /// Strategy chosen at the last prepare.
    pub fn buffer_strategy(&self) -> BufferStrategy {
        self.strategy
    }

    /// The meter-path latency processor, if compensation is needed.
    pub fn latency_processor(&self) -> Option<&LatencyProcessor> {
        self.delay.as_ref().map(|d| &d.processor)
    }
}

impl Node for LevelMeasurerNode {
    fn name(&self) -> &str {
        "level-measurer"
    }

    fn node_properties(&self, graph: &NodeTable<'_>) -> NodeProperties {
        graph
            .properties(self.input[0])
            .combine_identity(&[self.plugin.item_id(), LEVEL_MEASURER_TYPE_ID])
    }

    fn direct_input_nodes(&self) -> &[NodeId] {
        &self.input
    }

    fn prepare_to_play(
        &mut self,
        info: &PlaybackInitialisationInfo<'_>,
    ) -> Result<BufferStrategy, GraphError> {
        // Re-initialise if another owner released the meter since the last prepare.
        if !self.initialised || self.plugin.needs_initialising() {
            self.plugin.initialise(&InitialTimingInfo::default());
            self.initialised = true;
        }

        let input = self.input[0];
        let input_props = info.graph.properties(input);
        let channels = self.node_properties(&info.graph).number_of_channels;

        self.strategy = if info.enable_node_memory_sharing
            && info.graph.num_output_nodes(input) == 1
            && input_props.number_of_channels >= channels
        {
            BufferStrategy::AliasedFromSingleConsumerInput(input)
        } else {
            BufferStrategy::Exclusive
        };

        let latency_delta = info.root_latency() - input_props.latency_num_samples;
        self.delay = if latency_delta > 0 {
            let mut processor = LatencyProcessor::new().with_events_per_block(info.event_capacity);
            processor.set_latency_num_samples(latency_delta as usize);
            processor.prepare_to_play(info.sample_rate, info.block_size, channels)?;
            Some(MeterDelay {
                processor,
                scratch: NodeBuffers::new(channels, info.block_size, info.event_capacity),
            })
        } else {
            None
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            item_id = self.plugin.item_id(),
            latency_delta,
            aliased = self.strategy != BufferStrategy::Exclusive,
            "level_measurer_prepare"
        );
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
        debug_assert_eq!(
            ctx.input(self.input[0]).audio.num_channels(),
            ctx.num_channels(),
            "input channel count differs from the negotiated one"
        );
        ctx.take_input(self.input[0]);
        let num_frames = ctx.num_frames();

        let sink = self.plugin.measurer();
        sink.set_show_midi(self.plugin.show_midi_activity());

        let output = ctx.output();
        match &mut self.delay {
            None => {
                sink.process_buffer(&output.audio);
                sink.process_midi(&output.events);
            }
            Some(delay) => {
                delay.processor.write_audio(&output.audio);
                delay.processor.write_midi(&output.events);

                let scratch = &mut delay.scratch;
                scratch.events.clear();
                scratch
                    .audio
                    .set_size(output.audio.num_channels(), num_frames);
                delay.processor.read_audio_overwriting(&mut scratch.audio);
                delay.processor.read_midi(&mut scratch.events, num_frames);

                sink.process_buffer(&scratch.audio);
                sink.process_midi(&scratch.events);
            }
        }
    }
}

impl Drop for LevelMeasurerNode {
    fn drop(&mut self) {
        if self.initialised && !self.plugin.needs_initialising() {
            self.plugin.deinitialise();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::LevelMeterPlugin;

    #[test]
    fn identity_folds_item_and_type() {
        let plugin = Arc::new(LevelMeterPlugin::new(11));
        let node = LevelMeasurerNode::new(NodeId(0), plugin);
        let props = [NodeProperties {
            node_id: 5,
            number_of_channels: 2,
            latency_num_samples: 3,
        }];
        let table = NodeTable::new(&props, &[], &[]);
        let mine = node.node_properties(&table);
        assert_eq!(mine, props[0].combine_identity(&[11, LEVEL_MEASURER_TYPE_ID]));
        assert_eq!(mine.latency_num_samples, 3);
    }

    fn props(latency: i32) -> NodeProperties {
        NodeProperties {
            node_id: 1,
            number_of_channels: 2,
            latency_num_samples: latency,
        }
    }

    fn prepare_with(node: &mut LevelMeasurerNode, input_latency: i32, root_latency: i32) {
        let table = [props(input_latency), props(input_latency), props(root_latency)];
        let consumers = [1, 1, 0];
        let info = PlaybackInitialisationInfo {
            sample_rate: 48_000.0,
            block_size: 128,
            enable_node_memory_sharing: true,
            event_capacity: 16,
            root: NodeId(2),
            graph: NodeTable::new(&table, &consumers, &[]),
        };
        let strategy = node.prepare_to_play(&info).unwrap();
        assert_eq!(strategy, BufferStrategy::AliasedFromSingleConsumerInput(NodeId(0)));
    }

    #[test]
    fn compensates_up_to_root_latency() {
        let plugin = Arc::new(LevelMeterPlugin::new(1));
        let mut node = LevelMeasurerNode::new(NodeId(0), plugin);
        prepare_with(&mut node, 64, 256);
        let processor = node.latency_processor().unwrap();
        assert_eq!(processor.latency_num_samples(), Some(192));
        assert_eq!(processor.capacity(), 192 + 128);
    }

    #[test]
    fn no_compensation_when_input_is_late() {
        let plugin = Arc::new(LevelMeterPlugin::new(1));
        let mut node = LevelMeasurerNode::new(NodeId(0), plugin);
        prepare_with(&mut node, 256, 256);
        assert!(node.latency_processor().is_none());
        prepare_with(&mut node, 300, 256);
        assert!(node.latency_processor().is_none());
    }

    #[test]
    fn initialises_once_and_deinitialises_on_drop() {
        let plugin = Arc::new(LevelMeterPlugin::new(1));
        let mut node = LevelMeasurerNode::new(NodeId(0), plugin.clone());
        prepare_with(&mut node, 0, 0);
        prepare_with(&mut node, 0, 10);
        assert_eq!(plugin.initialise_count(), 1);
        drop(node);
        assert_eq!(plugin.deinitialise_count(), 1);
    }

    #[test]
    fn reinitialises_on_prepare_after_external_release() {
        let plugin = Arc::new(LevelMeterPlugin::new(1));
        let mut node = LevelMeasurerNode::new(NodeId(0), plugin.clone());
        prepare_with(&mut node, 0, 0);
        plugin.deinitialise();
        assert!(plugin.needs_initialising());

        prepare_with(&mut node, 0, 0);
        assert!(!plugin.needs_initialising());
        assert_eq!(plugin.initialise_count(), 2);

        drop(node);
        assert_eq!(plugin.deinitialise_count(), 2);
    }

    #[test]
    fn skips_deinitialise_when_already_released() {
        let plugin = Arc::new(LevelMeterPlugin::new(1));
        let mut node = LevelMeasurerNode::new(NodeId(0), plugin.clone());
        prepare_with(&mut node, 0, 0);
        plugin.deinitialise();
        drop(node);
        assert_eq!(plugin.deinitialise_count(), 1);
    }

    #[test]
    fn drop_without_prepare_leaves_meter_alone() {
        let plugin = Arc::new(LevelMeterPlugin::new(1));
        drop(LevelMeasurerNode::new(NodeId(0), plugin.clone()));
        assert_eq!(plugin.deinitialise_count(), 0);
    }
}
