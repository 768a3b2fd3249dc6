//! Join point that sums any number of inputs.
//!
//! Inputs may arrive with different latencies. The node reports the largest
//! and delays every other input by its shortfall, so all branches are
//! sample-aligned in the sum.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use crate::buffer::NodeBuffers;
use crate::graph::{
    BufferStrategy, GraphError, Node, NodeId, NodeProperties, NodeTable,
    PlaybackInitialisationInfo, ProcessContext, hash_combine,
};
use crate::latency::LatencyProcessor;

/// Type component of a summing node's identity hash.
pub const SUMMING_TYPE_ID: u64 = 0x5e_ed00_0000_0003;

struct Compensation {
    processor: LatencyProcessor,
    scratch: NodeBuffers,
}

/// Sums its inputs after aligning their latencies.
pub struct SummingNode {
    inputs: Vec<NodeId>,
    compensation: Vec<Option<Compensation>>,
}

impl SummingNode {
    /// Sums `inputs`.
    pub fn new(inputs: Vec<NodeId>) -> Self {
        let compensation = inputs.iter().map(|_| None).collect();
        Self {
            inputs,
            compensation,
        }
    }

    /// Delay applied to input `index`, if any.
    pub fn compensation_for(&self, index: usize) -> Option<usize> {
        self.compensation
            .get(index)?
            .as_ref()?
            .processor
            .latency_num_samples()
    }
}

impl Node for SummingNode {
    fn name(&self) -> &str {
        "summing"
    }

    fn node_properties(&self, graph: &NodeTable<'_>) -> NodeProperties {
        let mut node_id = SUMMING_TYPE_ID;
        let mut number_of_channels = 0;
        let mut latency_num_samples = 0;
        for &input in &self.inputs {
            let props = graph.properties(input);
            if props.node_id == 0 {
                node_id = 0;
            } else if node_id != 0 {
                hash_combine(&mut node_id, props.node_id);
            }
            number_of_channels = number_of_channels.max(props.number_of_channels);
            latency_num_samples = latency_num_samples.max(props.latency_num_samples);
        }
        NodeProperties {
            node_id,
            number_of_channels,
            latency_num_samples,
        }
    }

    fn direct_input_nodes(&self) -> &[NodeId] {
        &self.inputs
    }

    fn prepare_to_play(
        &mut self,
        info: &PlaybackInitialisationInfo<'_>,
    ) -> Result<BufferStrategy, GraphError> {
        let target = self.node_properties(&info.graph).latency_num_samples;

        for (slot, &input) in self.compensation.iter_mut().zip(&self.inputs) {
            let props = info.graph.properties(input);
            let shortfall = target - props.latency_num_samples;
            *slot = if shortfall > 0 {
                let mut processor =
                    LatencyProcessor::new().with_events_per_block(info.event_capacity);
                processor.set_latency_num_samples(shortfall as usize);
                processor.prepare_to_play(
                    info.sample_rate,
                    info.block_size,
                    props.number_of_channels,
                )?;
                #[cfg(feature = "tracing")]
                tracing::debug!("summing_prepare: delaying {input} by {shortfall}");
                Some(Compensation {
                    processor,
                    scratch: NodeBuffers::new(
                        props.number_of_channels,
                        info.block_size,
                        info.event_capacity,
                    ),
                })
            } else {
                None
            };
        }
        Ok(BufferStrategy::Exclusive)
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let num_frames = ctx.num_frames();
        for (&id, compensation) in self.inputs.iter().zip(&mut self.compensation) {
            let (input, output) = ctx.input_and_output(id);
            match compensation {
                None => {
                    output.audio.add_from(&input.audio);
                    for &event in &input.events {
                        output.events.push(event);
                    }
                }
                Some(c) => {
                    c.processor.write_audio(&input.audio);
                    c.processor.write_midi(&input.events);
                    c.scratch.events.clear();
                    c.scratch
                        .audio
                        .set_size(input.audio.num_channels(), num_frames);
                    c.processor.read_audio_overwriting(&mut c.scratch.audio);
                    c.processor.read_midi(&mut c.scratch.events, num_frames);

                    output.audio.add_from(&c.scratch.audio);
                    for &event in &c.scratch.events {
                        output.events.push(event);
                    }
                }
            }
        }
        ctx.output().events.sort_by_frame();
    }
}
