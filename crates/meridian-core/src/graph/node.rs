//! The node contract and the views the executor hands to nodes.
//!
//! A node negotiates its output shape through [`NodeProperties`], names its
//! inputs with [`direct_input_nodes()`](Node::direct_input_nodes), decides a
//! [`BufferStrategy`] once in [`prepare_to_play()`](Node::prepare_to_play) and
//! then runs two phases per block:
//!
//! 1. [`pre_process()`](Node::pre_process) with a [`BufferViews`]: decide which
//!    memory the output lives in (alias the input, or keep its own slot)
//! 2. [`process()`](Node::process) with a [`ProcessContext`]: compute into it
//!
//! Nodes never see the graph itself. Everything they read about other nodes
//! comes through a [`NodeTable`], a read-only snapshot the executor builds at
//! prepare time.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use core::ops::Range;

use crate::buffer::{BufferPool, NodeBuffers};

use super::processing::GraphError;

/// Unique identifier for a node in a [`NodeGraph`](super::NodeGraph).
///
/// Assigned sequentially by [`add_node()`](super::NodeGraph::add_node) and never
/// reused. A node's inputs always have smaller ids than the node itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Order-sensitive hash combine (boost `hash_combine`, 64-bit constant).
///
/// `hash_combine(a); hash_combine(b)` and `hash_combine(b); hash_combine(a)`
/// give different seeds.
#[inline]
pub fn hash_combine(seed: &mut u64, value: u64) {
    *seed ^= value
        .wrapping_add(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(*seed << 6)
        .wrapping_add(*seed >> 2);
}

/// The negotiated shape and identity of a node's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeProperties {
    /// Structural hash of the subgraph ending at this node. `0` means
    /// "do not cache or identify".
    pub node_id: u64,
    /// Output channel count.
    pub number_of_channels: usize,
    /// Latency in samples accumulated from the sources to this node's output.
    pub latency_num_samples: i32,
}

impl NodeProperties {
    /// Folds identity values into `node_id`, in order.
    ///
    /// A zero `node_id` stays zero: nothing below an uncacheable node can be
    /// identified either.
    #[must_use]
    pub fn combine_identity(mut self, values: &[u64]) -> Self {
        if self.node_id != 0 {
            for &value in values {
                hash_combine(&mut self.node_id, value);
            }
        }
        self
    }
}

/// How a node's output buffer is provided during processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferStrategy {
    /// The node owns a pool slot; the executor clears it before every block.
    #[default]
    Exclusive,
    /// The node writes straight into its input's slot.
    ///
    /// Only legal when the input has exactly one consumer and at least as many
    /// channels as the node outputs. The executor checks both at prepare.
    AliasedFromSingleConsumerInput(NodeId),
}

impl BufferStrategy {
    /// The aliased input, if any.
    pub fn aliased_input(self) -> Option<NodeId> {
        match self {
            Self::Exclusive => None,
            Self::AliasedFromSingleConsumerInput(id) => Some(id),
        }
    }
}

/// Read-only per-node facts about the prepared graph, indexed by [`NodeId`].
///
/// Lookups for nodes outside the table return neutral values (default
/// properties, zero consumers, not processed).
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeTable<'a> {
    properties: &'a [NodeProperties],
    num_output_nodes: &'a [usize],
    processed: &'a [bool],
}

impl<'a> NodeTable<'a> {
    /// Builds a table over executor-owned slices.
    pub fn new(
        properties: &'a [NodeProperties],
        num_output_nodes: &'a [usize],
        processed: &'a [bool],
    ) -> Self {
        Self {
            properties,
            num_output_nodes,
            processed,
        }
    }

    /// Properties of `id`.
    #[inline]
    pub fn properties(&self, id: NodeId) -> NodeProperties {
        self.properties.get(id.slot()).copied().unwrap_or_default()
    }

    /// How many nodes reachable from the root read `id`'s output.
    #[inline]
    pub fn num_output_nodes(&self, id: NodeId) -> usize {
        self.num_output_nodes.get(id.slot()).copied().unwrap_or(0)
    }

    /// Whether `id` has finished processing the current block.
    #[inline]
    pub fn is_processed(&self, id: NodeId) -> bool {
        self.processed.get(id.slot()).copied().unwrap_or(false)
    }
}

/// Everything a node needs to prepare for playback.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackInitialisationInfo<'a> {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Maximum frames per block.
    pub block_size: usize,
    /// Whether nodes may alias single-consumer inputs.
    pub enable_node_memory_sharing: bool,
    /// Events a node output can hold per block.
    pub event_capacity: usize,
    /// Root (final output) node.
    pub root: NodeId,
    /// Properties and consumer counts of every node.
    pub graph: NodeTable<'a>,
}

impl PlaybackInitialisationInfo<'_> {
    /// Latency at the root. Compensating nodes pad their input up to this.
    #[inline]
    pub fn root_latency(&self) -> i32 {
        self.graph.properties(self.root).latency_num_samples
    }
}

/// Sentinel in the slot map for a node whose buffer has not been assigned yet.
pub(crate) const UNASSIGNED_SLOT: usize = usize::MAX;

/// Per-block slot map handed to [`Node::pre_process()`].
pub struct BufferViews<'a> {
    node: NodeId,
    slot_of: &'a mut [usize],
    num_output_nodes: &'a [usize],
}

impl<'a> BufferViews<'a> {
    pub(crate) fn new(node: NodeId, slot_of: &'a mut [usize], num_output_nodes: &'a [usize]) -> Self {
        Self {
            node,
            slot_of,
            num_output_nodes,
        }
    }

    /// The node being pre-processed.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Points this node's output at `input`'s buffer for the current block.
    ///
    /// Only valid for a node prepared with
    /// [`BufferStrategy::AliasedFromSingleConsumerInput`].
    #[inline]
    pub fn use_input_buffer(&mut self, input: NodeId) {
        debug_assert!(input < self.node, "{input} is not upstream of {}", self.node);
        debug_assert_eq!(
            self.num_output_nodes.get(input.slot()).copied(),
            Some(1),
            "{input} has other consumers"
        );
        self.slot_of[self.node.slot()] = self.slot_of[input.slot()];
    }

    /// True once this node's output shares memory with another node's.
    pub fn is_aliased(&self) -> bool {
        let own = self.slot_of[self.node.slot()];
        own != UNASSIGNED_SLOT
            && self.slot_of[..self.node.slot()].contains(&own)
    }
}

/// What [`ProcessContext::take_input()`] did to move the input into the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTransfer {
    /// Output and input already share a slot.
    Aliased,
    /// The input's single consumer took its buffer: slots swapped, nothing copied.
    Stolen,
    /// The input has other consumers, so its data was copied.
    Copied,
}

/// Per-call view over the node's output slot and its inputs' slots.
pub struct ProcessContext<'a> {
    node: NodeId,
    num_channels: usize,
    num_frames: usize,
    reference_sample_range: Range<i64>,
    pool: &'a mut BufferPool,
    slot_of: &'a [usize],
    num_output_nodes: &'a [usize],
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        node: NodeId,
        num_channels: usize,
        num_frames: usize,
        reference_sample_range: Range<i64>,
        pool: &'a mut BufferPool,
        slot_of: &'a [usize],
        num_output_nodes: &'a [usize],
    ) -> Self {
        Self {
            node,
            num_channels,
            num_frames,
            reference_sample_range,
            pool,
            slot_of,
            num_output_nodes,
        }
    }

    /// The node being processed.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Frames in this block.
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Output channel count negotiated at prepare.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Timeline position of this block, in samples.
    #[inline]
    pub fn reference_sample_range(&self) -> Range<i64> {
        self.reference_sample_range.clone()
    }

    /// Consumer count of `id`.
    #[inline]
    pub fn num_output_nodes(&self, id: NodeId) -> usize {
        self.num_output_nodes.get(id.slot()).copied().unwrap_or(0)
    }

    /// This node's output.
    #[inline]
    pub fn output(&mut self) -> &mut NodeBuffers {
        self.pool.get_mut(self.slot_of[self.node.slot()])
    }

    /// An input's output for this block.
    #[inline]
    pub fn input(&self, id: NodeId) -> &NodeBuffers {
        debug_assert!(id < self.node, "{id} is not upstream of {}", self.node);
        self.pool.get(self.slot_of[id.slot()])
    }

    /// An input and this node's output at once.
    ///
    /// # Panics
    ///
    /// Panics if this node aliases `id`; use [`output()`](Self::output) alone then.
    #[inline]
    pub fn input_and_output(&mut self, id: NodeId) -> (&NodeBuffers, &mut NodeBuffers) {
        debug_assert!(id < self.node, "{id} is not upstream of {}", self.node);
        self.pool
            .get_ref_and_mut(self.slot_of[id.slot()], self.slot_of[self.node.slot()])
    }

    /// Moves `id`'s audio and events into this node's output by the cheapest
    /// legal means, then shapes the output to this node's channel count.
    ///
    /// Channels the input does not supply are silent.
    pub fn take_input(&mut self, id: NodeId) -> InputTransfer {
        let src = self.slot_of[id.slot()];
        let dst = self.slot_of[self.node.slot()];
        let (num_channels, num_frames) = (self.num_channels, self.num_frames);

        let transfer = if src == dst {
            InputTransfer::Aliased
        } else if self.num_output_nodes(id) == 1 {
            self.pool.swap(src, dst);
            InputTransfer::Stolen
        } else {
            let (input, output) = self.pool.get_ref_and_mut(src, dst);
            output.copy_from(input);
            return InputTransfer::Copied;
        };

        let audio = &mut self.pool.get_mut(dst).audio;
        let supplied = audio.num_channels();
        audio.set_size(num_channels, num_frames);
        for ch in supplied.min(num_channels)..num_channels {
            audio.channel_mut(ch).fill(0.0);
        }
        transfer
    }
}

/// A unit of graph computation.
///
/// Implementors are owned by a [`NodeGraph`](super::NodeGraph) and driven in
/// dependency order. `pre_process`, `process` and `is_ready_to_process` run on
/// the audio thread and must not allocate, lock or block.
pub trait Node: Send {
    /// Short human-readable name for diagnostics.
    fn name(&self) -> &str {
        "node"
    }

    /// Output properties given the (already computed) properties of the
    /// inputs. Must be a pure function of the node's configuration and `graph`.
    fn node_properties(&self, graph: &NodeTable<'_>) -> NodeProperties;

    /// Immediate dependencies.
    fn direct_input_nodes(&self) -> &[NodeId];

    /// Whether every input has finished the current block.
    fn is_ready_to_process(&self, graph: &NodeTable<'_>) -> bool {
        self.direct_input_nodes()
            .iter()
            .all(|&id| graph.is_processed(id))
    }

    /// One-time setup before playback or after a format change. May allocate.
    ///
    /// # Errors
    ///
    /// Any [`GraphError`] aborts preparation of the whole graph.
    fn prepare_to_play(
        &mut self,
        info: &PlaybackInitialisationInfo<'_>,
    ) -> Result<BufferStrategy, GraphError>;

    /// Early per-block phase. Aliasing nodes call
    /// [`BufferViews::use_input_buffer()`] here.
    fn pre_process(
        &mut self,
        _num_frames: usize,
        _reference_sample_range: Range<i64>,
        _views: &mut BufferViews<'_>,
    ) {
    }

    /// Computes one block into `ctx.output()`.
    fn process(&mut self, ctx: &mut ProcessContext<'_>);
}

/// Collects the direct inputs of `node` into `out`, skipping duplicates.
pub(crate) fn unique_inputs(node: &dyn Node, out: &mut Vec<NodeId>) {
    out.clear();
    for &id in node.direct_input_nodes() {
        if !out.contains(&id) {
            out.push(id);
        }
    }
}
