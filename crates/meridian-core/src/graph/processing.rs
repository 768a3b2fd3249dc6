//! Graph arena and the sequential reference executor.
//!
//! [`NodeGraph`] owns every node and is mutated off the audio thread.
//! [`NodeGraph::prepare()`] turns it into a [`PreparedGraph`]: properties are
//! negotiated, consumer counts computed, each node prepared, buffer strategies
//! validated and pool slots assigned. Only a `PreparedGraph` can process, so
//! running a block before preparing does not compile.
//!
//! Per block, [`PreparedGraph::process_block()`] makes two passes over the
//! nodes reachable from the root, in id order (inputs always precede their
//! consumers):
//!
//! 1. `pre_process`: every node's output slot is reset to its home slot and
//!    aliasing nodes map themselves onto their input's slot
//! 2. `process`: exclusive slots are cleared and shaped, then the node runs
//!
//! Neither pass allocates.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec, vec::Vec};

use crate::buffer::{BufferPool, NodeBuffers};

use super::node::{
    BufferStrategy, BufferViews, Node, NodeId, NodeProperties, NodeTable,
    PlaybackInitialisationInfo, ProcessContext, UNASSIGNED_SLOT, unique_inputs,
};

/// Upper bound on a node's output channel count.
pub const MAX_CHANNELS: usize = 64;

/// Errors raised while building or preparing a graph.
///
/// None of these can occur on the audio thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The specified node was not found in the graph.
    NodeNotFound(NodeId),
    /// A node names an input that was not added before it.
    InvalidInput(NodeId),
    /// The graph has no nodes.
    EmptyGraph,
    /// No root node was set.
    RootNotSet,
    /// Block size must be at least one frame.
    InvalidBlockSize(usize),
    /// Sample rate must be finite and positive.
    InvalidSampleRate,
    /// A latency processor was prepared before its delay was set.
    LatencyNotConfigured,
    /// A node asked to alias an input it may not alias.
    InvalidBufferStrategy {
        /// Node that asked.
        node: NodeId,
        /// Input it named.
        input: NodeId,
    },
    /// A node reports more output channels than [`MAX_CHANNELS`].
    ChannelCountExceeded {
        /// Offending node.
        node: NodeId,
        /// Reported channel count.
        channels: usize,
    },
}

impl core::fmt::Display for GraphError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NodeNotFound(id) => write!(f, "node {id} not found"),
            Self::InvalidInput(id) => write!(f, "input {id} does not precede the node"),
            Self::EmptyGraph => write!(f, "graph has no nodes"),
            Self::RootNotSet => write!(f, "no root node set"),
            Self::InvalidBlockSize(n) => write!(f, "invalid block size {n}"),
            Self::InvalidSampleRate => write!(f, "sample rate must be finite and positive"),
            Self::LatencyNotConfigured => {
                write!(f, "latency processor prepared without a latency")
            }
            Self::InvalidBufferStrategy { node, input } => {
                write!(f, "{node} cannot alias the buffer of {input}")
            }
            Self::ChannelCountExceeded { node, channels } => {
                write!(f, "{node} has {channels} channels, max is {MAX_CHANNELS}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for GraphError {}

/// Format and sizing used to prepare a graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackConfig {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Maximum frames per block.
    pub block_size: usize,
    /// Allow nodes to alias single-consumer inputs.
    pub enable_node_memory_sharing: bool,
    /// Events each node output can hold per block.
    pub event_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            block_size: 512,
            enable_node_memory_sharing: true,
            event_capacity: 256,
        }
    }
}

impl PlaybackConfig {
    /// Checks sample rate and block size.
    pub fn validate(&self) -> Result<(), GraphError> {
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(GraphError::InvalidSampleRate);
        }
        if self.block_size == 0 {
            return Err(GraphError::InvalidBlockSize(self.block_size));
        }
        Ok(())
    }
}

/// Arena of nodes with index edges.
///
/// Inputs must already be in the graph when a node is added, so edges always
/// point to smaller ids and the graph cannot contain a cycle. A node read by
/// several consumers lives here once; dropping the graph drops each node once.
#[derive(Default)]
pub struct NodeGraph {
    nodes: Vec<Box<dyn Node>>,
    root: Option<NodeId>,
}

impl NodeGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if no node has been added.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a node. Its inputs must already be in the graph.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidInput`] if an input id is not smaller than the new
    /// node's id.
    pub fn add_node(&mut self, node: Box<dyn Node>) -> Result<NodeId, GraphError> {
        let id = NodeId(self.nodes.len() as u32);
        if let Some(&bad) = node.direct_input_nodes().iter().find(|input| **input >= id) {
            return Err(GraphError::InvalidInput(bad));
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("graph_add: {} {id}", node.name());
        self.nodes.push(node);
        Ok(id)
    }

    /// Boxes and adds a node.
    pub fn add<N: Node + 'static>(&mut self, node: N) -> Result<NodeId, GraphError> {
        self.add_node(Box::new(node))
    }

    /// Sets the node whose output is the graph's output.
    pub fn set_root(&mut self, id: NodeId) -> Result<(), GraphError> {
        if id.slot() >= self.nodes.len() {
            return Err(GraphError::NodeNotFound(id));
        }
        self.root = Some(id);
        Ok(())
    }

    /// The root node, if set.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Borrows a node.
    pub fn node(&self, id: NodeId) -> Option<&dyn Node> {
        self.nodes.get(id.slot()).map(|n| &**n)
    }

    /// Properties of one node, negotiated from the sources up.
    pub fn node_properties(&self, id: NodeId) -> Result<NodeProperties, GraphError> {
        if id.slot() >= self.nodes.len() {
            return Err(GraphError::NodeNotFound(id));
        }
        Ok(self.properties_up_to(id.slot() + 1)[id.slot()])
    }

    /// Properties of every node, indexed by id.
    pub fn all_node_properties(&self) -> Vec<NodeProperties> {
        self.properties_up_to(self.nodes.len())
    }

    fn properties_up_to(&self, count: usize) -> Vec<NodeProperties> {
        let mut properties = Vec::with_capacity(count);
        for node in &self.nodes[..count] {
            let props = node.node_properties(&NodeTable::new(&properties, &[], &[]));
            properties.push(props);
        }
        properties
    }

    /// Prepares every node reachable from the root and returns the executor.
    ///
    /// The graph is consumed; on error it is dropped along with its nodes.
    ///
    /// # Errors
    ///
    /// [`GraphError::EmptyGraph`], [`GraphError::RootNotSet`], an invalid
    /// `config`, any error a node returns from `prepare_to_play`,
    /// [`GraphError::ChannelCountExceeded`] or
    /// [`GraphError::InvalidBufferStrategy`].
    pub fn prepare(mut self, config: &PlaybackConfig) -> Result<PreparedGraph, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::EmptyGraph);
        }
        let root = self.root.ok_or(GraphError::RootNotSet)?;
        config.validate()?;

        let n = self.nodes.len();
        let properties = self.all_node_properties();

        // Reachability from the root, then consumer counts over that subgraph.
        let mut reachable = vec![false; n];
        let mut stack = vec![root];
        let mut inputs = Vec::new();
        while let Some(id) = stack.pop() {
            if core::mem::replace(&mut reachable[id.slot()], true) {
                continue;
            }
            stack.extend_from_slice(self.nodes[id.slot()].direct_input_nodes());
        }
        let order: Vec<NodeId> = (0..n)
            .filter(|&i| reachable[i])
            .map(|i| NodeId(i as u32))
            .collect();

        let mut num_output_nodes = vec![0usize; n];
        for &id in &order {
            unique_inputs(&*self.nodes[id.slot()], &mut inputs);
            for input in &inputs {
                num_output_nodes[input.slot()] += 1;
            }
        }

        let mut max_channels = 1;
        for &id in &order {
            let channels = properties[id.slot()].number_of_channels;
            if channels > MAX_CHANNELS {
                return Err(GraphError::ChannelCountExceeded { node: id, channels });
            }
            max_channels = max_channels.max(channels);
        }

        let mut strategies = vec![BufferStrategy::Exclusive; n];
        let mut home_slot = vec![UNASSIGNED_SLOT; n];
        let mut num_slots = 0;
        for &id in &order {
            let i = id.slot();
            let info = PlaybackInitialisationInfo {
                sample_rate: config.sample_rate,
                block_size: config.block_size,
                enable_node_memory_sharing: config.enable_node_memory_sharing,
                event_capacity: config.event_capacity,
                root,
                graph: NodeTable::new(&properties, &num_output_nodes, &[]),
            };
            let strategy = self.nodes[i].prepare_to_play(&info)?;

            if let Some(input) = strategy.aliased_input() {
                let legal = config.enable_node_memory_sharing
                    && self.nodes[i].direct_input_nodes().contains(&input)
                    && num_output_nodes[input.slot()] == 1
                    && properties[input.slot()].number_of_channels
                        >= properties[i].number_of_channels;
                if !legal {
                    return Err(GraphError::InvalidBufferStrategy { node: id, input });
                }
            } else {
                home_slot[i] = num_slots;
                num_slots += 1;
            }
            strategies[i] = strategy;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                "graph_prepare: {} {id} channels={} latency={} consumers={} strategy={strategy:?}",
                self.nodes[i].name(),
                properties[i].number_of_channels,
                properties[i].latency_num_samples,
                num_output_nodes[i],
            );
        }

        let pool = BufferPool::new(
            num_slots,
            max_channels,
            config.block_size,
            config.event_capacity,
        );

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "graph_prepare: {} of {n} nodes reachable, {num_slots} slots of {max_channels}x{} ({} events)",
            order.len(),
            config.block_size,
            config.event_capacity,
        );

        Ok(PreparedGraph {
            slot_of: home_slot.clone(),
            processed: vec![false; n],
            graph: self,
            config: *config,
            root,
            order,
            properties,
            num_output_nodes,
            strategies,
            home_slot,
            pool,
            position: 0,
        })
    }
}

/// A prepared graph that can process blocks.
pub struct PreparedGraph {
    graph: NodeGraph,
    config: PlaybackConfig,
    root: NodeId,
    order: Vec<NodeId>,
    properties: Vec<NodeProperties>,
    num_output_nodes: Vec<usize>,
    strategies: Vec<BufferStrategy>,
    home_slot: Vec<usize>,
    slot_of: Vec<usize>,
    processed: Vec<bool>,
    pool: BufferPool,
    position: i64,
}

impl PreparedGraph {
    /// Runs one block of `num_frames` frames through every reachable node and
    /// returns the root's output.
    ///
    /// `num_frames` above the prepared block size is clamped.
    pub fn process_block(&mut self, num_frames: usize) -> &NodeBuffers {
        debug_assert!(num_frames <= self.config.block_size);
        let num_frames = num_frames.min(self.config.block_size);
        let range = self.position..self.position + num_frames as i64;

        self.slot_of.copy_from_slice(&self.home_slot);
        self.processed.fill(false);

        for &id in &self.order {
            let i = id.slot();
            let mut views = BufferViews::new(id, &mut self.slot_of, &self.num_output_nodes);
            self.graph.nodes[i].pre_process(num_frames, range.clone(), &mut views);
            // Aliasing nodes that skip pre_process still land on their input.
            if self.slot_of[i] == UNASSIGNED_SLOT {
                if let Some(input) = self.strategies[i].aliased_input() {
                    self.slot_of[i] = self.slot_of[input.slot()];
                }
            }
        }

        for &id in &self.order {
            let i = id.slot();
            let channels = self.properties[i].number_of_channels;
            if self.strategies[i] == BufferStrategy::Exclusive {
                self.pool.get_mut(self.slot_of[i]).reset(channels, num_frames);
            }
            debug_assert!(
                self.graph.nodes[i].is_ready_to_process(&NodeTable::new(
                    &self.properties,
                    &self.num_output_nodes,
                    &self.processed
                )),
                "{id} scheduled before its inputs"
            );

            let mut ctx = ProcessContext::new(
                id,
                channels,
                num_frames,
                range.clone(),
                &mut self.pool,
                &self.slot_of,
                &self.num_output_nodes,
            );
            self.graph.nodes[i].process(&mut ctx);
            self.processed[i] = true;
        }

        self.position += num_frames as i64;
        self.pool.get(self.slot_of[self.root.slot()])
    }

    /// Output of `id` from the last processed block.
    ///
    /// A node whose buffer was stolen by its consumer reports the buffer it
    /// received in exchange. Returns `None` for nodes not reachable from the
    /// root and for aliasing nodes before the first block.
    pub fn output_of(&self, id: NodeId) -> Option<&NodeBuffers> {
        match self.slot_of.get(id.slot()) {
            Some(&slot) if slot != UNASSIGNED_SLOT => Some(self.pool.get(slot)),
            _ => None,
        }
    }

    /// Whether every input of `id` has processed the current block.
    pub fn is_ready_to_process(&self, id: NodeId) -> bool {
        self.graph.node(id).is_some_and(|node| {
            node.is_ready_to_process(&self.node_table())
        })
    }

    /// Table of properties, consumer counts and processed flags.
    pub fn node_table(&self) -> NodeTable<'_> {
        NodeTable::new(&self.properties, &self.num_output_nodes, &self.processed)
    }

    /// Strategy `id` chose at prepare.
    pub fn buffer_strategy(&self, id: NodeId) -> Option<BufferStrategy> {
        self.strategies.get(id.slot()).copied()
    }

    /// Negotiated properties of `id`.
    pub fn node_properties(&self, id: NodeId) -> Option<NodeProperties> {
        self.properties.get(id.slot()).copied()
    }

    /// Number of reachable nodes reading `id`.
    pub fn num_output_nodes(&self, id: NodeId) -> usize {
        self.num_output_nodes.get(id.slot()).copied().unwrap_or(0)
    }

    /// Reachable nodes in processing order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Borrows a node.
    pub fn node(&self, id: NodeId) -> Option<&dyn Node> {
        self.graph.node(id)
    }

    /// Configuration used at prepare.
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Pool slots allocated for exclusive outputs.
    pub fn num_buffer_slots(&self) -> usize {
        self.pool.count()
    }

    /// Timeline position of the next block, in samples.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Re-prepares for a new format. Consumes `self` like [`NodeGraph::prepare`].
    pub fn prepare_to_play(self, config: &PlaybackConfig) -> Result<PreparedGraph, GraphError> {
        self.graph.prepare(config)
    }

    /// Returns the graph for editing.
    pub fn into_graph(self) -> NodeGraph {
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::ProcessContext;
    use core::ops::Range;

    struct Source {
        value: f32,
        channels: usize,
    }

    impl Node for Source {
        fn node_properties(&self, _graph: &NodeTable<'_>) -> NodeProperties {
            NodeProperties {
                node_id: 1,
                number_of_channels: self.channels,
                latency_num_samples: 0,
            }
        }
        fn direct_input_nodes(&self) -> &[NodeId] {
            &[]
        }
        fn prepare_to_play(
            &mut self,
            _info: &PlaybackInitialisationInfo<'_>,
        ) -> Result<BufferStrategy, GraphError> {
            Ok(BufferStrategy::Exclusive)
        }
        fn process(&mut self, ctx: &mut ProcessContext<'_>) {
            let value = self.value;
            let out = &mut ctx.output().audio;
            for ch in 0..out.num_channels() {
                out.channel_mut(ch).fill(value);
            }
        }
    }

    struct Gain {
        inputs: [NodeId; 1],
        gain: f32,
        strategy: BufferStrategy,
        forced: Option<BufferStrategy>,
    }

    impl Gain {
        fn new(input: NodeId, gain: f32) -> Self {
            Self {
                inputs: [input],
                gain,
                strategy: BufferStrategy::Exclusive,
                forced: None,
            }
        }
    }

    impl Node for Gain {
        fn node_properties(&self, graph: &NodeTable<'_>) -> NodeProperties {
            graph.properties(self.inputs[0]).combine_identity(&[2])
        }
        fn direct_input_nodes(&self) -> &[NodeId] {
            &self.inputs
        }
        fn prepare_to_play(
            &mut self,
            info: &PlaybackInitialisationInfo<'_>,
        ) -> Result<BufferStrategy, GraphError> {
            let input = self.inputs[0];
            self.strategy = self.forced.unwrap_or(
                if info.enable_node_memory_sharing && info.graph.num_output_nodes(input) == 1 {
                    BufferStrategy::AliasedFromSingleConsumerInput(input)
                } else {
                    BufferStrategy::Exclusive
                },
            );
            Ok(self.strategy)
        }
        fn pre_process(&mut self, _n: usize, _r: Range<i64>, views: &mut BufferViews<'_>) {
            if let Some(input) = self.strategy.aliased_input() {
                views.use_input_buffer(input);
            }
        }
        fn process(&mut self, ctx: &mut ProcessContext<'_>) {
            ctx.take_input(self.inputs[0]);
            let gain = self.gain;
            let out = &mut ctx.output().audio;
            for ch in 0..out.num_channels() {
                out.channel_mut(ch).iter_mut().for_each(|s| *s *= gain);
            }
        }
    }

    fn config(sharing: bool) -> PlaybackConfig {
        PlaybackConfig {
            sample_rate: 48_000.0,
            block_size: 16,
            enable_node_memory_sharing: sharing,
            event_capacity: 8,
        }
    }

    #[test]
    fn empty_graph_fails() {
        assert_eq!(
            NodeGraph::new().prepare(&config(true)).err(),
            Some(GraphError::EmptyGraph)
        );
    }

    #[test]
    fn root_required() {
        let mut graph = NodeGraph::new();
        graph.add(Source { value: 1.0, channels: 1 }).unwrap();
        assert_eq!(graph.prepare(&config(true)).err(), Some(GraphError::RootNotSet));
    }

    #[test]
    fn inputs_must_precede() {
        let mut graph = NodeGraph::new();
        let err = graph.add(Gain::new(NodeId(0), 1.0)).unwrap_err();
        assert_eq!(err, GraphError::InvalidInput(NodeId(0)));
        assert!(matches!(
            graph.set_root(NodeId(4)),
            Err(GraphError::NodeNotFound(_))
        ));
    }

    #[test]
    fn invalid_config_rejected() {
        let mut graph = NodeGraph::new();
        let src = graph.add(Source { value: 1.0, channels: 1 }).unwrap();
        graph.set_root(src).unwrap();
        let mut cfg = config(true);
        cfg.block_size = 0;
        assert_eq!(graph.prepare(&cfg).err(), Some(GraphError::InvalidBlockSize(0)));
    }

    #[test]
    fn chain_aliases_and_uses_one_slot() {
        let mut graph = NodeGraph::new();
        let src = graph.add(Source { value: 0.5, channels: 2 }).unwrap();
        let g1 = graph.add(Gain::new(src, 2.0)).unwrap();
        let g2 = graph.add(Gain::new(g1, 3.0)).unwrap();
        graph.set_root(g2).unwrap();

        let mut prepared = graph.prepare(&config(true)).unwrap();
        assert_eq!(prepared.num_buffer_slots(), 1);
        assert_eq!(
            prepared.buffer_strategy(g2),
            Some(BufferStrategy::AliasedFromSingleConsumerInput(g1))
        );
        let out = prepared.process_block(16);
        assert_eq!(out.audio.channel(1), &[3.0; 16]);
        assert_eq!(
            prepared.output_of(src).unwrap().audio.as_ptr(),
            prepared.output_of(g2).unwrap().audio.as_ptr()
        );
    }

    #[test]
    fn unreachable_nodes_are_skipped() {
        let mut graph = NodeGraph::new();
        let src = graph.add(Source { value: 1.0, channels: 1 }).unwrap();
        let dangling = graph.add(Gain::new(src, 2.0)).unwrap();
        let root = graph.add(Gain::new(src, 4.0)).unwrap();
        graph.set_root(root).unwrap();

        let mut prepared = graph.prepare(&config(true)).unwrap();
        assert_eq!(prepared.num_output_nodes(src), 1);
        assert_eq!(prepared.order(), &[src, root]);
        prepared.process_block(16);
        assert!(prepared.output_of(dangling).is_none());
        assert_eq!(prepared.output_of(root).unwrap().audio.channel(0), &[4.0; 16]);
    }

    #[test]
    fn illegal_alias_rejected() {
        let mut graph = NodeGraph::new();
        let src = graph.add(Source { value: 1.0, channels: 1 }).unwrap();
        let mut g = Gain::new(src, 1.0);
        g.forced = Some(BufferStrategy::AliasedFromSingleConsumerInput(src));
        let g = graph.add(g).unwrap();
        graph.set_root(g).unwrap();
        assert_eq!(
            graph.prepare(&config(false)).err(),
            Some(GraphError::InvalidBufferStrategy { node: g, input: src })
        );
    }

    #[test]
    fn too_many_channels_rejected() {
        let mut graph = NodeGraph::new();
        let src = graph
            .add(Source { value: 1.0, channels: MAX_CHANNELS + 1 })
            .unwrap();
        graph.set_root(src).unwrap();
        assert!(matches!(
            graph.prepare(&config(true)),
            Err(GraphError::ChannelCountExceeded { .. })
        ));
    }

    #[test]
    fn exclusive_steals_when_sharing_disabled() {
        let mut graph = NodeGraph::new();
        let src = graph.add(Source { value: 1.0, channels: 1 }).unwrap();
        let g = graph.add(Gain::new(src, 0.5)).unwrap();
        graph.set_root(g).unwrap();
        let mut prepared = graph.prepare(&config(false)).unwrap();
        assert_eq!(prepared.num_buffer_slots(), 2);
        assert_eq!(prepared.process_block(8).audio.channel(0), &[0.5; 8]);
        assert_eq!(prepared.position(), 8);
    }

    #[test]
    fn readiness_tracks_processing() {
        let mut graph = NodeGraph::new();
        let src = graph.add(Source { value: 1.0, channels: 1 }).unwrap();
        let g = graph.add(Gain::new(src, 1.0)).unwrap();
        graph.set_root(g).unwrap();
        let mut prepared = graph.prepare(&config(true)).unwrap();
        assert!(prepared.is_ready_to_process(src));
        assert!(!prepared.is_ready_to_process(g));
        prepared.process_block(16);
        assert!(prepared.is_ready_to_process(g));
    }

    #[test]
    fn reprepare_keeps_nodes() {
        let mut graph = NodeGraph::new();
        let src = graph.add(Source { value: 1.0, channels: 1 }).unwrap();
        graph.set_root(src).unwrap();
        let prepared = graph.prepare(&config(true)).unwrap();
        let mut cfg = config(true);
        cfg.block_size = 32;
        let mut prepared = prepared.prepare_to_play(&cfg).unwrap();
        assert_eq!(prepared.process_block(32).audio.num_frames(), 32);
        assert_eq!(prepared.into_graph().len(), 1);
    }
}
