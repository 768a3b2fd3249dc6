//! Processing graph for the Meridian engine.
//!
//! The graph module splits the engine into a mutable arena and a prepared
//! executor:
//!
//! - [`NodeGraph`]: owns every node (`Box<dyn Node>`) with index edges.
//!   Edited off the audio thread.
//! - [`PreparedGraph`]: produced by [`NodeGraph::prepare()`]. Holds the
//!   negotiated [`NodeProperties`], consumer counts, each node's
//!   [`BufferStrategy`] and a [`BufferPool`](crate::buffer::BufferPool) sized
//!   for the largest node. [`process_block()`](PreparedGraph::process_block)
//!   never allocates.
//!
//! # Buffer Ownership
//!
//! A node whose single input has no other consumer may declare
//! [`BufferStrategy::AliasedFromSingleConsumerInput`]: it gets no slot of its
//! own and processes in its input's memory. An exclusive node reading a
//! single-consumer input takes that input's buffer by swapping pool slots; an
//! input with several consumers is copied. See
//! [`ProcessContext::take_input()`].
//!
//! # Latency Compensation
//!
//! Each node reports the latency accumulated up to its output. Nodes that join
//! or observe paths ([`SummingNode`](crate::nodes::SummingNode),
//! [`LevelMeasurerNode`](crate::nodes::LevelMeasurerNode)) delay the early
//! paths with a [`LatencyProcessor`](crate::latency::LatencyProcessor).
//!
//! # Example
//!
//! ```rust
//! use meridian_core::graph::{NodeGraph, PlaybackConfig};
//! use meridian_core::nodes::{LatencyNode, SignalNode};
//!
//! let mut graph = NodeGraph::new();
//! let src = graph.add(SignalNode::impulse_train(1, 2, 64))?;
//! let delayed = graph.add(LatencyNode::new(src, 2, 10))?;
//! graph.set_root(delayed)?;
//!
//! let mut prepared = graph.prepare(&PlaybackConfig::default())?;
//! let out = prepared.process_block(128);
//! assert_eq!(out.audio.channel(0)[10], 1.0);
//! # Ok::<(), meridian_core::graph::GraphError>(())
//! ```

pub mod node;
mod processing;

pub use node::{
    BufferStrategy, BufferViews, InputTransfer, Node, NodeId, NodeProperties, NodeTable,
    PlaybackInitialisationInfo, ProcessContext, hash_combine,
};
pub use processing::{GraphError, MAX_CHANNELS, NodeGraph, PlaybackConfig, PreparedGraph};
