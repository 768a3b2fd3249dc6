//! Meridian Core - real-time audio processing graph
//!
//! A directed acyclic graph of processing nodes driven one block at a time from
//! a hard-deadline audio callback. Nodes at different depths stay
//! sample-aligned through per-node latency compensation, and a node may process
//! in its upstream node's buffer instead of copying it.
//!
//! # Modules
//!
//! - [`cpu`] - spin-loop hint and hardware cycle counter
//! - [`buffer`] - planar audio blocks, event lists, the per-node buffer pool
//! - [`latency`] - [`LatencyProcessor`], a fixed delay for audio and events
//! - [`graph`] - the [`Node`] contract, [`NodeGraph`] arena, [`PreparedGraph`] executor
//! - [`meter`] - external meter interfaces and a lock-free [`LevelMeasurer`]
//! - [`nodes`] - level measurement, signal source, latency and summing nodes
//!
//! # Real-time Contract
//!
//! Everything that allocates happens in [`NodeGraph::prepare()`]. The per-block
//! path ([`PreparedGraph::process_block()`]) performs no allocation, locking or
//! system calls.
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible (with `alloc`). Disable the default `std`
//! feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! meridian-core = { version = "0.1", default-features = false }
//! ```
//!
//! Enable the `tracing` feature for prepare-time diagnostics.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod buffer;
pub mod cpu;
pub mod graph;
pub mod latency;
pub mod meter;
pub mod nodes;

pub use buffer::{AudioBuffer, BufferPool, EventBuffer, MidiEvent, NodeBuffers};
pub use cpu::{cycle_counter, pause};
pub use graph::{
    BufferStrategy, GraphError, Node, NodeGraph, NodeId, NodeProperties, PlaybackConfig,
    PlaybackInitialisationInfo, PreparedGraph, ProcessContext,
};
pub use latency::LatencyProcessor;
pub use meter::{LevelMeasurer, LevelMeterPlugin, MeasurementSink, MeterPlugin, MeterReading};
pub use nodes::{LatencyNode, LevelMeasurerNode, SignalNode, SummingNode};
