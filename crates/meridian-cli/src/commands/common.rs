//! Demo graph shared by `run` and `inspect`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use meridian_core::{
    LatencyNode, LevelMeasurerNode, LevelMeterPlugin, NodeGraph, NodeId, SignalNode, SummingNode,
};

use crate::config::EngineConfig;

/// Config file selection shared by graph commands.
#[derive(Args, Clone, Debug, Default)]
pub struct ConfigArgs {
    /// TOML engine configuration (defaults to a two-branch demo)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn load(&self) -> anyhow::Result<EngineConfig> {
        let config = EngineConfig::load_or_default(self.config.as_deref())
            .context("could not load engine configuration")?;
        Ok(config)
    }
}

/// Node ids and meter for one branch.
pub struct Branch {
    pub source: NodeId,
    pub delay: NodeId,
    pub meter: NodeId,
    pub plugin: Arc<LevelMeterPlugin>,
}

/// Unprepared demo graph: each branch is source -> latency -> meter, summed at the root.
pub struct DemoGraph {
    pub graph: NodeGraph,
    pub branches: Vec<Branch>,
    pub root: NodeId,
}

pub fn build_graph(config: &EngineConfig) -> anyhow::Result<DemoGraph> {
    let mut graph = NodeGraph::new();
    let mut branches = Vec::with_capacity(config.branches.len());

    for b in &config.branches {
        let source = graph.add(SignalNode::sine(
            b.item_id,
            b.channels,
            b.frequency_hz,
            b.amplitude,
        ))?;
        let delay = graph.add(LatencyNode::new(source, b.item_id, b.latency_samples))?;
        let plugin = Arc::new(LevelMeterPlugin::new(b.meter_id()));
        let meter = graph.add(LevelMeasurerNode::new(delay, plugin.clone()))?;
        branches.push(Branch {
            source,
            delay,
            meter,
            plugin,
        });
    }

    let root = graph.add(SummingNode::new(branches.iter().map(|b| b.meter).collect()))?;
    graph.set_root(root)?;
    tracing::debug!(nodes = graph.len(), branches = branches.len(), "built demo graph");

    Ok(DemoGraph {
        graph,
        branches,
        root,
    })
}
