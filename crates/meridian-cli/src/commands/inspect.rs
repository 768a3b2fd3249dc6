//! Prints the prepared graph: per-node properties and buffer strategy.

use anyhow::Context;
use clap::Args;
use meridian_core::{BufferStrategy, NodeId};

use super::common::{ConfigArgs, build_graph};

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Give every node its own buffer
    #[arg(long)]
    no_sharing: bool,
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let mut config = args.config.load()?;
    if args.no_sharing {
        config.enable_node_memory_sharing = false;
    }

    let demo = build_graph(&config)?;
    let role = |id: NodeId| -> String {
        if id == demo.root {
            return "root".into();
        }
        for (i, b) in demo.branches.iter().enumerate() {
            if id == b.source {
                return format!("branch {i} source");
            }
            if id == b.delay {
                return format!("branch {i} latency");
            }
            if id == b.meter {
                return format!("branch {i} meter");
            }
        }
        String::new()
    };

    let prepared = demo
        .graph
        .prepare(&config.playback())
        .context("failed to prepare graph")?;

    println!(
        "{:<10} {:<16} {:<18} {:>20} {:>4} {:>8} {:>5}  strategy",
        "node", "type", "role", "node_id", "ch", "latency", "outs"
    );
    for &id in prepared.order() {
        let props = prepared.node_properties(id).unwrap_or_default();
        let name = prepared.node(id).map_or("?", |n| n.name());
        let strategy = match prepared.buffer_strategy(id) {
            Some(BufferStrategy::AliasedFromSingleConsumerInput(input)) => {
                format!("aliased from {input}")
            }
            Some(BufferStrategy::Exclusive) | None => "exclusive".into(),
        };
        println!(
            "{:<10} {:<16} {:<18} {:>20} {:>4} {:>8} {:>5}  {strategy}",
            id.to_string(),
            name,
            role(id),
            props.node_id,
            props.number_of_channels,
            props.latency_num_samples,
            prepared.num_output_nodes(id),
        );
    }
    println!();
    println!(
        "{} nodes processed, {} buffer slots",
        prepared.order().len(),
        prepared.num_buffer_slots()
    );

    Ok(())
}
