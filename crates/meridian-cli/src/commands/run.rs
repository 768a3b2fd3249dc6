//! Offline render of the demo graph.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use hound::{SampleFormat, WavSpec, WavWriter};
use meridian_core::cpu::{CYCLE_COUNTER_AVAILABLE, cycles_between};
use meridian_core::cycle_counter;
use meridian_core::meter::{MeterPlugin, linear_to_db};

use super::common::{ConfigArgs, build_graph};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Blocks to render (overrides the config)
    #[arg(long)]
    blocks: Option<usize>,

    /// Frames per block (overrides the config)
    #[arg(long)]
    block_size: Option<usize>,

    /// Give every node its own buffer
    #[arg(long)]
    no_sharing: bool,

    /// Write the root output to a 32-bit float WAV file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = args.config.load()?;
    if let Some(blocks) = args.blocks {
        config.blocks = blocks;
    }
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
    }
    if args.no_sharing {
        config.enable_node_memory_sharing = false;
    }
    config.validate()?;

    let demo = build_graph(&config)?;
    let mut prepared = demo
        .graph
        .prepare(&config.playback())
        .context("failed to prepare graph")?;

    let root_props = prepared
        .node_properties(prepared.root())
        .unwrap_or_default();
    tracing::info!(
        nodes = prepared.order().len(),
        slots = prepared.num_buffer_slots(),
        latency = root_props.latency_num_samples,
        "prepared"
    );

    let channels = root_props.number_of_channels;
    let mut rendered: Vec<f32> = Vec::new();
    if args.output.is_some() {
        rendered.reserve(config.blocks * config.block_size * channels);
    }

    let mut total_cycles = 0u64;
    for _ in 0..config.blocks {
        let start = cycle_counter();
        let out = prepared.process_block(config.block_size);
        total_cycles += cycles_between(start, cycle_counter());

        if args.output.is_some() {
            let audio = &out.audio;
            for frame in 0..audio.num_frames() {
                for ch in 0..channels {
                    rendered.push(if ch < audio.num_channels() {
                        audio.channel(ch)[frame]
                    } else {
                        0.0
                    });
                }
            }
        }
    }

    println!(
        "Rendered {} blocks of {} frames at {} Hz (sharing {})",
        config.blocks,
        config.block_size,
        config.sample_rate,
        if config.enable_node_memory_sharing { "on" } else { "off" },
    );
    println!("Root latency: {} samples", root_props.latency_num_samples);
    println!();
    println!("Meters:");
    for (i, branch) in demo.branches.iter().enumerate() {
        let levels = branch.plugin.levels();
        let reading = levels.snapshot();
        let held = (0..reading.num_channels)
            .map(|ch| levels.take_peak(ch))
            .fold(0.0f32, f32::max);
        println!(
            "  branch {i} (meter {}): peak {:>7.2} dBFS  rms {:>7.2} dBFS  blocks {}",
            branch.plugin.item_id(),
            linear_to_db(held),
            reading.rms_db(0),
            reading.blocks,
        );
    }

    println!();
    if CYCLE_COUNTER_AVAILABLE && config.blocks > 0 {
        println!(
            "Average: {} cycles per block",
            total_cycles / config.blocks as u64
        );
    } else {
        println!("Average: cycle counter unavailable on this target");
    }

    if let Some(path) = &args.output {
        write_wav(path, &rendered, channels, config.sample_rate)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}

fn write_wav(
    path: &Path,
    samples: &[f32],
    channels: usize,
    sample_rate: f64,
) -> anyhow::Result<()> {
    let spec = WavSpec {
        channels: u16::try_from(channels).context("too many channels for WAV")?,
        sample_rate: sample_rate.round() as u32,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
