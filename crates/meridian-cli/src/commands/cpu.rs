//! Cycle counter and spin-pause diagnostics.

use clap::Args;
use meridian_core::cpu::{CYCLE_COUNTER_AVAILABLE, cycles_between};
use meridian_core::{cycle_counter, pause};

#[derive(Args, Debug)]
pub struct CpuArgs {
    /// Pause instructions to time
    #[arg(long, default_value = "10000")]
    iterations: u64,
}

pub fn run(args: CpuArgs) -> anyhow::Result<()> {
    println!("Target: {}", std::env::consts::ARCH);
    println!(
        "Cycle counter: {}",
        if CYCLE_COUNTER_AVAILABLE { "available" } else { "unsupported" }
    );

    if !CYCLE_COUNTER_AVAILABLE {
        return Ok(());
    }

    let start = cycle_counter();
    for _ in 0..args.iterations {
        pause();
    }
    let elapsed = cycles_between(start, cycle_counter());
    println!("Pause: {elapsed} cycles over {} iterations", args.iterations);
    if args.iterations > 0 {
        println!(
            "Pause: {:.2} cycles each",
            elapsed as f64 / args.iterations as f64
        );
    }
    Ok(())
}
