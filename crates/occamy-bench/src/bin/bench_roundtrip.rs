//! Offload round-trip benchmark on the simulated SoC.
//!
//! Measures launch → completion latency in host cycles for an AXPY offload,
//! next to the host-only run of the same problem. On the simulator the
//! round-trip is dominated by thread wake-up and register polling, not by
//! the kernel; compare the shape of the distribution across settings
//! rather than absolute numbers.
//!
//! Usage:
//!   cargo run --release --bin bench_roundtrip
//!   cargo run --release --bin bench_roundtrip -- --iterations 500 --len 4096

use anyhow::Result;
use occamy_kernels::{offload_axpy, offload_entry, run_standalone, AxpyData, KernelTable, WorkSplit};
use occamy_runtime::prelude::*;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const DEFAULT_ITERATIONS: usize = 200;
const DEFAULT_LEN: usize = 1024;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let iterations = parse_arg(&args, "--iterations", DEFAULT_ITERATIONS).max(1);
    let len = parse_arg(&args, "--len", DEFAULT_LEN);

    println!("Offload round-trip benchmark");
    println!("============================");
    println!("Problem    : AXPY, {len} elements");
    println!("Iterations : {iterations}");
    println!();

    let data = AxpyData::generate(len, 0x0CCA);
    let config = RuntimeConfig::from_env().with_poll_interval(Duration::ZERO);

    for (name, split, scope) in [
        ("per-core / all", WorkSplit::PerCore, SyncScope::All),
        ("per-core / compute-only", WorkSplit::PerCore, SyncScope::ComputeOnly),
        ("single / all", WorkSplit::Single, SyncScope::All),
    ] {
        let sim = SimulatedSoc::new(SocTopology::OCCAMY, config.clone())?;
        let cluster = ClusterId(0);
        sim.load(cluster, offload_entry(KernelTable::builtin(), split, scope))?;
        sim.soc().wake(cluster)?;

        // Warmup
        for _ in 0..10 {
            offload_axpy(sim.soc(), cluster, &data)?;
        }

        let mut host_cycles = Vec::with_capacity(iterations);
        let mut core_cycles = Vec::with_capacity(iterations);
        let t0 = Instant::now();
        for _ in 0..iterations {
            let run = offload_axpy(sim.soc(), cluster, &data)?;
            host_cycles.push(run.completion.host_cycles);
            core_cycles.push(run.completion.max_core_cycles().unwrap_or_default());
        }
        let wall = t0.elapsed();
        if !sim.faults().is_empty() {
            anyhow::bail!("{name}: core faults {:?}", sim.faults());
        }

        println!("{name}");
        println!("{}", "-".repeat(name.len()));
        report("host round-trip", &mut host_cycles);
        report("cluster kernel ", &mut core_cycles);
        println!(
            "  wall : {:.1} µs/offload",
            wall.as_secs_f64() * 1e6 / iterations as f64
        );
        println!();
    }

    let sim = SimulatedSoc::new(SocTopology::OCCAMY, config)?;
    let host = run_standalone(sim.soc(), ClusterId(0), &data)?;
    println!("Host-only AXPY : {} cycles", host.host_cycles);

    Ok(())
}

fn report(label: &str, samples: &mut [u64]) {
    samples.sort_unstable();
    let n = samples.len();
    let mean = samples.iter().sum::<u64>() as f64 / n as f64;
    println!(
        "  {label} : mean {:>10.0}  p50 {:>10}  p99 {:>10}  max {:>10} cycles",
        mean,
        samples[n / 2],
        samples[(n * 99 / 100).min(n - 1)],
        samples[n - 1]
    );
}

fn parse_arg(args: &[String], flag: &str, default: usize) -> usize {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
