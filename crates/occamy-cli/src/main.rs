//! `occamy`: command-line front end for the offload runtime.
//!
//! ```text
//! USAGE:
//!   occamy hello                     Print the console greeting
//!   occamy axpy [--len N]            Offload AXPY to a simulated cluster
//!   occamy standalone [--len N]      Run AXPY on the host only
//!   occamy topology                  Show clusters, core roles, register map
//!   occamy probe --device <path>     Read power state through a mapped window
//! ```
//!
//! Timeouts and the return policy default to the `OCCAMY_*` environment
//! variables; flags override them.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use occamy_kernels::{offload_axpy, offload_entry, run_standalone, AxpyData, KernelTable, WorkSplit};
use occamy_runtime::prelude::*;
use occamy_runtime::{CoreRole, MappedRegion, RolePartition};
use occamy_soc::regs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "occamy", about = "Occamy host/cluster offload runtime", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the console greeting.
    Hello {
        /// Peripheral clock feeding the UART, in Hz.
        #[arg(long, default_value_t = 100_000_000)]
        periph_hz: u64,
        /// UART baud rate.
        #[arg(long, default_value_t = 115_200)]
        baud: u32,
    },
    /// Offload AXPY to a cluster of the simulated SoC.
    Axpy {
        #[command(flatten)]
        problem: Problem,
        #[command(flatten)]
        launch: LaunchOpts,
        /// Number of back-to-back offloads.
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Write z as little-endian f64 to this file.
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Run AXPY on the host after waking a cluster.
    Standalone {
        #[command(flatten)]
        problem: Problem,
        /// Cluster to wake.
        #[arg(long, default_value_t = 0)]
        cluster: u8,
    },
    /// Show the SoC layout.
    Topology,
    /// Read version and power state through a mapped control window.
    Probe {
        /// Device file exposing the window (`/dev/uioN` or `/dev/mem`).
        #[arg(long)]
        device: PathBuf,
        /// Byte offset of the window in the device file.
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
}

#[derive(clap::Args)]
struct Problem {
    /// Vector length; omit for the four-element reference problem.
    #[arg(long)]
    len: Option<usize>,
    /// Seed for generated data.
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

impl Problem {
    fn data(&self) -> AxpyData {
        match self.len {
            Some(len) => AxpyData::generate(len, self.seed),
            None => AxpyData::reference(),
        }
    }
}

#[derive(clap::Args)]
struct LaunchOpts {
    /// Target cluster.
    #[arg(long, default_value_t = 0)]
    cluster: u8,
    /// How elements are shared among compute cores.
    #[arg(long, value_enum, default_value_t = SplitArg::PerCore)]
    split: SplitArg,
    /// Cores the barrier waits for.
    #[arg(long, value_enum, default_value_t = ScopeArg::All)]
    scope: ScopeArg,
    /// What cores do after arriving at the barrier.
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,
    /// Host completion timeout in milliseconds.
    #[arg(long)]
    launch_timeout_ms: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SplitArg {
    PerCore,
    Single,
    Replicated,
}

impl From<SplitArg> for WorkSplit {
    fn from(arg: SplitArg) -> Self {
        match arg {
            SplitArg::PerCore => Self::PerCore,
            SplitArg::Single => Self::Single,
            SplitArg::Replicated => Self::Replicated,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    All,
    ComputeOnly,
}

impl From<ScopeArg> for SyncScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::All => Self::All,
            ScopeArg::ComputeOnly => Self::ComputeOnly,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Wait,
    Halt,
}

impl From<PolicyArg> for ReturnPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Wait => Self::Wait,
            PolicyArg::Halt => Self::Halt,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Hello { periph_hz, baud } => cmd_hello(periph_hz, baud)?,
        Cmd::Axpy {
            problem,
            launch,
            repeat,
            dump,
        } => cmd_axpy(&problem, &launch, repeat, dump)?,
        Cmd::Standalone { problem, cluster } => cmd_standalone(&problem, ClusterId(cluster))?,
        Cmd::Topology => cmd_topology()?,
        Cmd::Probe { device, offset } => cmd_probe(&device, offset)?,
    }

    Ok(())
}

fn cmd_hello(periph_hz: u64, baud: u32) -> Result<()> {
    if baud == 0 {
        bail!("baud rate must be non-zero");
    }
    // 16x oversampling divisor the UART would be programmed with
    let divisor = periph_hz / (16 * u64::from(baud));
    tracing::debug!("UART: {periph_hz} Hz peripheral clock, {baud} baud, divisor {divisor}");
    println!("Hello world!");
    Ok(())
}

fn cmd_axpy(problem: &Problem, opts: &LaunchOpts, repeat: u32, dump: Option<PathBuf>) -> Result<()> {
    let mut config = RuntimeConfig::from_env();
    if let Some(policy) = opts.policy {
        config = config.with_return_policy(policy.into());
    }
    if let Some(ms) = opts.launch_timeout_ms {
        config = config.with_launch_timeout(Duration::from_millis(ms));
    }

    let cluster = ClusterId(opts.cluster);
    let data = problem.data();
    let sim = SimulatedSoc::new(SocTopology::OCCAMY, config)?;
    sim.load(
        cluster,
        offload_entry(KernelTable::builtin(), opts.split.into(), opts.scope.into()),
    )?;
    sim.soc().wake(cluster).context("waking cluster")?;

    println!("AXPY offload");
    println!("============");
    println!("Cluster  : {cluster}");
    println!("Length   : {}", data.len());
    println!("a        : {}", data.a);
    println!();

    let mut last = None;
    for _ in 0..repeat.max(1) {
        let run = offload_axpy(sim.soc(), cluster, &data)?;
        let faults = sim.take_faults();
        if let Some(fault) = faults.first() {
            bail!("{}/{} failed in epoch {}: {}", fault.cluster, fault.core, fault.epoch, fault.message);
        }
        println!(
            "epoch {:>3}: host {:>9} cycles, cluster max {:>9} cycles ({} cores reporting)",
            run.completion.epoch.0,
            run.completion.host_cycles,
            run.completion.max_core_cycles().unwrap_or_default(),
            run.completion.core_cycles.len()
        );
        last = Some(run);
    }

    let Some(run) = last else {
        return Ok(());
    };
    if run.z != data.expected() {
        bail!("result mismatch: got {:?}", run.z);
    }
    if data.len() <= 16 {
        println!();
        println!("z = {:?}", run.z);
    }
    if let Some(path) = dump {
        let bytes = SharedBuffer::from_slice(&run.z).to_bytes();
        std::fs::write(&path, &bytes).with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote {} bytes to {}", bytes.len(), path.display());
    }
    Ok(())
}

fn cmd_standalone(problem: &Problem, cluster: ClusterId) -> Result<()> {
    let data = problem.data();
    let sim = SimulatedSoc::new(SocTopology::OCCAMY, RuntimeConfig::from_env())?;
    let run = run_standalone(sim.soc(), cluster, &data)?;

    println!("Host AXPY over {} elements: {} cycles", data.len(), run.host_cycles);
    if data.len() <= 16 {
        println!("z = {:?}", run.z);
    }
    Ok(())
}

fn cmd_topology() -> Result<()> {
    let topology = SocTopology::OCCAMY;
    let partition = RolePartition::from_topology(&topology)?;

    println!("Clusters        : {}", topology.clusters);
    println!(
        "Cores/cluster   : {} ({} compute + {} DM)",
        topology.cores_per_cluster,
        topology.compute_cores_per_cluster,
        topology.dm_cores_per_cluster()
    );
    println!("Cores total     : {}", topology.total_cores());
    println!();

    let roles: Vec<String> = topology
        .core_indices()
        .map(|core| match partition.role(core) {
            Ok(CoreRole::Compute) => format!("{core}:C"),
            Ok(CoreRole::DataMovement) => format!("{core}:DM"),
            Err(_) => format!("{core}:?"),
        })
        .collect();
    println!("Roles           : {}", roles.join(" "));
    println!();

    println!("Register map");
    println!("  {:#06x}  SOC_VERSION", regs::SOC_VERSION);
    println!("  {:#06x}  HOST_IRQ_PENDING", regs::HOST_IRQ_PENDING);
    for id in topology.cluster_ids() {
        println!(
            "  {:#06x}  {id} block (reset, clock, isolation, wake)",
            regs::cluster_reg(id, 0)
        );
    }
    Ok(())
}

fn cmd_probe(device: &Path, offset: u64) -> Result<()> {
    let topology = SocTopology::OCCAMY;
    let region = MappedRegion::map(device, offset, regs::window_size(topology.clusters))
        .with_context(|| format!("mapping {}", device.display()))?;
    let soc = Soc::new(Arc::new(region), topology, RuntimeConfig::from_env())?;

    let version = soc.soc_version()?;
    println!("SoC version : {version:#010x}");
    if version != regs::SOC_VERSION_OCCAMY {
        tracing::warn!("Unexpected SoC version {version:#x}");
    }
    for cluster in topology.cluster_ids() {
        println!(
            "{cluster}    : {:?}, released {:?}",
            soc.power_state(cluster)?,
            soc.released(cluster)?
        );
    }
    Ok(())
}
