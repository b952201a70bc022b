// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated SoC
//!
//! Runs every cluster core as a host thread over a [`SimRegisterFile`].
//! A core thread idles until its cluster is clocked and out of reset, its
//! wake bit is raised and a new epoch has been opened; it then calls the
//! loaded [`CoreEntry`] once for that epoch.
//!
//! ```no_run
//! use occamy_runtime::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> occamy_runtime::Result<()> {
//! let sim = SimulatedSoc::new(SocTopology::OCCAMY, RuntimeConfig::default())?;
//! let entry: CoreEntry = Arc::new(|ctx: &CoreContext| -> occamy_runtime::Result<()> {
//!     ctx.on_post_wake()?;
//!     ctx.return_to_host(SyncScope::All)?;
//!     Ok(())
//! });
//! sim.load(ClusterId(0), entry)?;
//! sim.soc().wake(ClusterId(0))?;
//! sim.soc().launch_and_wait(ClusterId(0), LaunchParams::new(0, 0))?;
//! # Ok(())
//! # }
//! ```

use crate::config::RuntimeConfig;
use crate::device::CoreContext;
use crate::epoch::{Epoch, EpochState};
use crate::error::{Result, RuntimeError};
use crate::regfile::{RegisterFile, SimRegisterFile};
use crate::roles::core_bit;
use crate::soc::{lock, Soc};
use occamy_soc::regs::{self, clock, reset};
use occamy_soc::{ClusterId, CoreIndex, SocTopology};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Code a simulated core runs once per epoch.
pub type CoreEntry = Arc<dyn Fn(&CoreContext) -> Result<()> + Send + Sync>;

/// Sleep between idle polls of a core thread.
const IDLE_POLL: Duration = Duration::from_micros(100);

/// An entry that failed on a simulated core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreFault {
    /// Cluster of the failing core.
    pub cluster: ClusterId,
    /// Failing core.
    pub core: CoreIndex,
    /// Epoch being served.
    pub epoch: Epoch,
    /// Error or panic message.
    pub message: String,
}

type EntrySlot = Arc<Mutex<Option<CoreEntry>>>;

/// A SoC whose cluster cores are host threads.
pub struct SimulatedSoc {
    soc: Soc,
    regs: Arc<SimRegisterFile>,
    entries: Vec<EntrySlot>,
    started: Mutex<Vec<bool>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    faults: Arc<Mutex<Vec<CoreFault>>>,
    shutdown: Arc<AtomicBool>,
}

impl std::fmt::Debug for SimulatedSoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSoc")
            .field("topology", self.soc.topology())
            .field("faults", &lock(&self.faults).len())
            .finish_non_exhaustive()
    }
}

impl SimulatedSoc {
    /// Simulate `topology` with power-on register values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPartition` for an unusable topology.
    pub fn new(topology: SocTopology, config: RuntimeConfig) -> Result<Self> {
        Self::with_registers(SimRegisterFile::for_topology(&topology), topology, config)
    }

    /// Simulate `topology` over a prepared register file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPartition` for an unusable topology.
    pub fn with_registers(
        regs: SimRegisterFile,
        topology: SocTopology,
        config: RuntimeConfig,
    ) -> Result<Self> {
        let regs = Arc::new(regs);
        let soc = Soc::new(Arc::clone(&regs) as Arc<dyn RegisterFile>, topology, config)?;
        let clusters = usize::from(topology.clusters);
        Ok(Self {
            soc,
            regs,
            entries: (0..clusters).map(|_| Arc::new(Mutex::new(None))).collect(),
            started: Mutex::new(vec![false; clusters]),
            threads: Mutex::new(Vec::new()),
            faults: Arc::new(Mutex::new(Vec::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Host-side handle.
    pub fn soc(&self) -> &Soc {
        &self.soc
    }

    /// Simulated register window.
    pub fn registers(&self) -> &SimRegisterFile {
        &self.regs
    }

    /// Load `entry` on every core of `cluster`, starting the core threads
    /// on first use. Loading again replaces the entry for later epochs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCluster` for an unknown id, or `Io` if a thread
    /// cannot be spawned.
    pub fn load(&self, cluster: ClusterId, entry: CoreEntry) -> Result<()> {
        let slot = self
            .entries
            .get(cluster.index())
            .ok_or(RuntimeError::InvalidCluster {
                cluster,
                clusters: self.soc.topology().clusters,
            })?;
        *lock(slot) = Some(entry);

        let mut started = lock(&self.started);
        if started[cluster.index()] {
            return Ok(());
        }

        let mut threads = lock(&self.threads);
        for core in self.soc.topology().core_indices() {
            let worker = CoreWorker {
                soc: self.soc.clone(),
                cluster,
                core,
                entry: Arc::clone(slot),
                faults: Arc::clone(&self.faults),
                shutdown: Arc::clone(&self.shutdown),
            };
            let handle = std::thread::Builder::new()
                .name(format!("{cluster}-{core}"))
                .spawn(move || worker.run())?;
            threads.push(handle);
        }
        started[cluster.index()] = true;
        debug!("{cluster}: started {} core threads", self.soc.topology().cores_per_cluster);
        Ok(())
    }

    /// Faults recorded so far.
    pub fn faults(&self) -> Vec<CoreFault> {
        lock(&self.faults).clone()
    }

    /// Drain recorded faults.
    pub fn take_faults(&self) -> Vec<CoreFault> {
        std::mem::take(&mut *lock(&self.faults))
    }
}

impl Drop for SimulatedSoc {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in lock(&self.threads).drain(..) {
            if handle.join().is_err() {
                warn!("Simulated core thread panicked outside its entry");
            }
        }
    }
}

struct CoreWorker {
    soc: Soc,
    cluster: ClusterId,
    core: CoreIndex,
    entry: EntrySlot,
    faults: Arc<Mutex<Vec<CoreFault>>>,
    shutdown: Arc<AtomicBool>,
}

impl CoreWorker {
    fn run(self) {
        let mut last = Epoch(0);
        while !self.shutdown.load(Ordering::Acquire) {
            match self.pending_epoch(last) {
                Ok(Some(epoch)) => {
                    last = epoch;
                    self.serve(epoch);
                }
                Ok(None) => std::thread::sleep(IDLE_POLL),
                Err(e) => {
                    self.fault(last, e.to_string());
                    return;
                }
            }
        }
    }

    /// Epoch to serve, if the core has been woken for one it has not run.
    fn pending_epoch(&self, last: Epoch) -> Result<Option<Epoch>> {
        let block = |reg| regs::cluster_reg(self.cluster, reg);
        let rf = self.soc.registers();
        if rf.read32(block(regs::cluster::RESET_N))? != reset::RELEASED
            || rf.read32(block(regs::cluster::CLK_ENA))? != clock::ENABLED
        {
            return Ok(None);
        }
        if rf.read32(block(regs::cluster::WAKE_PENDING))? & core_bit(self.core)? == 0 {
            return Ok(None);
        }
        let status = self.soc.slot(self.cluster)?.sync.status();
        if status.epoch > last && status.state != EpochState::Idle {
            Ok(Some(status.epoch))
        } else {
            Ok(None)
        }
    }

    fn serve(&self, epoch: Epoch) {
        let Some(entry) = lock(&self.entry).clone() else {
            return;
        };
        let role = match self.soc.partition().role(self.core) {
            Ok(role) => role,
            Err(e) => return self.fault(epoch, e.to_string()),
        };
        let ctx = CoreContext::new(self.soc.clone(), self.cluster, self.core, role, epoch);

        match catch_unwind(AssertUnwindSafe(|| entry(&ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.fault(epoch, e.to_string()),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                self.fault(epoch, format!("panicked: {message}"));
            }
        }
    }

    fn fault(&self, epoch: Epoch, message: String) {
        warn!("{}/{} epoch {epoch}: {message}", self.cluster, self.core);
        lock(&self.faults).push(CoreFault {
            cluster: self.cluster,
            core: self.core,
            epoch,
            message,
        });
    }
}
