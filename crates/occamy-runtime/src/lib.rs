// SPDX-License-Identifier: AGPL-3.0-only

//! Host/cluster offload runtime for the Occamy heterogeneous SoC.
//!
//! The host wakes an accelerator cluster, hands it a kernel through a
//! mailbox, and blocks until every participating cluster core has reported
//! back through a hardware barrier. Both sides can time the round-trip with
//! their own cycle counters.
//!
//! # Layers
//!
//! ```text
//! Host                          Cluster core
//!   Soc::wake                     CoreContext::on_post_wake
//!   Soc::launch_and_wait          CoreContext::is_compute_core
//!   Soc::read_cycles              CoreContext::read_cycles
//!                                 CoreContext::return_to_host
//!          │                              │
//!          └────── EpochSync (per cluster) ┘
//!                          │
//!                  RegisterFile
//!          SimRegisterFile  │  MappedRegion (mmap)
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use occamy_runtime::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> occamy_runtime::Result<()> {
//! let sim = SimulatedSoc::new(SocTopology::OCCAMY, RuntimeConfig::from_env())?;
//! let cluster = ClusterId(0);
//!
//! sim.load(cluster, Arc::new(|ctx: &CoreContext| -> occamy_runtime::Result<()> {
//!     ctx.on_post_wake()?;
//!     if ctx.is_compute_core() {
//!         // payload
//!     }
//!     ctx.return_to_host(SyncScope::All)?;
//!     Ok(())
//! }))?;
//!
//! sim.soc().wake(cluster)?;
//! let done = sim.soc().launch_and_wait(cluster, LaunchParams::new(0, 0))?;
//! println!("epoch {} took {} host cycles", done.epoch, done.host_cycles);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod buffer;
pub mod config;
mod device;
pub mod epoch;
mod error;
pub mod mmio;
mod offload;
mod power;
pub mod regfile;
mod roles;
pub mod sim;
mod soc;
pub mod timer;

pub use buffer::{LaunchParams, SharedBuffer};
pub use config::{ReturnPolicy, RuntimeConfig};
pub use device::CoreContext;
pub use epoch::{Arrival, Epoch, EpochState, EpochStatus};
pub use error::{ErrorKind, Result, RuntimeError};
pub use mmio::MappedRegion;
pub use offload::{Completion, Launch};
pub use power::PowerState;
pub use regfile::{RegisterFile, SimRegisterFile};
pub use roles::{RolePartition, SyncScope};
pub use sim::{CoreEntry, CoreFault, SimulatedSoc};
pub use soc::{CoreCycles, Soc};
pub use timer::{ClockDomain, CycleCounter, CycleSpan, CycleStamp, HostCounter};

pub use occamy_soc::{ClusterId, CoreIndex, CoreRole, IsolationMask, SocTopology};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        ClusterId, Completion, CoreContext, CoreEntry, CoreIndex, CycleCounter, ErrorKind,
        IsolationMask, LaunchParams, Result, ReturnPolicy, RuntimeConfig, RuntimeError,
        SharedBuffer, SimulatedSoc, Soc, SocTopology, SyncScope,
    };
}
