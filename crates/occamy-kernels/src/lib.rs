// SPDX-License-Identifier: AGPL-3.0-only

//! Offload payloads for the Occamy runtime
//!
//! The runtime moves control between host and cluster; this crate supplies
//! what runs in between:
//!
//! - [`Kernel`] and the [`KernelTable`] cores dispatch on
//! - [`Axpy`] (`z = a·x + y`) and its [`AxpyData`] sets
//! - [`WorkSplit`], how elements are shared among compute cores
//! - [`offload_entry`], the program each cluster core runs
//! - [`run_standalone`], the host-only baseline
//!
//! # Example
//!
//! ```no_run
//! use occamy_kernels::{offload_axpy, offload_entry, AxpyData, KernelTable, WorkSplit};
//! use occamy_runtime::prelude::*;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let sim = SimulatedSoc::new(SocTopology::OCCAMY, RuntimeConfig::default())?;
//! let cluster = ClusterId(0);
//! sim.load(cluster, offload_entry(KernelTable::builtin(), WorkSplit::PerCore, SyncScope::All))?;
//! sim.soc().wake(cluster)?;
//!
//! let run = offload_axpy(sim.soc(), cluster, &AxpyData::reference())?;
//! println!("z = {:?}", run.z);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod axpy;
mod data;
mod error;
mod kernel;
mod offload;
mod standalone;

pub use axpy::{Axpy, AXPY_ID};
pub use data::AxpyData;
pub use error::{KernelError, Result};
pub use kernel::{Kernel, KernelTable, WorkSplit};
pub use offload::{offload_axpy, offload_entry, run_offload, AxpyRun};
pub use standalone::{run_standalone, StandaloneRun};
