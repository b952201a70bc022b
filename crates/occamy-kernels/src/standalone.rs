// SPDX-License-Identifier: AGPL-3.0-only

//! Host-only AXPY
//!
//! Baseline for the offload: the host computes the same problem itself and
//! times it with its own cycle counter. The cluster is still woken first,
//! as on silicon, where the cores must be out of reset even if unused.

use crate::axpy::Axpy;
use crate::data::AxpyData;
use crate::error::Result;
use crate::kernel::Kernel;
use occamy_runtime::{ClusterId, CycleSpan, Soc};
use tracing::info;

/// Result of a host-only run.
#[derive(Debug, Clone)]
pub struct StandaloneRun {
    /// Output vector.
    pub z: Vec<f64>,
    /// Host cycles spent in the kernel.
    pub host_cycles: u64,
}

/// Wake `cluster`, then compute `data` on the host.
///
/// # Errors
///
/// Returns error if the cluster cannot be woken.
pub fn run_standalone(soc: &Soc, cluster: ClusterId, data: &AxpyData) -> Result<StandaloneRun> {
    soc.wake(cluster)?;

    let (params, z) = data.launch_params();
    let span = CycleSpan::start(soc.host_counter());
    Axpy.run(&params, 0..params.length)?;
    let host_cycles = span.stop(soc.host_counter())?;

    info!("Host AXPY over {} elements: {host_cycles} cycles", data.len());
    Ok(StandaloneRun {
        z: z.to_vec(),
        host_cycles,
    })
}
