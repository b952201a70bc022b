// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel dispatch on both sides of the offload
//!
//! [`offload_entry`] is the program every cluster core runs: post-wake hook,
//! kernel on compute cores, barrier. [`run_offload`] is its host side.

use crate::data::AxpyData;
use crate::error::Result;
use crate::kernel::{KernelTable, WorkSplit};
use occamy_runtime::{ClusterId, Completion, CoreContext, CoreEntry, Soc, SyncScope};
use std::sync::Arc;
use tracing::{debug, trace};

/// Core program dispatching on the launch's kernel id.
///
/// Compute cores run their share of the kernel and report the cycles it
/// took; DM cores go straight to the barrier. A core whose kernel fails
/// still arrives, so the host is never left waiting on it, and then
/// reports the failure.
pub fn offload_entry(table: KernelTable, split: WorkSplit, scope: SyncScope) -> CoreEntry {
    Arc::new(move |ctx: &CoreContext| -> occamy_runtime::Result<()> {
        ctx.on_post_wake()?;

        let outcome = if ctx.is_compute_core() {
            run_share(ctx, &table, split)
        } else {
            Ok(())
        };

        ctx.return_to_host(scope)?;
        outcome.map_err(Into::into)
    })
}

fn run_share(ctx: &CoreContext, table: &KernelTable, split: WorkSplit) -> Result<()> {
    let params = ctx.params()?;
    let kernel = table.get(params.kernel)?;
    let rank = ctx.compute_rank().unwrap_or_default();
    let range = split.range(rank, ctx.compute_cores(), params.length);

    let start = ctx.read_cycles()?;
    kernel.run(&params, range.clone())?;
    let end = ctx.read_cycles()?;

    let cycles = end.cycles_since(&start)?;
    ctx.record_cycles(cycles)?;
    trace!(
        "{}/{}: {} {range:?} in {cycles} cycles",
        ctx.cluster(),
        ctx.core(),
        kernel.name()
    );
    Ok(())
}

/// Validate `params` against `table`, launch them on `cluster` and wait.
///
/// # Errors
///
/// Returns error if the kernel is unknown, its arguments are invalid, or
/// the launch fails.
pub fn run_offload(
    soc: &Soc,
    cluster: ClusterId,
    table: &KernelTable,
    params: occamy_runtime::LaunchParams,
) -> Result<Completion> {
    let kernel = table.get(params.kernel)?;
    kernel.validate(&params)?;
    debug!("{cluster}: offloading {} over {} elements", kernel.name(), params.length);
    Ok(soc.launch_and_wait(cluster, params)?)
}

/// Result of an AXPY offload.
#[derive(Debug, Clone)]
pub struct AxpyRun {
    /// Output vector.
    pub z: Vec<f64>,
    /// Barrier and timing details.
    pub completion: Completion,
}

/// Offload `data` to `cluster` with the built-in kernel table.
///
/// The cluster must be running the [`offload_entry`] program.
///
/// # Errors
///
/// See [`run_offload`].
pub fn offload_axpy(soc: &Soc, cluster: ClusterId, data: &AxpyData) -> Result<AxpyRun> {
    let (params, z) = data.launch_params();
    let completion = run_offload(soc, cluster, &KernelTable::builtin(), params)?;
    Ok(AxpyRun {
        z: z.to_vec(),
        completion,
    })
}
