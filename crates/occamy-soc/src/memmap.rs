// SPDX-License-Identifier: AGPL-3.0-only

//! Physical placement of the control window.
//!
//! ```text
//! Region          Base           Size     Purpose
//! ─────────────── ────────────── ──────── ───────────────────────────────────
//! soc_ctrl        0x0200_0000    64 KB    ID, scratch, host interrupt bits
//! cluster_ctrl    0x0200_1000    per-cl.  reset, clock gate, isolation, wake
//! ```
//!
//! The host reaches the window either through `/dev/mem` at
//! [`CTRL_WINDOW_PHYS`] or through a UIO node that exposes exactly this
//! region at offset 0.

/// Physical base of the control window.
pub const CTRL_WINDOW_PHYS: u64 = 0x0200_0000;

/// Size reserved for the control window (64 KB).
pub const CTRL_WINDOW_SIZE: usize = 64 * 1024;

/// Nominal cluster clock frequency (1 GHz).
pub const CLUSTER_CLOCK_HZ: u64 = 1_000_000_000;

/// Nominal host clock frequency (1 GHz).
pub const HOST_CLOCK_HZ: u64 = 1_000_000_000;
