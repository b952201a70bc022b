// SPDX-License-Identifier: AGPL-3.0-only

//! Silicon model for the Occamy heterogeneous SoC.
//!
//! This crate has **no dependencies** and **no hardware access**; it is a
//! pure model of the silicon: how the compute clusters are laid out, which
//! core of a cluster is the data-movement core, where the power, isolation
//! and interrupt registers live in the control window, and which signal
//! groups the isolation cells gate.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`topology`] | Cluster/core identifiers, compute vs. DM split, `SocTopology::OCCAMY` |
//! | [`regs`] | Control-window register map: power, isolation, wake and host interrupts |
//! | [`iso`] | Isolation signal groups and `IsolationMask` |
//! | [`memmap`] | Physical placement of the control window |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod iso;
pub mod memmap;
pub mod regs;
pub mod topology;

pub use iso::IsolationMask;
pub use topology::{ClusterId, CoreIndex, CoreRole, SocTopology};
