// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for offload runtime operations

use crate::epoch::{Epoch, EpochStatus};
use crate::power::PowerState;
use crate::roles::SyncScope;
use crate::timer::ClockDomain;
use occamy_soc::{ClusterId, CoreIndex, IsolationMask};
use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Coarse classification of a [`RuntimeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid identifiers or a violated launch precondition. Fatal, never retried.
    Configuration,
    /// Barrier/hook misuse. Indicates a logic bug.
    Protocol,
    /// A bounded wait expired.
    Timeout,
    /// Register window or OS failure.
    Hardware,
    /// The offloaded kernel rejected its arguments.
    Payload,
}

/// Errors that can occur during offload runtime operations
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Cluster identifier outside the static partition
    #[error("Invalid {cluster}: SoC has {clusters} clusters")]
    InvalidCluster {
        /// Requested cluster
        cluster: ClusterId,
        /// Number of clusters on the SoC
        clusters: u8,
    },

    /// Core index outside the cluster
    #[error("Invalid {core}: clusters have {cores} cores")]
    InvalidCore {
        /// Requested core
        core: CoreIndex,
        /// Cores per cluster
        cores: u8,
    },

    /// Role partition or topology rejected
    #[error("Invalid partition: {reason}")]
    InvalidPartition {
        /// Reason for rejection
        reason: String,
    },

    /// Launch attempted on a cluster that has not been woken
    #[error("{cluster} is not running (state {state:?}); wake it first")]
    ClusterNotRunning {
        /// Target cluster
        cluster: ClusterId,
        /// Power state found
        state: PowerState,
    },

    /// The completion path back to the host is still isolated
    #[error("{cluster} cannot signal the host: only {released:?} released")]
    SignalPathIsolated {
        /// Target cluster
        cluster: ClusterId,
        /// Groups currently released
        released: IsolationMask,
    },

    /// A launch argument the kernel needs is missing
    #[error("Missing launch argument: {what}")]
    MissingArgument {
        /// Description of the argument
        what: String,
    },

    /// `return_to_host` called twice by one core in one epoch
    #[error("{cluster}/{core} already returned to host in epoch {epoch}")]
    DuplicateArrival {
        /// Cluster of the offending core
        cluster: ClusterId,
        /// Offending core
        core: CoreIndex,
        /// Epoch in which it happened
        epoch: Epoch,
    },

    /// Post-wake hook called twice by one core in one epoch
    #[error("{cluster}/{core} ran its post-wake hook twice in epoch {epoch}")]
    DuplicatePostWake {
        /// Cluster of the offending core
        cluster: ClusterId,
        /// Offending core
        core: CoreIndex,
        /// Epoch in which it happened
        epoch: Epoch,
    },

    /// Cores of one epoch disagree on the barrier scope
    #[error("{cluster}/{core} arrived with scope {got:?}, epoch uses {expected:?}")]
    ScopeMismatch {
        /// Cluster of the offending core
        cluster: ClusterId,
        /// Offending core
        core: CoreIndex,
        /// Scope fixed by the first arrival
        expected: SyncScope,
        /// Scope this core passed
        got: SyncScope,
    },

    /// A launch was attempted while the previous epoch is unfinished or unobserved
    #[error("{cluster} already has epoch {epoch} in flight")]
    EpochInFlight {
        /// Target cluster
        cluster: ClusterId,
        /// Epoch still in flight
        epoch: Epoch,
    },

    /// Barrier or hook used outside an epoch
    #[error("{cluster} has no epoch in flight")]
    NoEpoch {
        /// Cluster concerned
        cluster: ClusterId,
    },

    /// The epoch a core was serving has been aborted by the host
    #[error("{cluster} epoch {epoch} was aborted")]
    EpochAborted {
        /// Cluster concerned
        cluster: ClusterId,
        /// Aborted epoch
        epoch: Epoch,
    },

    /// Host saw a completion signal that does not match the epoch it waits for
    #[error("{cluster} signalled completion outside epoch {epoch}")]
    UnexpectedSignal {
        /// Cluster concerned
        cluster: ClusterId,
        /// Epoch the host was waiting for
        epoch: Epoch,
    },

    /// Cycle stamps from different clock domains were compared
    #[error("Cannot compare cycle stamps from {earlier:?} and {later:?}")]
    DomainMismatch {
        /// Domain of the earlier stamp
        earlier: ClockDomain,
        /// Domain of the later stamp
        later: ClockDomain,
    },

    /// Bounded wait expired
    #[error("Timeout after {waited_ms}ms waiting for {operation}")]
    Timeout {
        /// What was being waited for
        operation: String,
        /// Time waited in milliseconds
        waited_ms: u64,
        /// Epoch bookkeeping at expiry, when an epoch was involved
        status: Option<EpochStatus>,
    },

    /// Register window access failed
    #[error("Register access at {offset:#x} failed: {reason}")]
    Register {
        /// Offending offset
        offset: usize,
        /// Reason for failure
        reason: String,
    },

    /// The offloaded payload failed
    #[error("Payload failed: {reason}")]
    Payload {
        /// Reason for failure
        reason: String,
    },

    /// I/O error while opening or mapping the register window
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCluster { .. }
            | Self::InvalidCore { .. }
            | Self::InvalidPartition { .. }
            | Self::ClusterNotRunning { .. }
            | Self::SignalPathIsolated { .. }
            | Self::MissingArgument { .. } => ErrorKind::Configuration,
            Self::DuplicateArrival { .. }
            | Self::DuplicatePostWake { .. }
            | Self::ScopeMismatch { .. }
            | Self::EpochInFlight { .. }
            | Self::NoEpoch { .. }
            | Self::EpochAborted { .. }
            | Self::UnexpectedSignal { .. }
            | Self::DomainMismatch { .. } => ErrorKind::Protocol,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Register { .. } | Self::Io { .. } => ErrorKind::Hardware,
            Self::Payload { .. } => ErrorKind::Payload,
        }
    }

    /// Create an invalid partition error
    pub fn invalid_partition(reason: impl Into<String>) -> Self {
        Self::InvalidPartition {
            reason: reason.into(),
        }
    }

    /// Create a missing argument error
    pub fn missing_argument(what: impl Into<String>) -> Self {
        Self::MissingArgument { what: what.into() }
    }

    /// Create a register access error
    pub fn register(offset: usize, reason: impl Into<String>) -> Self {
        Self::Register {
            offset,
            reason: reason.into(),
        }
    }

    /// Create a payload error
    pub fn payload(reason: impl Into<String>) -> Self {
        Self::Payload {
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(
        operation: impl Into<String>,
        waited: std::time::Duration,
        status: Option<EpochStatus>,
    ) -> Self {
        Self::Timeout {
            operation: operation.into(),
            waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            status,
        }
    }
}
