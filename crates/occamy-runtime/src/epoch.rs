// SPDX-License-Identifier: AGPL-3.0-only

//! Per-cluster epoch state machine
//!
//! ```text
//!            open()                 last arrive()
//!   Idle ───────────► AwaitingArrivals ───────────► Signaled
//!    ▲                    │                            │
//!    │      abort()       │            open() once     │
//!    └────────────────────┘◄──── observed by the host ─┘
//! ```
//!
//! One [`EpochSync`] lives in each cluster's shared state. Arrivals are
//! counted explicitly and the completion signal is emitted by exactly one
//! transition, so "one signal per epoch" is checked here, not by convention.

use crate::error::{Result, RuntimeError};
use crate::roles::{core_bit, RolePartition, SyncScope};
use occamy_soc::{ClusterId, CoreIndex};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Generation number of one offload round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(pub u64);

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Barrier state of the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochState {
    /// No epoch in flight.
    Idle,
    /// Launched; waiting for participants.
    AwaitingArrivals,
    /// Every participant arrived; completion signalled.
    Signaled,
}

/// Outcome of one core's `return_to_host`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Counted; other participants are still outstanding.
    Waiting,
    /// Counted, and this arrival completed the barrier.
    Last,
    /// The core is outside the scope; nothing was counted.
    NotParticipating,
}

/// Snapshot of a cluster's epoch bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochStatus {
    /// Current (or last) epoch.
    pub epoch: Epoch,
    /// Barrier state.
    pub state: EpochState,
    /// Scope fixed by the first arrival, if any.
    pub scope: Option<SyncScope>,
    /// Participants counted so far.
    pub arrived: u32,
    /// Participants required, once the scope is known.
    pub expected: u32,
    /// Completion signals emitted in this epoch (0 or 1).
    pub signals: u32,
    /// Host has observed the completion.
    pub observed: bool,
}

#[derive(Debug)]
struct Inner {
    epoch: Epoch,
    state: EpochState,
    scope: Option<SyncScope>,
    arrived: u32,
    expected: u32,
    returned_mask: u32,
    post_wake_mask: u32,
    signals: u32,
    observed: bool,
    aborted: BTreeSet<Epoch>,
}

/// Where an epoch named by a core stands relative to the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Standing {
    /// The live epoch, awaiting arrivals or signalled.
    Live,
    /// Signalled, and the cluster has since moved on.
    Completed,
    /// Abandoned by the host.
    Aborted,
    /// Never opened.
    Unknown,
}

impl Inner {
    fn standing(&self, epoch: Epoch) -> Standing {
        if epoch.0 == 0 || epoch > self.epoch {
            Standing::Unknown
        } else if self.aborted.contains(&epoch) {
            Standing::Aborted
        } else if epoch == self.epoch && self.state != EpochState::Idle {
            Standing::Live
        } else {
            Standing::Completed
        }
    }

    fn status(&self) -> EpochStatus {
        EpochStatus {
            epoch: self.epoch,
            state: self.state,
            scope: self.scope,
            arrived: self.arrived,
            expected: self.expected,
            signals: self.signals,
            observed: self.observed,
        }
    }
}

/// Shared barrier for one cluster.
#[derive(Debug)]
pub struct EpochSync {
    cluster: ClusterId,
    inner: Mutex<Inner>,
    signaled: Condvar,
}

impl EpochSync {
    /// Create an idle barrier for `cluster`.
    pub fn new(cluster: ClusterId) -> Self {
        Self {
            cluster,
            inner: Mutex::new(Inner {
                epoch: Epoch(0),
                state: EpochState::Idle,
                scope: None,
                arrived: 0,
                expected: 0,
                returned_mask: 0,
                post_wake_mask: 0,
                signals: 0,
                observed: false,
                aborted: BTreeSet::new(),
            }),
            signaled: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current bookkeeping.
    pub fn status(&self) -> EpochStatus {
        self.lock().status()
    }

    /// Start a new epoch.
    ///
    /// # Errors
    ///
    /// Returns `EpochInFlight` unless the cluster is idle or its last
    /// completion has been observed by the host.
    pub fn open(&self) -> Result<Epoch> {
        let mut inner = self.lock();
        let free = match inner.state {
            EpochState::Idle => true,
            EpochState::Signaled => inner.observed,
            EpochState::AwaitingArrivals => false,
        };
        if !free {
            return Err(RuntimeError::EpochInFlight {
                cluster: self.cluster,
                epoch: inner.epoch,
            });
        }
        inner.epoch = Epoch(inner.epoch.0 + 1);
        inner.state = EpochState::AwaitingArrivals;
        inner.scope = None;
        inner.arrived = 0;
        inner.expected = 0;
        inner.returned_mask = 0;
        inner.post_wake_mask = 0;
        inner.signals = 0;
        inner.observed = false;
        tracing::debug!("{}: opened epoch {}", self.cluster, inner.epoch);
        Ok(inner.epoch)
    }

    fn stale(&self, standing: Standing, epoch: Epoch) -> RuntimeError {
        match standing {
            Standing::Aborted => RuntimeError::EpochAborted {
                cluster: self.cluster,
                epoch,
            },
            _ => RuntimeError::NoEpoch {
                cluster: self.cluster,
            },
        }
    }

    /// Record that `core` ran its post-wake hook in `epoch`.
    ///
    /// `acknowledge` runs under the barrier lock, and only while `epoch`
    /// is live, so it can never clear a wake bit raised for the next
    /// epoch. A late hook of an epoch that has already completed records
    /// nothing.
    ///
    /// # Errors
    ///
    /// - `InvalidCore` if `core` is past the core bitmap
    /// - `DuplicatePostWake` on a second call in the same epoch
    /// - `NoEpoch` / `EpochAborted` if `epoch` was never opened or was aborted
    /// - any error from `acknowledge`
    pub fn post_wake<F>(&self, epoch: Epoch, core: CoreIndex, acknowledge: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let bit = core_bit(core)?;
        let mut inner = self.lock();
        match inner.standing(epoch) {
            Standing::Live => {}
            Standing::Completed => {
                tracing::trace!("{}/{core}: late post-wake for epoch {epoch}", self.cluster);
                return Ok(());
            }
            standing => return Err(self.stale(standing, epoch)),
        }
        if inner.post_wake_mask & bit != 0 {
            return Err(RuntimeError::DuplicatePostWake {
                cluster: self.cluster,
                core,
                epoch,
            });
        }
        acknowledge()?;
        inner.post_wake_mask |= bit;
        Ok(())
    }

    /// Count `core`'s arrival at the barrier.
    ///
    /// The first arrival fixes the epoch's scope; its participant count
    /// comes from `partition`. A core outside the scope may still arrive
    /// after the host has moved on to the next epoch; it gets
    /// `NotParticipating`.
    ///
    /// # Errors
    ///
    /// - `InvalidCore` if `core` is not in `partition`
    /// - `DuplicateArrival` if `core` already returned in this epoch
    /// - `ScopeMismatch` if `scope` differs from the epoch's scope
    /// - `NoEpoch` / `EpochAborted` if `epoch` was never opened or was aborted
    pub fn arrive(
        &self,
        epoch: Epoch,
        core: CoreIndex,
        scope: SyncScope,
        partition: &RolePartition,
    ) -> Result<Arrival> {
        partition.role(core)?;
        let bit = core_bit(core)?;
        let mut inner = self.lock();
        match inner.standing(epoch) {
            Standing::Live => {}
            // every participant of a completed epoch has arrived already
            Standing::Completed if partition.participates(core, scope) => {
                return Err(RuntimeError::DuplicateArrival {
                    cluster: self.cluster,
                    core,
                    epoch,
                });
            }
            Standing::Completed => return Ok(Arrival::NotParticipating),
            standing => return Err(self.stale(standing, epoch)),
        }
        if inner.returned_mask & bit != 0 {
            return Err(RuntimeError::DuplicateArrival {
                cluster: self.cluster,
                core,
                epoch,
            });
        }

        match inner.scope {
            Some(fixed) if fixed != scope => {
                return Err(RuntimeError::ScopeMismatch {
                    cluster: self.cluster,
                    core,
                    expected: fixed,
                    got: scope,
                });
            }
            Some(_) => {}
            None => {
                inner.scope = Some(scope);
                inner.expected = partition.mask(scope).count_ones();
            }
        }

        inner.returned_mask |= bit;
        if !partition.participates(core, scope) {
            tracing::trace!("{}/{core}: outside {scope:?}, not counted", self.cluster);
            return Ok(Arrival::NotParticipating);
        }

        inner.arrived += 1;
        tracing::trace!(
            "{}/{core}: arrived {}/{} in epoch {}",
            self.cluster,
            inner.arrived,
            inner.expected,
            inner.epoch
        );

        if inner.arrived < inner.expected {
            return Ok(Arrival::Waiting);
        }

        debug_assert_eq!(inner.state, EpochState::AwaitingArrivals);
        debug_assert_eq!(inner.signals, 0);
        inner.state = EpochState::Signaled;
        inner.signals += 1;
        drop(inner);
        self.signaled.notify_all();
        Ok(Arrival::Last)
    }

    /// Block until `epoch` is signalled.
    ///
    /// Returns as soon as the epoch has completed, even if the host has
    /// already observed it and opened the next one.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` after `timeout`, or `EpochAborted` if the host
    /// aborted the epoch meanwhile.
    pub fn wait_signaled(&self, epoch: Epoch, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        let inner = self.lock();
        let (inner, _) = self
            .signaled
            .wait_timeout_while(inner, timeout, |i| {
                i.epoch == epoch && i.state == EpochState::AwaitingArrivals
            })
            .unwrap_or_else(PoisonError::into_inner);

        match inner.standing(epoch) {
            Standing::Live if inner.state == EpochState::AwaitingArrivals => {
                Err(RuntimeError::timeout(
                    format!("{} barrier in epoch {epoch}", self.cluster),
                    start.elapsed(),
                    Some(inner.status()),
                ))
            }
            Standing::Live | Standing::Completed => Ok(()),
            standing => Err(self.stale(standing, epoch)),
        }
    }

    /// Host side: accept the completion signal of `epoch`.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedSignal` if `epoch` has not been signalled.
    pub fn observe(&self, epoch: Epoch) -> Result<EpochStatus> {
        let mut inner = self.lock();
        if inner.epoch != epoch || inner.state != EpochState::Signaled || inner.observed {
            return Err(RuntimeError::UnexpectedSignal {
                cluster: self.cluster,
                epoch,
            });
        }
        inner.observed = true;
        Ok(inner.status())
    }

    /// Abandon the live epoch and return it; cores still waiting get
    /// `EpochAborted`.
    pub fn abort(&self) -> Option<Epoch> {
        let mut inner = self.lock();
        let aborted = match inner.state {
            EpochState::AwaitingArrivals => Some(inner.epoch),
            EpochState::Signaled if !inner.observed => Some(inner.epoch),
            _ => None,
        };
        if let Some(epoch) = aborted {
            inner.aborted.insert(epoch);
        }
        inner.state = EpochState::Idle;
        inner.scope = None;
        drop(inner);
        self.signaled.notify_all();
        if let Some(epoch) = aborted {
            tracing::warn!("{}: aborted epoch {epoch}", self.cluster);
        }
        aborted
    }
}
