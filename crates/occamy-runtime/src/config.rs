// SPDX-License-Identifier: AGPL-3.0-only

//! Runtime configuration
//!
//! Defaults suit the simulated SoC. Every field can be overridden from the
//! environment:
//!
//! | Variable | Field | Unit |
//! |----------|-------|------|
//! | `OCCAMY_LAUNCH_TIMEOUT_MS` | `launch_timeout` | ms |
//! | `OCCAMY_BARRIER_TIMEOUT_MS` | `barrier_timeout` | ms |
//! | `OCCAMY_ISOLATION_TIMEOUT_MS` | `isolation_timeout` | ms |
//! | `OCCAMY_POLL_INTERVAL_US` | `poll_interval` | µs |
//! | `OCCAMY_RETURN_POLICY` | `return_policy` | `wait` / `halt` |
//! | `OCCAMY_CLUSTER_HZ` | `cluster_clock_hz` | Hz |

use std::time::Duration;
use tracing::{debug, warn};

/// What a core does after reporting its arrival at the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnPolicy {
    /// Block until every participant has arrived.
    Wait,
    /// Return immediately; only the last arrival waits for nothing.
    Halt,
}

impl ReturnPolicy {
    /// Parse `wait` / `halt` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "wait" | "barrier" => Some(Self::Wait),
            "halt" | "return" => Some(Self::Halt),
            _ => None,
        }
    }
}

/// Timeouts and policies for one SoC handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Host wait for a completion signal.
    pub launch_timeout: Duration,
    /// Core wait for the rest of the barrier.
    pub barrier_timeout: Duration,
    /// Wait for the isolation cells to acknowledge a request.
    pub isolation_timeout: Duration,
    /// Sleep between register polls.
    pub poll_interval: Duration,
    /// Behaviour after barrier arrival.
    pub return_policy: ReturnPolicy,
    /// Nominal cluster clock, for the simulated cycle counters.
    pub cluster_clock_hz: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            launch_timeout: Duration::from_secs(5),
            barrier_timeout: Duration::from_secs(5),
            isolation_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_micros(20),
            return_policy: ReturnPolicy::Wait,
            cluster_clock_hz: occamy_soc::memmap::CLUSTER_CLOCK_HZ,
        }
    }
}

impl RuntimeConfig {
    /// Defaults, overridden by any `OCCAMY_*` variables that are set.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let parse_u64 = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Ignoring {key}={raw:?}: {e}");
                    None
                }
            }
        };

        if let Some(ms) = parse_u64("OCCAMY_LAUNCH_TIMEOUT_MS") {
            config.launch_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64("OCCAMY_BARRIER_TIMEOUT_MS") {
            config.barrier_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64("OCCAMY_ISOLATION_TIMEOUT_MS") {
            config.isolation_timeout = Duration::from_millis(ms);
        }
        if let Some(us) = parse_u64("OCCAMY_POLL_INTERVAL_US") {
            config.poll_interval = Duration::from_micros(us);
        }
        if let Some(hz) = parse_u64("OCCAMY_CLUSTER_HZ") {
            config.cluster_clock_hz = hz;
        }
        if let Some(raw) = lookup("OCCAMY_RETURN_POLICY") {
            match ReturnPolicy::parse(&raw) {
                Some(policy) => config.return_policy = policy,
                None => warn!("Ignoring OCCAMY_RETURN_POLICY={raw:?}: expected wait or halt"),
            }
        }

        debug!("Runtime config: {config:?}");
        config
    }

    /// Set the host completion timeout.
    #[must_use]
    pub const fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    /// Set the core barrier timeout.
    #[must_use]
    pub const fn with_barrier_timeout(mut self, timeout: Duration) -> Self {
        self.barrier_timeout = timeout;
        self
    }

    /// Set the isolation handshake timeout.
    #[must_use]
    pub const fn with_isolation_timeout(mut self, timeout: Duration) -> Self {
        self.isolation_timeout = timeout;
        self
    }

    /// Set the register poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the post-arrival policy.
    #[must_use]
    pub const fn with_return_policy(mut self, policy: ReturnPolicy) -> Self {
        self.return_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("OCCAMY_LAUNCH_TIMEOUT_MS", "250"),
            ("OCCAMY_POLL_INTERVAL_US", "0"),
            ("OCCAMY_RETURN_POLICY", "Halt"),
        ]
        .into_iter()
        .collect();
        let config = RuntimeConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(config.launch_timeout, Duration::from_millis(250));
        assert_eq!(config.poll_interval, Duration::ZERO);
        assert_eq!(config.return_policy, ReturnPolicy::Halt);
        assert_eq!(config.barrier_timeout, RuntimeConfig::default().barrier_timeout);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let config = RuntimeConfig::from_lookup(|k| match k {
            "OCCAMY_BARRIER_TIMEOUT_MS" => Some("soon".to_string()),
            "OCCAMY_RETURN_POLICY" => Some("maybe".to_string()),
            _ => None,
        });
        assert_eq!(config, RuntimeConfig::default());
    }
}
