//! Serde-backed configuration for the scheduler, debouncing and watches.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Decides when a runner leaves the scheduler's active set.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetirePolicy {
    /// Retire on the execution thread as soon as `execute` returns. Liveness
    /// probes may report idle before the item's teardown has landed.
    #[default]
    OnWorkEnded,
    /// Retire on the owner thread once teardown has run. Never call
    /// [`WorkScheduler::exit`](crate::work::WorkScheduler::exit) from the
    /// owner thread with this policy: the pump it waits on would be blocked.
    AfterTeardown,
}

/// Knobs for the work scheduler.
///
/// All fields carry defaults so a partial TOML/JSON payload is enough.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Size of the shared worker pool. `0` derives it from the CPU count.
    pub pool_threads: usize,
    /// Prefix for pool and dedicated thread names.
    pub thread_name_prefix: String,
    /// Sleep between polls while `exit` waits for active work to retire.
    pub exit_poll_interval_ms: u64,
    /// When a runner is removed from the active set.
    pub retire_policy: RetirePolicy,
    /// Run every admitted item inline on the caller. Meant for deterministic tests.
    pub single_threaded: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_threads: 0,
            thread_name_prefix: "tagwright-work".to_string(),
            exit_poll_interval_ms: 10,
            retire_policy: RetirePolicy::default(),
            single_threaded: false,
        }
    }
}

impl SchedulerConfig {
    /// Pool size after resolving `0` to the CPU count, capped at 16.
    pub fn resolved_pool_threads(&self) -> usize {
        if self.pool_threads == 0 {
            num_cpus::get().clamp(1, 16)
        } else {
            self.pool_threads
        }
    }

    /// Poll interval, never below one millisecond.
    pub fn exit_poll_interval(&self) -> Duration {
        Duration::from_millis(self.exit_poll_interval_ms.max(1))
    }
}

/// Quiet period used by a debounced producer/consumer path.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Milliseconds of silence required before the latest value is delivered.
    pub delay_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { delay_ms: 250 }
    }
}

impl DebounceConfig {
    /// Config with the given delay in milliseconds.
    pub const fn from_millis(delay_ms: u64) -> Self {
        Self { delay_ms }
    }

    /// The delay as a [`Duration`].
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Tuning for directory watches that feed debounced re-scans.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce window in milliseconds.
    pub debounce_window_ms: u64,
    /// Watch subdirectories as well as the root.
    pub recursive: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: 250,
            recursive: true,
        }
    }
}

impl WatchConfig {
    /// Debounce settings for the re-scan queue.
    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig::from_millis(self.debounce_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pool_threads_resolves_from_cpu_count() {
        let config = SchedulerConfig::default();
        let threads = config.resolved_pool_threads();
        assert!((1..=16).contains(&threads));

        let fixed = SchedulerConfig {
            pool_threads: 3,
            ..SchedulerConfig::default()
        };
        assert_eq!(fixed.resolved_pool_threads(), 3);
    }

    #[test]
    fn exit_poll_interval_never_zero() {
        let config = SchedulerConfig {
            exit_poll_interval_ms: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.exit_poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn retire_policy_uses_snake_case() {
        let json = serde_json::to_string(&RetirePolicy::AfterTeardown).unwrap();
        assert_eq!(json, "\"after_teardown\"");
    }
}
