use tracing::warn;

use crate::settings::Settings;

/// Upper bound for an explicit worker pool size.
pub const MAX_POOL_THREADS: usize = 64;

/// A setting that was ignored or adjusted while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsWarning {
    /// What happened, naming the setting or variable.
    pub message: String,
    /// How to fix it, when there is an obvious fix.
    pub hint: Option<String>,
}

/// Warnings collected across one settings load.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SettingsWarnings {
    /// In the order they were raised.
    pub items: Vec<SettingsWarning>,
}

impl SettingsWarnings {
    /// Adds a warning without a hint.
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(SettingsWarning {
            message: message.into(),
            hint: None,
        });
    }

    /// Adds a warning with a fix-it hint.
    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(SettingsWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    /// Whether nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of warnings.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Appends `other`'s warnings.
    pub fn extend(&mut self, other: SettingsWarnings) {
        self.items.extend(other.items);
    }

    /// Emits every warning through `tracing`.
    pub fn log(&self) {
        for item in &self.items {
            match &item.hint {
                Some(hint) => warn!(hint = %hint, "{}", item.message),
                None => warn!("{}", item.message),
            }
        }
    }
}

impl Settings {
    /// Clamps values the scheduler cannot honor and reports what changed.
    pub fn validate(&mut self) -> SettingsWarnings {
        let mut warnings = SettingsWarnings::default();
        let scheduler = &mut self.scheduler;

        if scheduler.exit_poll_interval_ms == 0 {
            scheduler.exit_poll_interval_ms = 1;
            warnings.push("scheduler.exit_poll_interval_ms was 0; clamped to 1");
        }

        if scheduler.pool_threads > MAX_POOL_THREADS {
            warnings.push_with_hint(
                format!(
                    "scheduler.pool_threads={} exceeds {MAX_POOL_THREADS}; clamped",
                    scheduler.pool_threads
                ),
                "Use 0 to size the pool from the CPU count",
            );
            scheduler.pool_threads = MAX_POOL_THREADS;
        }

        if scheduler.thread_name_prefix.trim().is_empty() {
            let fallback = tagwright_core::SchedulerConfig::default().thread_name_prefix;
            warnings.push(format!(
                "scheduler.thread_name_prefix was empty; using {fallback:?}"
            ));
            scheduler.thread_name_prefix = fallback;
        }

        for (field, delay_ms) in [
            ("search.delay_ms", self.search.delay_ms),
            ("tree_refresh.delay_ms", self.tree_refresh.delay_ms),
            ("watch.debounce_window_ms", self.watch.debounce_window_ms),
        ] {
            if delay_ms == 0 {
                warnings.push_with_hint(
                    format!("{field} is 0; every value will be delivered"),
                    "A quiet period of 150-300ms keeps bursts from reaching the consumer",
                );
            }
        }

        warnings
    }
}
