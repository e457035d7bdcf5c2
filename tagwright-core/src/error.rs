//! Error type shared by the crate.

use thiserror::Error;

/// Failures surfaced by the scheduler and its helpers.
#[derive(Error, Debug)]
pub enum WorkError {
    /// An item's setup phase refused admission.
    #[error("Setup failed for {item}: {source}")]
    Setup {
        item: String,
        #[source]
        source: anyhow::Error,
    },

    /// An item's execute phase returned an error.
    #[error("Execution failed: {0}")]
    Execute(#[from] anyhow::Error),

    /// Pool work was started without an owner dispatcher.
    #[error("No owning dispatcher configured; {0} work must marshal teardown")]
    MissingDispatcher(String),

    /// A dedicated thread could not be spawned.
    #[error("Failed to spawn worker thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The rayon pool could not be built.
    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// The filesystem watcher failed.
    #[cfg(feature = "watch")]
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Configuration rejected at build time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WorkError {
    /// Wraps an arbitrary error raised while an item ran its setup phase.
    pub fn setup(item: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        WorkError::Setup {
            item: item.into(),
            source: source.into(),
        }
    }

    /// Whether this is a [`WorkError::Setup`].
    pub fn is_setup(&self) -> bool {
        matches!(self, WorkError::Setup { .. })
    }
}

/// Result alias over [`WorkError`].
pub type Result<T> = std::result::Result<T, WorkError>;
