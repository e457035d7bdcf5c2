//! Settings and logging bootstrap for Tagwright.
//!
//! Hosts call [`Settings::load`] once at startup, log the returned warnings,
//! install the subscriber with [`telemetry::init_tracing`], and build their
//! scheduler and debounced workers from the loaded values.

/// Settings model and loader.
pub mod settings;
/// Tracing subscriber bootstrap.
pub mod telemetry;
/// Env var parsing helpers.
pub mod util;
/// Post-load checks and warnings.
pub mod validation;

pub use settings::{Settings, SettingsLoad, SettingsSource};
pub use telemetry::init_tracing;
pub use validation::{SettingsWarning, SettingsWarnings};
