use std::fmt;

use super::WorkInfo;

/// Hook points for hosts that mirror scheduler activity, typically to toggle
/// busy indicators and enable or disable controls.
///
/// Each callback runs on a different thread: `work_started` on the admitting
/// thread once setup succeeded, `work_ended` on the execution thread right
/// after `execute` returned, `work_finished` on the owner thread after
/// teardown.
pub trait WorkObserver: Send + Sync {
    /// Setup succeeded; execute is about to be scheduled.
    fn work_started(&self, _info: &WorkInfo) {}

    /// Execute returned or unwound.
    fn work_ended(&self, _info: &WorkInfo) {}

    /// Teardown ran.
    fn work_finished(&self, _info: &WorkInfo) {}
}

/// Observer used when the host does not care.
pub struct NoopWorkObserver;

impl WorkObserver for NoopWorkObserver {}

impl fmt::Debug for NoopWorkObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoopWorkObserver")
    }
}
