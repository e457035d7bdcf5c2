//! Cancellable background work.
//!
//! A [`WorkItem`] goes through three phases: `setup` on the admitting thread,
//! `execute` on a worker thread, `teardown` on the owner thread behind the
//! scheduler's [`Dispatcher`](crate::dispatch::Dispatcher). The
//! [`WorkScheduler`] admits items, broadcasts cancellation and answers
//! liveness queries; a [`WorkRunner`] drives a single item through its phases.
//!
//! Cancellation is cooperative. Setting an item's [`AbortFlag`] never
//! interrupts `execute`; long-running bodies must poll it at bounded intervals
//! and return early, leaving consistent state behind.

mod observer;
mod runner;
mod scheduler;
mod task;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use observer::{NoopWorkObserver, WorkObserver};
pub use runner::{RunnerHook, RunnerHooks, WorkRunner};
pub use scheduler::{WorkScheduler, WorkSchedulerBuilder};
pub use task::{Task, TaskBuilder};

/// Unique identifier for admitted work.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct WorkId(pub Uuid);

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkId {
    /// Fresh time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an item is placed and how the host should present itself while it runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Silent housekeeping on its own thread. Ignored by global abort and by
    /// liveness queries.
    Invisible,
    /// Foreground locked, cancel control shown.
    Background,
    /// Foreground locked, cancel control shown.
    AbortableLock,
    /// Foreground locked, no cancel control.
    Lock,
}

/// Thread placement derived from a [`Classification`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Placement {
    /// A named thread of its own.
    DedicatedThread,
    /// The scheduler's shared worker pool.
    Pool,
}

impl Classification {
    /// The single classification → thread placement mapping.
    pub fn placement(self) -> Placement {
        match self {
            Classification::Invisible => Placement::DedicatedThread,
            Classification::Background | Classification::AbortableLock | Classification::Lock => {
                Placement::Pool
            }
        }
    }

    /// Whether the item is silent housekeeping.
    pub fn is_invisible(self) -> bool {
        matches!(self, Classification::Invisible)
    }

    /// Whether the scheduler's global abort reaches items of this class.
    pub fn honors_global_abort(self) -> bool {
        !self.is_invisible()
    }

    /// Whether the host should lock its foreground while the item runs.
    pub fn locks_foreground(self) -> bool {
        !self.is_invisible()
    }

    /// Whether the host should offer a cancel control.
    pub fn shows_cancel(self) -> bool {
        matches!(
            self,
            Classification::Background | Classification::AbortableLock
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Invisible => write!(f, "invisible"),
            Classification::Background => write!(f, "background"),
            Classification::AbortableLock => write!(f, "abortable-lock"),
            Classification::Lock => write!(f, "lock"),
        }
    }
}

type AbortListener = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct AbortState {
    requested: AtomicBool,
    listeners: Mutex<Vec<AbortListener>>,
}

/// Shared, thread-safe abort request flag.
///
/// Clones observe the same flag, so the scheduler can hold a handle while the
/// item itself is owned by a worker thread. Items that block on something
/// other than the flag register an [`on_request`](Self::on_request) listener
/// to get woken.
#[derive(Clone, Default)]
pub struct AbortFlag(Arc<AbortState>);

impl AbortFlag {
    /// A cleared flag with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether abort has been requested.
    pub fn is_set(&self) -> bool {
        self.0.requested.load(Ordering::SeqCst)
    }

    /// Raises or clears the flag. Raising it runs every registered listener
    /// on the calling thread.
    pub fn set(&self, requested: bool) {
        self.0.requested.store(requested, Ordering::SeqCst);
        if requested {
            for listener in self.0.listeners.lock().iter() {
                listener();
            }
        }
    }

    /// Shorthand for `set(true)`.
    pub fn request(&self) {
        self.set(true);
    }

    /// Shorthand for `set(false)`.
    pub fn clear(&self) {
        self.set(false);
    }

    /// Registers `listener` to run each time the flag is raised. Runs it at
    /// once if the flag is already up.
    ///
    /// Listeners run on the raising thread, possibly under scheduler locks,
    /// so they must not call back into the scheduler or register on this flag.
    pub fn on_request(&self, listener: impl Fn() + Send + Sync + 'static) {
        let mut listeners = self.0.listeners.lock();
        if self.is_set() {
            listener();
        }
        listeners.push(Box::new(listener));
    }
}

impl fmt::Debug for AbortFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AbortFlag").field(&self.is_set()).finish()
    }
}

/// Identity of a runner as reported to hooks and observers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkInfo {
    /// Id assigned at admission.
    pub id: WorkId,
    /// The item's [`WorkItem::name`].
    pub name: String,
    /// The item's class, fixed for its lifetime.
    pub classification: Classification,
}

/// A unit of cancellable background work.
///
/// `setup` runs on the thread calling
/// [`WorkScheduler::start_work`]; `execute` runs on a worker thread;
/// `teardown` runs on the owner thread. Only `teardown` may touch
/// owner-confined state, and it must not panic: a panic there unwinds the
/// owner's dispatcher pump.
pub trait WorkItem: Send + 'static {
    /// Decides placement and whether global abort applies.
    fn classification(&self) -> Classification;

    /// The flag `execute` polls.
    fn abort_flag(&self) -> &AbortFlag;

    /// Name used in logs and [`WorkInfo`].
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs on the admitting thread. An error refuses admission.
    fn setup(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Main phase. Returning early after observing the abort flag is a normal
    /// completion. Errors are logged by the runner and do not stop teardown.
    fn execute(&mut self) -> anyhow::Result<()>;

    /// Runs on the owner thread after `execute`.
    fn teardown(&mut self) {}

    /// Current state of the abort flag.
    fn abort_requested(&self) -> bool {
        self.abort_flag().is_set()
    }

    /// Raises or clears the abort flag.
    fn set_abort(&self, requested: bool) {
        self.abort_flag().set(requested);
    }
}
