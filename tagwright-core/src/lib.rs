//! Cross-thread work scheduling for the Tagwright library manager.
//!
//! Long-running operations (re-scans, tag rewrites, artwork fetches) run on
//! worker threads while their results land on a single owner thread:
//!
//! - [`dispatch`] marshals callbacks onto the owner thread.
//! - [`debounce`] collapses bursts of input into one settled value.
//! - [`work`] classifies, admits, runs and cancels background work.
//! - `watch` (feature `watch`) turns filesystem activity into debounced re-scans.
//!
//! The main thread below is the owner thread. Shutdown runs on a helper
//! thread: the scheduler drains first, and only then does the pump get its
//! exit sentinel, so every teardown lands before `run` returns.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::thread;
//!
//! use tagwright_core::dispatch::EventLoopDispatcher;
//! use tagwright_core::work::{Classification, Task, WorkScheduler};
//! use tagwright_core::{RetirePolicy, SchedulerConfig};
//!
//! # fn main() -> tagwright_core::Result<()> {
//! let dispatcher = Arc::new(EventLoopDispatcher::new());
//! let scheduler = WorkScheduler::builder()
//!     .config(SchedulerConfig {
//!         retire_policy: RetirePolicy::AfterTeardown,
//!         ..SchedulerConfig::default()
//!     })
//!     .dispatcher(dispatcher.clone())
//!     .build()?;
//!
//! scheduler.start_work(
//!     Task::builder(Classification::Background)
//!         .name("rescan")
//!         .teardown(|_| println!("rescan finished"))
//!         .execute(|abort| {
//!             for dir in ["Albums", "Singles"] {
//!                 if abort.is_set() {
//!                     break;
//!                 }
//!                 println!("scanning {dir}");
//!             }
//!             Ok(())
//!         }),
//! )?;
//!
//! let shutdown = {
//!     let scheduler = scheduler.clone();
//!     let dispatcher = dispatcher.clone();
//!     thread::spawn(move || {
//!         scheduler.exit();
//!         dispatcher.exit();
//!     })
//! };
//!
//! dispatcher.run();
//! shutdown.join().expect("shutdown thread panicked");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod debounce;
pub mod dispatch;
pub mod error;
#[cfg(feature = "watch")]
pub mod watch;
pub mod work;

pub use config::{DebounceConfig, RetirePolicy, SchedulerConfig, WatchConfig};
pub use debounce::{DebouncedHandle, DebouncedQueue, DebouncedWorker};
pub use dispatch::{Callback, Dispatcher, EventLoopDispatcher, PostPriority};
pub use error::{Result, WorkError};
#[cfg(feature = "watch")]
pub use watch::DirectoryWatch;
pub use work::{
    AbortFlag, Classification, NoopWorkObserver, Placement, Task, TaskBuilder, WorkId, WorkInfo,
    WorkItem, WorkObserver, WorkRunner, WorkScheduler,
};
