use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    AbortFlag, NoopWorkObserver, Placement, RunnerHook, RunnerHooks, WorkId, WorkInfo, WorkItem,
    WorkObserver, WorkRunner,
};
use crate::config::{RetirePolicy, SchedulerConfig};
use crate::dispatch::Dispatcher;
use crate::error::{Result, WorkError};

struct ActiveRunner {
    info: WorkInfo,
    abort: AbortFlag,
}

struct SchedulerInner {
    config: SchedulerConfig,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    observer: Arc<dyn WorkObserver>,
    active: Mutex<Vec<ActiveRunner>>,
    single_threaded: AtomicBool,
    pool: rayon::ThreadPool,
    dedicated_seq: AtomicUsize,
}

impl SchedulerInner {
    fn retire(&self, id: WorkId) -> bool {
        let mut active = self.active.lock();
        let before = active.len();
        active.retain(|runner| runner.info.id != id);
        before != active.len()
    }
}

/// Admits work items, broadcasts cancellation and answers liveness queries.
///
/// Cloning is cheap and every clone drives the same active set, pool and
/// dispatcher. Hosts construct one at startup and hand clones to whatever
/// needs to start or cancel work.
#[derive(Clone)]
pub struct WorkScheduler {
    inner: Arc<SchedulerInner>,
}

impl fmt::Debug for WorkScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("WorkScheduler");
        debug
            .field("pool_threads", &self.inner.pool.current_num_threads())
            .field("has_dispatcher", &self.inner.dispatcher.is_some())
            .field("single_threaded", &self.is_single_threaded())
            .field("retire_policy", &self.inner.config.retire_policy);
        match self.inner.active.try_lock() {
            Some(active) => {
                debug.field("active", &active.len());
            }
            None => {
                debug.field("active", &"<locked>");
            }
        }
        debug.finish()
    }
}

/// Configures a [`WorkScheduler`].
pub struct WorkSchedulerBuilder {
    config: SchedulerConfig,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    observer: Arc<dyn WorkObserver>,
}

impl fmt::Debug for WorkSchedulerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkSchedulerBuilder")
            .field("config", &self.config)
            .field("has_dispatcher", &self.dispatcher.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for WorkSchedulerBuilder {
    fn default() -> Self {
        Self {
            config: SchedulerConfig::default(),
            dispatcher: None,
            observer: Arc::new(NoopWorkObserver),
        }
    }
}

impl WorkSchedulerBuilder {
    /// Replaces the whole [`SchedulerConfig`].
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Owner dispatcher that receives every teardown.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Observer notified at each lifecycle point. Defaults to [`NoopWorkObserver`].
    pub fn observer(mut self, observer: Arc<dyn WorkObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Builds the worker pool and the scheduler. Fails on an empty thread
    /// name prefix or when the pool cannot be created.
    pub fn build(self) -> Result<WorkScheduler> {
        if self.config.thread_name_prefix.trim().is_empty() {
            return Err(WorkError::InvalidConfig(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }

        let threads = self.config.resolved_pool_threads();
        let prefix = self.config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |idx| format!("{prefix}-{idx}"))
            .panic_handler(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "<non-string panic payload>".to_string());
                error!(panic = %message, "work item panicked on pool thread");
            })
            .build()?;

        info!(
            pool_threads = threads,
            has_dispatcher = self.dispatcher.is_some(),
            retire_policy = ?self.config.retire_policy,
            "work scheduler ready"
        );

        let single_threaded = AtomicBool::new(self.config.single_threaded);
        Ok(WorkScheduler {
            inner: Arc::new(SchedulerInner {
                config: self.config,
                dispatcher: self.dispatcher,
                observer: self.observer,
                active: Mutex::new(Vec::new()),
                single_threaded,
                pool,
                dedicated_seq: AtomicUsize::new(0),
            }),
        })
    }
}

impl WorkScheduler {
    /// Starts a [`WorkSchedulerBuilder`] with default configuration.
    pub fn builder() -> WorkSchedulerBuilder {
        WorkSchedulerBuilder::default()
    }

    /// Scheduler with default configuration posting teardowns to `dispatcher`.
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Result<Self> {
        Self::builder().dispatcher(dispatcher).build()
    }

    /// Configuration the scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// [`start_boxed`](Self::start_boxed) for an unboxed item.
    pub fn start_work<W: WorkItem>(&self, item: W) -> Result<WorkId> {
        self.start_boxed(Box::new(item))
    }

    /// Admits `item`: registers it as active, runs its setup on the calling
    /// thread, then hands it to a worker thread chosen by classification.
    ///
    /// A setup failure removes the runner again and is returned; the item
    /// never executes. Items that need a worker pool thread are refused when
    /// no owner dispatcher is configured.
    pub fn start_boxed(&self, item: Box<dyn WorkItem>) -> Result<WorkId> {
        let classification = item.classification();
        let placement = classification.placement();
        let single_threaded = self.is_single_threaded();

        if !single_threaded && placement == Placement::Pool && self.inner.dispatcher.is_none() {
            return Err(WorkError::MissingDispatcher(classification.to_string()));
        }

        let mut runner = WorkRunner::new(item, self.inner.dispatcher.clone())
            .with_hooks(self.hooks(single_threaded));
        let info = runner.info().clone();

        self.inner.active.lock().push(ActiveRunner {
            info: info.clone(),
            abort: runner.abort_handle(),
        });
        debug!(
            work_id = %info.id,
            item = %info.name,
            %classification,
            "work admitted"
        );

        if let Err(err) = runner.before() {
            self.inner.retire(info.id);
            warn!(work_id = %info.id, item = %info.name, error = %err, "work setup failed");
            return Err(err);
        }

        if single_threaded {
            runner.run_single_threaded();
            return Ok(info.id);
        }

        match placement {
            Placement::Pool => self.inner.pool.spawn(move || runner.run()),
            Placement::DedicatedThread => {
                let seq = self.inner.dedicated_seq.fetch_add(1, Ordering::Relaxed);
                let name = format!("{}-invisible-{seq}", self.inner.config.thread_name_prefix);
                let spawned = thread::Builder::new()
                    .name(name.clone())
                    .spawn(move || runner.run());
                if let Err(source) = spawned {
                    self.inner.retire(info.id);
                    error!(work_id = %info.id, item = %info.name, error = %source, "failed to spawn work thread");
                    return Err(WorkError::Spawn { name, source });
                }
            }
        }

        Ok(info.id)
    }

    /// Sets or clears the abort flag of every active runner whose class
    /// honors global abort. Invisible work is left alone.
    pub fn set_abort(&self, requested: bool) {
        let active = self.inner.active.lock();
        let mut touched = 0usize;
        for runner in active
            .iter()
            .filter(|runner| runner.info.classification.honors_global_abort())
        {
            runner.abort.set(requested);
            touched += 1;
        }
        debug!(requested, runners = touched, "global abort updated");
    }

    /// Shorthand for `set_abort(true)`.
    pub fn abort_all(&self) {
        self.set_abort(true);
    }

    /// Requests abort of one runner regardless of its class. Returns `false`
    /// when `id` is not active.
    pub fn abort(&self, id: WorkId) -> bool {
        let active = self.inner.active.lock();
        match active.iter().find(|runner| runner.info.id == id) {
            Some(runner) => {
                runner.abort.request();
                true
            }
            None => false,
        }
    }

    /// `true` when no active runner has its abort flag set.
    pub fn is_abort_clear(&self) -> bool {
        !self
            .inner
            .active
            .lock()
            .iter()
            .any(|runner| runner.abort.is_set())
    }

    /// `true` when any non-invisible runner is active.
    pub fn is_working(&self) -> bool {
        self.inner
            .active
            .lock()
            .iter()
            .any(|runner| !runner.info.classification.is_invisible())
    }

    /// Admitted runners not yet retired, invisible ones included.
    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Snapshot of every active runner's identity.
    pub fn active_work(&self) -> Vec<WorkInfo> {
        self.inner
            .active
            .lock()
            .iter()
            .map(|runner| runner.info.clone())
            .collect()
    }

    /// Whether admissions currently run inline.
    pub fn is_single_threaded(&self) -> bool {
        self.inner.single_threaded.load(Ordering::SeqCst)
    }

    /// Runs later admissions inline on the caller. Work already on a worker
    /// thread is unaffected.
    pub fn set_single_threaded(&self, single_threaded: bool) {
        self.inner
            .single_threaded
            .store(single_threaded, Ordering::SeqCst);
    }

    /// Requests global abort and blocks until the active set is empty.
    ///
    /// Invisible work ignores the global abort, so its owner must stop it
    /// first or this never returns. Under [`RetirePolicy::AfterTeardown`]
    /// this must not be called from the owner thread.
    pub fn exit(&self) {
        info!(active = self.active_count(), "work scheduler exiting");
        self.set_abort(true);
        let poll = self.inner.config.exit_poll_interval();
        while self.active_count() > 0 {
            thread::sleep(poll);
        }
        info!("work scheduler drained");
    }

    /// Like [`exit`](Self::exit) but gives up after `timeout`. Returns whether
    /// the active set drained in time.
    ///
    /// A timeout too large to add to [`Instant::now`] waits like `exit`.
    pub fn exit_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.exit();
            return true;
        };
        self.set_abort(true);
        let poll = self.inner.config.exit_poll_interval();
        loop {
            let remaining = self.active_count();
            if remaining == 0 {
                info!("work scheduler drained");
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(remaining, "work scheduler exit timed out");
                return false;
            }
            thread::sleep(poll.min(deadline - now));
        }
    }

    fn hooks(&self, single_threaded: bool) -> RunnerHooks {
        // The after hook only runs when teardown has somewhere to run.
        let retire_after_teardown = self.inner.config.retire_policy == RetirePolicy::AfterTeardown
            && (single_threaded || self.inner.dispatcher.is_some());

        RunnerHooks {
            before: Some(self.hook(|inner, info| inner.observer.work_started(info))),
            work_ended: Some(self.hook(move |inner, info| {
                if !retire_after_teardown {
                    inner.retire(info.id);
                }
                inner.observer.work_ended(info);
            })),
            after: Some(self.hook(move |inner, info| {
                if retire_after_teardown {
                    inner.retire(info.id);
                }
                inner.observer.work_finished(info);
            })),
        }
    }

    fn hook<F>(&self, f: F) -> RunnerHook
    where
        F: Fn(&SchedulerInner, &WorkInfo) + Send + Sync + 'static,
    {
        let inner: Weak<SchedulerInner> = Arc::downgrade(&self.inner);
        Arc::new(move |info: &WorkInfo| {
            if let Some(inner) = inner.upgrade() {
                f(&inner, info);
            }
        })
    }
}
