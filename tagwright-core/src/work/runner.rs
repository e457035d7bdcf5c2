use std::fmt;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, trace};

use super::{AbortFlag, Classification, WorkId, WorkInfo, WorkItem};
use crate::dispatch::Dispatcher;
use crate::error::{Result, WorkError};

/// Callback fired at a runner lifecycle point.
pub type RunnerHook = Arc<dyn Fn(&WorkInfo) + Send + Sync>;

/// Lifecycle hooks of a [`WorkRunner`].
///
/// `before` fires on the admitting thread once setup succeeded. `work_ended`
/// fires on the execution thread when `execute` returns or unwinds. `after`
/// fires wherever teardown runs, normally the owner thread.
#[derive(Clone, Default)]
pub struct RunnerHooks {
    /// After a successful setup.
    pub before: Option<RunnerHook>,
    /// When the main phase is over.
    pub work_ended: Option<RunnerHook>,
    /// After teardown.
    pub after: Option<RunnerHook>,
}

impl fmt::Debug for RunnerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerHooks")
            .field("before", &self.before.is_some())
            .field("work_ended", &self.work_ended.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

/// Where the after phase goes once `execute` is over.
#[derive(Clone)]
enum Finish {
    Post(Arc<dyn Dispatcher>),
    Inline,
    Skip,
}

/// Drives one [`WorkItem`] through setup, execute and teardown.
pub struct WorkRunner {
    info: WorkInfo,
    item: Box<dyn WorkItem>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    hooks: RunnerHooks,
}

impl fmt::Debug for WorkRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkRunner")
            .field("info", &self.info)
            .field("abort", self.item.abort_flag())
            .field("has_dispatcher", &self.dispatcher.is_some())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl WorkRunner {
    /// Wraps `item` under a fresh [`WorkId`]. Teardown is posted to
    /// `dispatcher` when there is one.
    pub fn new(item: Box<dyn WorkItem>, dispatcher: Option<Arc<dyn Dispatcher>>) -> Self {
        let info = WorkInfo {
            id: WorkId::new(),
            name: item.name().to_string(),
            classification: item.classification(),
        };
        Self {
            info,
            item,
            dispatcher,
            hooks: RunnerHooks::default(),
        }
    }

    /// Replaces the lifecycle hooks.
    pub fn with_hooks(mut self, hooks: RunnerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Identity reported to hooks.
    pub fn info(&self) -> &WorkInfo {
        &self.info
    }

    /// The runner's id.
    pub fn id(&self) -> WorkId {
        self.info.id
    }

    /// The item's class.
    pub fn classification(&self) -> Classification {
        self.info.classification
    }

    /// Handle onto the item's abort flag that outlives the runner.
    pub fn abort_handle(&self) -> AbortFlag {
        self.item.abort_flag().clone()
    }

    /// Forwards to [`WorkItem::abort_requested`].
    pub fn abort_requested(&self) -> bool {
        self.item.abort_requested()
    }

    /// Forwards to [`WorkItem::set_abort`].
    pub fn set_abort(&self, requested: bool) {
        self.item.set_abort(requested);
    }

    /// Runs `setup` on the calling thread, then the `before` hook.
    pub fn before(&mut self) -> Result<()> {
        trace!(work_id = %self.info.id, item = %self.info.name, "running setup");
        self.item
            .setup()
            .map_err(|err| WorkError::setup(self.info.name.clone(), err))?;

        if let Some(hook) = &self.hooks.before {
            hook(&self.info);
        }
        Ok(())
    }

    /// Runs `execute` on the calling thread, fires `work_ended`, then posts
    /// [`after`](Self::after) to the owning dispatcher.
    ///
    /// Without a dispatcher there is no owner thread, so teardown is skipped.
    pub fn run(self) {
        let finish = match &self.dispatcher {
            Some(dispatcher) => Finish::Post(Arc::clone(dispatcher)),
            None => Finish::Skip,
        };
        self.run_with(finish);
    }

    /// Runs execute and teardown back to back on the calling thread.
    pub fn run_single_threaded(self) {
        self.run_with(Finish::Inline);
    }

    /// Teardown phase followed by the `after` hook. Call on the owner thread.
    pub fn after(mut self) {
        self.item.teardown();
        trace!(work_id = %self.info.id, item = %self.info.name, "teardown complete");
        if let Some(hook) = &self.hooks.after {
            hook(&self.info);
        }
    }

    fn run_with(mut self, finish: Finish) {
        let ended = EndedGuard {
            info: self.info.clone(),
            hooks: self.hooks.clone(),
            finish: finish.clone(),
        };
        self.execute_logged();
        drop(ended);

        match finish {
            Finish::Post(dispatcher) => dispatcher.post(Box::new(move || self.after())),
            Finish::Inline => self.after(),
            Finish::Skip => {
                debug!(
                    work_id = %self.info.id,
                    item = %self.info.name,
                    "no owning dispatcher; teardown skipped"
                );
            }
        }
    }

    fn execute_logged(&mut self) {
        debug!(
            work_id = %self.info.id,
            item = %self.info.name,
            classification = %self.info.classification,
            "executing work item"
        );

        match self.item.execute() {
            Ok(()) if self.item.abort_requested() => {
                debug!(work_id = %self.info.id, item = %self.info.name, "work item stopped on abort");
            }
            Ok(()) => {}
            Err(err) => {
                let err = WorkError::from(err);
                error!(
                    work_id = %self.info.id,
                    item = %self.info.name,
                    error = %err,
                    "work item failed"
                );
            }
        }
    }
}

/// Fires `work_ended` whether `execute` returned or unwound. On unwind the
/// item is lost, so the `after` hook goes out alone and teardown never runs.
struct EndedGuard {
    info: WorkInfo,
    hooks: RunnerHooks,
    finish: Finish,
}

impl Drop for EndedGuard {
    fn drop(&mut self) {
        let unwinding = thread::panicking();
        if unwinding {
            error!(
                work_id = %self.info.id,
                item = %self.info.name,
                "work item panicked during execute; teardown skipped"
            );
        }

        if let Some(hook) = &self.hooks.work_ended {
            hook(&self.info);
        }

        if !unwinding {
            return;
        }
        let Some(after) = self.hooks.after.clone() else {
            return;
        };
        match &self.finish {
            Finish::Post(dispatcher) => {
                let info = self.info.clone();
                dispatcher.post(Box::new(move || after(&info)));
            }
            Finish::Inline => after(&self.info),
            Finish::Skip => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::thread::ThreadId;

    use parking_lot::Mutex;

    use super::*;
    use crate::dispatch::EventLoopDispatcher;
    use crate::work::Task;

    type Journal = Arc<Mutex<Vec<(&'static str, ThreadId)>>>;

    fn note(journal: &Journal, event: &'static str) {
        journal.lock().push((event, thread::current().id()));
    }

    fn events(journal: &Journal) -> Vec<&'static str> {
        journal.lock().iter().map(|(event, _)| *event).collect()
    }

    fn journaling_hooks(journal: &Journal) -> RunnerHooks {
        let before = Arc::clone(journal);
        let ended = Arc::clone(journal);
        let after = Arc::clone(journal);
        RunnerHooks {
            before: Some(Arc::new(move |_: &WorkInfo| note(&before, "before"))),
            work_ended: Some(Arc::new(move |_: &WorkInfo| note(&ended, "work_ended"))),
            after: Some(Arc::new(move |_: &WorkInfo| note(&after, "after"))),
        }
    }

    fn journaling_task(journal: &Journal) -> Task {
        let setup = Arc::clone(journal);
        let teardown = Arc::clone(journal);
        let execute = Arc::clone(journal);
        Task::builder(Classification::Background)
            .name("journal")
            .setup(move |_| {
                note(&setup, "setup");
                Ok(())
            })
            .teardown(move |_| note(&teardown, "teardown"))
            .execute(move |_| {
                note(&execute, "execute");
                Ok(())
            })
    }

    #[test]
    fn teardown_is_posted_to_the_owning_dispatcher() {
        let journal: Journal = Arc::default();
        let dispatcher = Arc::new(EventLoopDispatcher::new());
        let owner: Arc<dyn Dispatcher> = dispatcher.clone();

        let mut runner = WorkRunner::new(Box::new(journaling_task(&journal)), Some(owner))
            .with_hooks(journaling_hooks(&journal));
        runner.before().unwrap();

        let worker = thread::spawn(move || runner.run());
        let worker_id = worker.thread().id();
        worker.join().unwrap();

        assert_eq!(
            events(&journal),
            vec!["setup", "before", "execute", "work_ended"]
        );
        assert_eq!(dispatcher.pending(), 1);

        assert_eq!(dispatcher.pump_pending(), 1);
        assert_eq!(
            events(&journal),
            vec!["setup", "before", "execute", "work_ended", "teardown", "after"]
        );

        let here = thread::current().id();
        let journal = journal.lock();
        assert_eq!(journal[2].1, worker_id);
        assert_eq!(journal[3].1, worker_id);
        assert_eq!(journal[4].1, here);
        assert_eq!(journal[5].1, here);
    }

    #[test]
    fn setup_failure_skips_before_hook() {
        let journal: Journal = Arc::default();
        let task = Task::builder(Classification::Lock)
            .name("broken")
            .setup(|_| anyhow::bail!("library offline"))
            .execute(|_| Ok(()));

        let mut runner = WorkRunner::new(Box::new(task), None).with_hooks(journaling_hooks(&journal));
        let err = runner.before().unwrap_err();

        assert!(err.is_setup());
        assert!(err.to_string().contains("broken"));
        assert!(events(&journal).is_empty());
    }

    #[test]
    fn execute_error_still_reaches_teardown() {
        let journal: Journal = Arc::default();
        let teardown = Arc::clone(&journal);
        let task = Task::builder(Classification::Background)
            .teardown(move |_| note(&teardown, "teardown"))
            .execute(|_| anyhow::bail!("tag write failed"));

        let runner = WorkRunner::new(Box::new(task), None).with_hooks(journaling_hooks(&journal));
        runner.run_single_threaded();

        assert_eq!(events(&journal), vec!["work_ended", "teardown", "after"]);
    }

    #[test]
    fn missing_dispatcher_skips_teardown() {
        let journal: Journal = Arc::default();
        let runner = WorkRunner::new(Box::new(journaling_task(&journal)), None)
            .with_hooks(journaling_hooks(&journal));
        runner.run();

        assert_eq!(events(&journal), vec!["execute", "work_ended"]);
    }

    #[test]
    fn panic_in_execute_fires_work_ended_and_after_without_teardown() {
        let journal: Journal = Arc::default();
        let teardown = Arc::clone(&journal);
        let task = Task::builder(Classification::Background)
            .teardown(move |_| note(&teardown, "teardown"))
            .execute(|_| panic!("decoder blew up"));

        let dispatcher = Arc::new(EventLoopDispatcher::new());
        let owner: Arc<dyn Dispatcher> = dispatcher.clone();
        let runner =
            WorkRunner::new(Box::new(task), Some(owner)).with_hooks(journaling_hooks(&journal));

        let outcome = catch_unwind(AssertUnwindSafe(move || runner.run()));
        assert!(outcome.is_err());
        assert_eq!(events(&journal), vec!["work_ended"]);

        dispatcher.pump_pending();
        assert_eq!(events(&journal), vec!["work_ended", "after"]);
    }

    #[test]
    fn abort_is_delegated_to_the_item() {
        let flag = AbortFlag::new();
        let task = Task::builder(Classification::AbortableLock)
            .abort_flag(flag.clone())
            .execute(|_| Ok(()));
        let runner = WorkRunner::new(Box::new(task), None);

        assert!(!runner.abort_requested());
        runner.set_abort(true);
        assert!(flag.is_set());
        assert!(runner.abort_handle().is_set());
    }
}
