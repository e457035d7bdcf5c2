use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, trace, warn};

use super::DebouncedQueue;
use crate::config::DebounceConfig;
use crate::dispatch::Dispatcher;
use crate::work::{AbortFlag, Classification, WorkItem};

type ConsumeFn<T, R> = Box<dyn FnMut(T, &AbortFlag) -> anyhow::Result<R> + Send>;
type DeliverFn<R> = Arc<dyn Fn(R) + Send + Sync>;

/// Producer side of a [`DebouncedWorker`].
pub struct DebouncedHandle<T> {
    queue: Arc<DebouncedQueue<T>>,
    abort: AbortFlag,
}

impl<T> Clone for DebouncedHandle<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            abort: self.abort.clone(),
        }
    }
}

impl<T> fmt::Debug for DebouncedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebouncedHandle")
            .field("queue", &self.queue)
            .field("abort", &self.abort)
            .finish()
    }
}

impl<T> DebouncedHandle<T> {
    /// Queues `value` for the worker, restarting the quiet period.
    pub fn push(&self, value: T) {
        self.queue.enqueue(value);
    }

    /// Values queued but not yet consumed.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Stops the worker loop. Whatever is still queued is consumed once more
    /// unless the worker observes the abort first.
    pub fn shutdown(&self) {
        self.abort.request();
    }

    /// Whether the worker's abort flag is up, from any source.
    pub fn is_shut_down(&self) -> bool {
        self.abort.is_set()
    }
}

/// Invisible work item that feeds settled values of a [`DebouncedQueue`] to a
/// consumer and delivers each result on the owner thread.
///
/// The consumer runs on the worker's dedicated thread; the delivery closure
/// always runs on the dispatcher's thread, so it may touch owner-confined
/// state such as a result list.
pub struct DebouncedWorker<T, R = ()> {
    name: String,
    queue: Arc<DebouncedQueue<T>>,
    abort: AbortFlag,
    consume: ConsumeFn<T, R>,
    deliver: DeliverFn<R>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl<T, R> fmt::Debug for DebouncedWorker<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebouncedWorker")
            .field("name", &self.name)
            .field("queue", &self.queue)
            .field("abort", &self.abort)
            .finish_non_exhaustive()
    }
}

impl<T, R> DebouncedWorker<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Builds a worker that hands settled values to `consume` on its own
    /// thread and posts each result to `deliver` through `dispatcher`.
    pub fn new<C, D>(
        dispatcher: Arc<dyn Dispatcher>,
        config: DebounceConfig,
        consume: C,
        deliver: D,
    ) -> Self
    where
        C: FnMut(T, &AbortFlag) -> anyhow::Result<R> + Send + 'static,
        D: Fn(R) + Send + Sync + 'static,
    {
        let queue = Arc::new(DebouncedQueue::from_config(config));
        let abort = AbortFlag::new();
        let parked: Weak<DebouncedQueue<T>> = Arc::downgrade(&queue);
        abort.on_request(move || {
            if let Some(queue) = parked.upgrade() {
                queue.abort();
            }
        });

        Self {
            name: "debounced-worker".to_string(),
            queue,
            abort,
            consume: Box::new(consume),
            deliver: Arc::new(deliver),
            dispatcher,
        }
    }

    /// Sets the name used for logs and the worker thread's [`WorkInfo`](crate::work::WorkInfo).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Producer handle; take it before handing the worker to the scheduler.
    pub fn handle(&self) -> DebouncedHandle<T> {
        DebouncedHandle {
            queue: Arc::clone(&self.queue),
            abort: self.abort.clone(),
        }
    }

    fn stopping(&self) -> bool {
        self.abort.is_set() || self.queue.is_aborted()
    }
}

impl<T, R> WorkItem for DebouncedWorker<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn classification(&self) -> Classification {
        Classification::Invisible
    }

    fn abort_flag(&self) -> &AbortFlag {
        &self.abort
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self) -> anyhow::Result<()> {
        debug!(worker = %self.name, delay = ?self.queue.delay(), "debounced worker started");

        while !self.stopping() {
            let Some(value) = self.queue.dequeue_settled() else {
                continue;
            };
            if self.abort.is_set() {
                break;
            }

            match (self.consume)(value, &self.abort) {
                Ok(output) => {
                    trace!(worker = %self.name, "delivering settled result");
                    let deliver = Arc::clone(&self.deliver);
                    self.dispatcher.post(Box::new(move || deliver(output)));
                }
                Err(err) => {
                    warn!(worker = %self.name, error = %err, "debounced consumer failed");
                }
            }
        }

        debug!(worker = %self.name, "debounced worker stopped");
        Ok(())
    }
}
