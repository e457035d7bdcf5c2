//! Debounced producer/consumer queue.
//!
//! Protects a slow consumer (a library re-query, a directory re-scan) from
//! being invoked once per input event. Producers [`enqueue`] freely; the
//! consumer blocks in [`dequeue_settled`] until input has been quiet for the
//! configured delay and then receives only the newest value. Everything that
//! arrived before it in the same burst is dropped.
//!
//! [`DebouncedWorker`] wraps the consumer side into an invisible work item
//! whose results are delivered on the owner thread.
//!
//! [`enqueue`]: DebouncedQueue::enqueue
//! [`dequeue_settled`]: DebouncedQueue::dequeue_settled

mod worker;

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::DebounceConfig;

pub use worker::{DebouncedHandle, DebouncedWorker};

struct QueueState<T> {
    pending: VecDeque<T>,
    last_enqueue: Option<Instant>,
    delay: Duration,
    aborted: bool,
}

/// Thread-safe queue that releases only the newest value of each burst.
///
/// Any number of producers; one consumer at a time is expected.
pub struct DebouncedQueue<T = String> {
    state: Mutex<QueueState<T>>,
    wake: Condvar,
}

impl<T> fmt::Debug for DebouncedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("DebouncedQueue");
        match self.state.try_lock() {
            Some(state) => {
                debug
                    .field("pending", &state.pending.len())
                    .field("delay", &state.delay)
                    .field("aborted", &state.aborted);
            }
            None => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl<T> DebouncedQueue<T> {
    /// Empty queue with the given quiet period.
    pub fn new(delay: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                last_enqueue: None,
                delay,
                aborted: false,
            }),
            wake: Condvar::new(),
        }
    }

    /// Empty queue using the configured delay.
    pub fn from_config(config: DebounceConfig) -> Self {
        Self::new(config.delay())
    }

    /// Queues `value`, restarting the quiet period.
    pub fn enqueue(&self, value: T) {
        let mut state = self.state.lock();
        state.pending.push_back(value);
        state.last_enqueue = Some(Instant::now());
        drop(state);
        self.wake.notify_all();
    }

    /// Blocks until a value is queued and input has been quiet for the delay,
    /// then drains the queue and returns the newest value.
    ///
    /// Abort short-circuits both waits. After an abort the call returns
    /// whatever is newest right away, or `None` when nothing is queued.
    /// A delay too large to add to an [`Instant`] waits until abort or the
    /// delay is changed.
    pub fn dequeue_settled(&self) -> Option<T> {
        let mut state = self.state.lock();
        while state.pending.is_empty() && !state.aborted {
            self.wake.wait(&mut state);
        }

        while !state.aborted {
            let Some(last) = state.last_enqueue else {
                break;
            };
            let Some(deadline) = last.checked_add(state.delay) else {
                self.wake.wait(&mut state);
                continue;
            };
            if Instant::now() >= deadline {
                break;
            }
            self.wake.wait_until(&mut state, deadline);
        }

        state.pending.drain(..).last()
    }

    /// Undelivered values currently queued, superseded ones included.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Marks the queue aborted and wakes any blocked consumer.
    pub fn abort(&self) {
        self.set_abort(true);
    }

    /// Raises or clears the abort state. Clearing it makes
    /// [`dequeue_settled`](Self::dequeue_settled) block again.
    pub fn set_abort(&self, aborted: bool) {
        self.state.lock().aborted = aborted;
        if aborted {
            self.wake.notify_all();
        }
    }

    /// Whether the queue is aborted.
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Current quiet period.
    pub fn delay(&self) -> Duration {
        self.state.lock().delay
    }

    /// Changes the quiet period. A consumer already waiting picks it up on
    /// its next wake.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
        self.wake.notify_all();
    }
}
