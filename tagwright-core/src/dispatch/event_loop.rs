use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use super::{Callback, Dispatcher, PostPriority};

enum Entry {
    Callback {
        callback: Callback,
        priority: PostPriority,
    },
    /// Posted by `exit`; clears the alive flag when reached.
    Exit,
}

struct LoopState {
    queue: VecDeque<Entry>,
    alive: bool,
    /// Set once `run` has returned; cleared when it is entered again.
    stopped: bool,
}

/// Single-consumer FIFO dispatcher pumped by [`run`](Self::run).
///
/// Any thread may post. Exactly one thread should call `run`; that thread
/// becomes the owner thread for everything posted here.
pub struct EventLoopDispatcher {
    state: Mutex<LoopState>,
    wake: Condvar,
    running: AtomicBool,
}

impl Default for EventLoopDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoopDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("EventLoopDispatcher");
        debug.field("running", &self.running.load(Ordering::Relaxed));
        match self.state.try_lock() {
            Some(state) => {
                debug
                    .field("pending", &state.queue.len())
                    .field("alive", &state.alive)
                    .field("stopped", &state.stopped);
            }
            None => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl EventLoopDispatcher {
    /// Idle dispatcher; nothing runs until a thread calls [`run`](Self::run)
    /// or [`pump_pending`](Self::pump_pending).
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopState {
                queue: VecDeque::new(),
                alive: false,
                stopped: false,
            }),
            wake: Condvar::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Pumps posted callbacks on the calling thread until an `exit` sentinel
    /// has been processed and the queue is empty.
    ///
    /// Callbacks run outside the queue lock. A panicking callback unwinds out
    /// of this call and stops the pump; later entries stay queued and the
    /// loop counts as stopped.
    pub fn run(&self) {
        let _pump = PumpGuard::enter(self);
        trace!("dispatcher pump started");

        while let Some(entry) = self.next_blocking() {
            self.process(entry);
        }
    }

    /// Queues the sentinel that makes [`run`](Self::run) return once every
    /// callback ahead of it has executed.
    pub fn exit(&self) {
        self.push(Entry::Exit);
    }

    /// Runs whatever is queued right now without blocking. Returns the number
    /// of callbacks executed. An `exit` sentinel met here is consumed.
    pub fn pump_pending(&self) -> usize {
        let mut executed = 0;
        loop {
            let Some(entry) = self.state.lock().queue.pop_front() else {
                break;
            };
            if matches!(entry, Entry::Callback { .. }) {
                executed += 1;
            }
            self.process(entry);
        }
        executed
    }

    /// Entries (callbacks and sentinels) waiting to be pumped.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether a thread is inside [`run`](Self::run).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether a [`run`](Self::run) call has returned or unwound and no new
    /// one has started.
    pub fn has_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    fn next_blocking(&self) -> Option<Entry> {
        let mut state = self.state.lock();
        loop {
            if let Some(entry) = state.queue.pop_front() {
                return Some(entry);
            }
            if !state.alive {
                return None;
            }
            self.wake.wait(&mut state);
        }
    }

    fn process(&self, entry: Entry) {
        match entry {
            Entry::Callback { callback, priority } => {
                trace!(%priority, "dispatching callback");
                callback();
            }
            Entry::Exit => {
                trace!("exit sentinel reached");
                self.state.lock().alive = false;
            }
        }
    }

    fn push(&self, entry: Entry) {
        let mut state = self.state.lock();
        if state.stopped && matches!(entry, Entry::Callback { .. }) {
            warn!(
                pending = state.queue.len() + 1,
                "callback posted after the dispatcher loop exited; it waits for the next pump"
            );
        }
        state.queue.push_back(entry);
        drop(state);
        self.wake.notify_one();
    }
}

impl Dispatcher for EventLoopDispatcher {
    fn post(&self, callback: Callback) {
        self.push(Entry::Callback {
            callback,
            priority: PostPriority::Normal,
        });
    }

    fn post_low_priority(&self, callback: Callback) {
        self.push(Entry::Callback {
            callback,
            priority: PostPriority::Low,
        });
    }
}

/// Brackets one `run` call. Dropping it, on return or unwind, marks the loop
/// stopped.
struct PumpGuard<'a>(&'a EventLoopDispatcher);

impl<'a> PumpGuard<'a> {
    fn enter(dispatcher: &'a EventLoopDispatcher) -> Self {
        dispatcher.running.store(true, Ordering::SeqCst);
        let mut state = dispatcher.state.lock();
        state.alive = true;
        state.stopped = false;
        drop(state);
        Self(dispatcher)
    }
}

impl Drop for PumpGuard<'_> {
    fn drop(&mut self) {
        self.0.state.lock().stopped = true;
        self.0.running.store(false, Ordering::SeqCst);
        trace!("dispatcher pump stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Callback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |value: u32| -> Callback {
            let sink = Arc::clone(&sink);
            Box::new(move || sink.lock().push(value))
        };
        (log, make)
    }

    #[test]
    fn callbacks_run_in_post_order_on_pumping_thread() {
        let dispatcher = Arc::new(EventLoopDispatcher::new());
        let (log, make) = recorder();
        let owner = Arc::new(Mutex::new(None));

        for value in 1..=3 {
            dispatcher.post(make(value));
        }
        let seen = Arc::clone(&owner);
        dispatcher.post(Box::new(move || {
            *seen.lock() = Some(thread::current().id());
        }));
        dispatcher.exit();

        let pump = Arc::clone(&dispatcher);
        let handle = thread::spawn(move || {
            pump.run();
            thread::current().id()
        });
        let pump_thread = handle.join().unwrap();

        assert_eq!(*log.lock(), vec![1, 2, 3]);
        assert_eq!(*owner.lock(), Some(pump_thread));
    }

    #[test]
    fn posts_from_several_threads_keep_submission_order() {
        let dispatcher = Arc::new(EventLoopDispatcher::new());
        let (log, make) = recorder();
        let make = Arc::new(make);

        for value in 1..=3 {
            let dispatcher = Arc::clone(&dispatcher);
            let make = Arc::clone(&make);
            thread::spawn(move || dispatcher.post(make(value)))
                .join()
                .unwrap();
        }
        dispatcher.exit();
        dispatcher.run();

        assert_eq!(*log.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn exit_waits_for_earlier_callbacks() {
        let dispatcher = Arc::new(EventLoopDispatcher::new());
        let (log, make) = recorder();

        let pump = Arc::clone(&dispatcher);
        let handle = thread::spawn(move || pump.run());

        dispatcher.post(Box::new(|| thread::sleep(Duration::from_millis(30))));
        dispatcher.post(make(7));
        dispatcher.exit();
        handle.join().unwrap();

        assert_eq!(*log.lock(), vec![7]);
        assert!(!dispatcher.is_running());
        assert!(dispatcher.has_stopped());
    }

    #[test]
    fn callbacks_queued_behind_exit_still_drain() {
        let dispatcher = EventLoopDispatcher::new();
        let (log, make) = recorder();

        dispatcher.post(make(1));
        dispatcher.exit();
        dispatcher.post(make(2));
        dispatcher.run();

        assert_eq!(*log.lock(), vec![1, 2]);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn posts_after_loop_exit_wait_for_next_pump() {
        let dispatcher = EventLoopDispatcher::new();
        let (log, make) = recorder();

        dispatcher.exit();
        dispatcher.run();

        dispatcher.post(make(3));
        assert_eq!(dispatcher.pending(), 1);
        assert!(log.lock().is_empty());

        dispatcher.exit();
        dispatcher.run();
        assert_eq!(*log.lock(), vec![3]);
    }

    #[test]
    fn idle_pump_wakes_on_post() {
        let dispatcher = Arc::new(EventLoopDispatcher::new());
        let (log, make) = recorder();

        let pump = Arc::clone(&dispatcher);
        let handle = thread::spawn(move || pump.run());
        thread::sleep(Duration::from_millis(20));
        assert!(dispatcher.is_running());

        dispatcher.post_low_priority(make(5));
        dispatcher.exit();
        handle.join().unwrap();

        assert_eq!(*log.lock(), vec![5]);
    }

    #[test]
    fn panicking_callback_stops_the_pump() {
        let dispatcher = EventLoopDispatcher::new();
        let (log, make) = recorder();

        dispatcher.post(Box::new(|| panic!("teardown bug")));
        dispatcher.post(make(9));
        dispatcher.exit();

        let outcome = catch_unwind(AssertUnwindSafe(|| dispatcher.run()));
        assert!(outcome.is_err());
        assert!(log.lock().is_empty());
        assert!(!dispatcher.is_running());
        assert_eq!(dispatcher.pending(), 2);
    }

    #[test]
    fn unwound_pump_counts_as_stopped() {
        let dispatcher = EventLoopDispatcher::new();
        let (log, make) = recorder();
        assert!(!dispatcher.has_stopped());

        dispatcher.post(Box::new(|| panic!("artwork cache poisoned")));
        let outcome = catch_unwind(AssertUnwindSafe(|| dispatcher.run()));
        assert!(outcome.is_err());
        assert!(dispatcher.has_stopped());
        assert!(format!("{dispatcher:?}").contains("stopped: true"));

        dispatcher.post(make(4));
        assert_eq!(dispatcher.pending(), 1);
        assert!(log.lock().is_empty());

        dispatcher.exit();
        dispatcher.run();
        assert_eq!(*log.lock(), vec![4]);
        assert!(dispatcher.has_stopped());
    }

    #[test]
    fn pump_pending_drains_without_blocking() {
        let dispatcher = EventLoopDispatcher::new();
        let (log, make) = recorder();

        assert_eq!(dispatcher.pump_pending(), 0);
        dispatcher.post(make(1));
        dispatcher.post(make(2));
        assert_eq!(dispatcher.pump_pending(), 2);
        assert_eq!(*log.lock(), vec![1, 2]);
    }
}
