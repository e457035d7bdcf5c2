//! Owner-thread callback marshaling.
//!
//! A [`Dispatcher`] accepts callbacks from any thread and runs them later on
//! one logical thread of control. Teardown phases of background work are
//! always routed through one, which is how owner-confined state (widgets,
//! view models) stays single-threaded.
//!
//! [`EventLoopDispatcher`] is the generic implementation: a FIFO drained by a
//! blocking `run` loop. Hosts with their own message loop supply an adapter
//! implementing [`Dispatcher`] instead.

mod event_loop;

use std::fmt;
use std::sync::Arc;

pub use event_loop::EventLoopDispatcher;

/// Unit of work posted to a dispatcher.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Lane hint attached to a posted callback.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum PostPriority {
    /// Regular callback.
    #[default]
    Normal,
    /// Non-urgent bookkeeping. Loops without an idle lane treat it as `Normal`.
    Low,
}

impl fmt::Display for PostPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostPriority::Normal => write!(f, "normal"),
            PostPriority::Low => write!(f, "low"),
        }
    }
}

/// Posts callbacks for later execution on a designated thread.
///
/// Implementations must never block the caller beyond a short lock and must
/// run callbacks one at a time in submission order.
pub trait Dispatcher: Send + Sync {
    /// Queues `callback` behind everything already posted.
    fn post(&self, callback: Callback);

    /// Queues `callback` on the idle lane. Defaults to [`post`](Self::post).
    fn post_low_priority(&self, callback: Callback) {
        self.post(callback);
    }
}

impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    fn post(&self, callback: Callback) {
        (**self).post(callback);
    }

    fn post_low_priority(&self, callback: Callback) {
        (**self).post_low_priority(callback);
    }
}
