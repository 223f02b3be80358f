//! Timer hosts.
//!
//! Scheduled callbacks never sleep themselves; they ask a [`TimerHost`] to
//! call them back later. Two hosts ship with the crate: [`ManualTimers`], a
//! virtual clock advanced by hand, and [`TokioTimers`], backed by tokio's
//! local task set.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::trace;

/// Identifies a timer started by a [`TimerHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Something that can run a callback after a delay.
///
/// A zero delay means "on the next tick": the callback must never run
/// synchronously inside `set_timeout`.
pub trait TimerHost {
    /// Run `callback` once `delay` has elapsed.
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId;

    /// Cancel a timer. Unknown or already fired timers are ignored.
    fn clear_timeout(&self, id: TimerId);
}

impl<H: TimerHost + ?Sized> TimerHost for Rc<H> {
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        (**self).set_timeout(delay, callback)
    }

    fn clear_timeout(&self, id: TimerId) {
        (**self).clear_timeout(id)
    }
}

/// A deterministic virtual clock.
///
/// Time only moves when [`advance`](Self::advance) is called; due timers
/// then fire in deadline order (ties in start order). Clones share the
/// clock.
///
/// ```rust
/// use std::time::Duration;
/// use filament_core::scheduled::{ManualTimers, TimerHost};
///
/// let timers = ManualTimers::new();
/// timers.set_timeout(Duration::from_millis(10), Box::new(|| println!("fired")));
/// assert_eq!(timers.pending(), 1);
///
/// timers.advance(Duration::from_millis(10));
/// assert_eq!(timers.pending(), 0);
/// ```
#[derive(Clone, Default)]
pub struct ManualTimers {
    state: Rc<RefCell<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, u64), Box<dyn FnOnce()>>,
    deadlines: HashMap<u64, Duration>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    /// Number of timers that have not fired yet.
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Move the clock forward, firing every timer that becomes due.
    ///
    /// Timers started by a firing callback fire in the same call if they
    /// fall due before the new time.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        loop {
            let due = {
                let mut guard = self.state.borrow_mut();
                let state = &mut *guard;
                match state.queue.first_entry() {
                    Some(entry) if entry.key().0 <= target => {
                        let ((deadline, id), callback) = entry.remove_entry();
                        state.deadlines.remove(&id);
                        state.now = deadline;
                        Some(callback)
                    }
                    _ => None,
                }
            };
            match due {
                Some(callback) => callback(),
                None => break,
            }
        }
        self.state.borrow_mut().now = target;
    }

    /// Fire every timer that is due now, including zero-delay timers.
    pub fn run_due(&self) {
        self.advance(Duration::ZERO);
    }
}

impl TimerHost for ManualTimers {
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        let deadline = state.now + delay;
        state.queue.insert((deadline, id), callback);
        state.deadlines.insert(id, deadline);
        TimerId(id)
    }

    fn clear_timeout(&self, id: TimerId) {
        let mut state = self.state.borrow_mut();
        if let Some(deadline) = state.deadlines.remove(&id.0) {
            state.queue.remove(&(deadline, id.0));
        }
    }
}

impl fmt::Debug for ManualTimers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManualTimers")
            .field("now", &state.now)
            .field("pending", &state.queue.len())
            .finish()
    }
}

/// Timers on the current tokio `LocalSet`.
///
/// Each timer is a local task that sleeps and then runs the callback; it
/// must be used from inside [`tokio::task::LocalSet`].
#[derive(Clone, Default)]
pub struct TokioTimers {
    tasks: Rc<RefCell<HashMap<TimerId, AbortHandle>>>,
    next_id: Rc<Cell<u64>>,
}

impl TokioTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers that have not fired yet.
    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }
}

impl TimerHost for TokioTimers {
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let tasks = Rc::downgrade(&self.tasks);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(tasks) = tasks.upgrade() {
                tasks.borrow_mut().remove(&id);
            }
            callback();
        });
        self.tasks.borrow_mut().insert(id, handle.abort_handle());
        trace!(timer = id.0, ?delay, "timer started");
        id
    }

    fn clear_timeout(&self, id: TimerId) {
        if let Some(handle) = self.tasks.borrow_mut().remove(&id) {
            handle.abort();
        }
    }
}

impl fmt::Debug for TokioTimers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioTimers")
            .field("pending", &self.tasks.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |name| {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(name)) as Box<dyn FnOnce()>
        })
    }

    #[test]
    fn manual_timers_fire_in_deadline_order() {
        let timers = ManualTimers::new();
        let (log, record) = recorder();

        timers.set_timeout(Duration::from_millis(30), record("late"));
        timers.set_timeout(Duration::from_millis(10), record("early"));
        timers.set_timeout(Duration::from_millis(10), record("early-second"));

        timers.advance(Duration::from_millis(20));
        assert_eq!(*log.borrow(), vec!["early", "early-second"]);
        assert_eq!(timers.now(), Duration::from_millis(20));

        timers.advance(Duration::from_millis(10));
        assert_eq!(*log.borrow(), vec!["early", "early-second", "late"]);
    }

    #[test]
    fn zero_delay_is_never_synchronous() {
        let timers = ManualTimers::new();
        let (log, record) = recorder();

        timers.set_timeout(Duration::ZERO, record("tick"));
        assert!(log.borrow().is_empty());

        timers.run_due();
        assert_eq!(*log.borrow(), vec!["tick"]);
    }

    #[test]
    fn cleared_timers_do_not_fire() {
        let timers = ManualTimers::new();
        let (log, record) = recorder();

        let id = timers.set_timeout(Duration::from_millis(5), record("cleared"));
        timers.clear_timeout(id);
        timers.clear_timeout(id);
        timers.advance(Duration::from_millis(10));

        assert!(log.borrow().is_empty());
        assert_eq!(timers.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_timers_fire_after_delay() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let timers = TokioTimers::new();
                let (log, record) = recorder();

                timers.set_timeout(Duration::from_millis(50), record("fired"));
                let cancelled = timers.set_timeout(Duration::from_millis(50), record("cancelled"));
                timers.clear_timeout(cancelled);

                tokio::time::sleep(Duration::from_millis(10)).await;
                assert!(log.borrow().is_empty());

                tokio::time::sleep(Duration::from_millis(50)).await;
                assert_eq!(*log.borrow(), vec!["fired"]);
                assert_eq!(timers.pending(), 0);
            })
            .await;
    }
}
