//! Scheduling Primitives
//!
//! Debounce, throttle and their leading-edge variants over a [`TimerHost`].
//!
//! # Overview
//!
//! Each constructor returns a [`Scheduled`] handle. Calling it with
//! arguments either runs the callback now (leading edge) or arms a timer
//! that runs it later with the latest arguments (trailing edge):
//!
//! | constructor                    | leading | trailing                       |
//! |--------------------------------|---------|--------------------------------|
//! | [`debounce`]                   | no      | after `wait` of silence        |
//! | [`throttle`]                   | no      | once per `wait` window         |
//! | [`leading`]                    | yes     | closes the window only         |
//! | [`leading_and_trailing`]       | yes     | if called again in the window  |
//!
//! When created under an owner (a root or a running computation), the
//! handle is cleared when the owner is disposed or re-runs, so a timer
//! never outlives the scope that started it.
//!
//! With the `server` feature every handle is inert.

mod timer;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::config::is_server;
use crate::reactive::{on_cleanup, ReactiveContext};

pub use timer::{ManualTimers, TimerHost, TimerId, TokioTimers};

/// Which window a leading-edge wrapper uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// The window stays open until `wait` passes without a call.
    Debounce,
    /// The window closes `wait` after it opened.
    Throttle,
}

/// A cancellable scheduled callback.
///
/// Handles are cheap to clone. Once the last handle is dropped, a pending
/// call is dropped too.
pub struct Scheduled<A: 'static> {
    state: Rc<State<A>>,
}

struct State<A> {
    host: Rc<dyn TimerHost>,
    callback: Box<dyn Fn(A)>,
    wait: Duration,
    schedule: Schedule,
    leading: bool,
    trailing: bool,
    timer: Cell<Option<TimerId>>,
    args: RefCell<Option<A>>,
}

impl<A: 'static> Scheduled<A> {
    fn new(
        host: impl TimerHost + 'static,
        callback: impl Fn(A) + 'static,
        wait: Duration,
        schedule: Schedule,
        leading: bool,
        trailing: bool,
    ) -> Self {
        let state = Rc::new(State {
            host: Rc::new(host),
            callback: Box::new(callback),
            wait,
            schedule,
            leading,
            trailing,
            timer: Cell::new(None),
            args: RefCell::new(None),
        });

        if ReactiveContext::current_owner().is_some() {
            let weak = Rc::downgrade(&state);
            on_cleanup(move || {
                if let Some(state) = weak.upgrade() {
                    state.clear();
                }
            });
        }

        Self { state }
    }

    /// Trigger the callback with `args`.
    pub fn call(&self, args: A) {
        if is_server() {
            return;
        }
        let state = &self.state;
        let idle = state.timer.get().is_none();

        if state.leading && idle {
            state.arm(&self.state);
            (state.callback)(args);
            return;
        }

        match state.schedule {
            Schedule::Debounce => state.arm(&self.state),
            Schedule::Throttle if idle => state.arm(&self.state),
            Schedule::Throttle => {}
        }
        if state.trailing {
            *state.args.borrow_mut() = Some(args);
        }
    }

    /// Cancel the pending call, if any. Never fails; clearing twice is fine.
    pub fn clear(&self) {
        self.state.clear();
    }

    /// Whether a timer is armed.
    pub fn is_pending(&self) -> bool {
        self.state.timer.get().is_some()
    }
}

impl<A> State<A> {
    /// (Re)start the window timer.
    fn arm(&self, this: &Rc<Self>)
    where
        A: 'static,
    {
        if let Some(timer) = self.timer.take() {
            self.host.clear_timeout(timer);
        }
        let weak: Weak<Self> = Rc::downgrade(this);
        let timer = self.host.set_timeout(
            self.wait,
            Box::new(move || {
                if let Some(state) = weak.upgrade() {
                    state.fire();
                }
            }),
        );
        self.timer.set(Some(timer));
    }

    fn fire(&self) {
        self.timer.set(None);
        let args = self.args.borrow_mut().take();
        if let Some(args) = args {
            (self.callback)(args);
        }
    }

    fn clear(&self) {
        if let Some(timer) = self.timer.take() {
            self.host.clear_timeout(timer);
        }
        self.args.borrow_mut().take();
    }
}

impl<A: 'static> Clone for Scheduled<A> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<A: 'static> fmt::Debug for Scheduled<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduled")
            .field("schedule", &self.state.schedule)
            .field("wait", &self.state.wait)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Run `callback` with the latest arguments once `wait` passes without
/// another call.
///
/// ```rust
/// use std::time::Duration;
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use filament_core::scheduled::{debounce, ManualTimers};
///
/// let timers = ManualTimers::new();
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = seen.clone();
/// let search = debounce(timers.clone(), move |q: &'static str| sink.borrow_mut().push(q), Duration::from_millis(100));
///
/// search.call("f");
/// search.call("fi");
/// search.call("fil");
/// timers.advance(Duration::from_millis(100));
/// assert_eq!(*seen.borrow(), vec!["fil"]);
/// ```
pub fn debounce<A: 'static>(
    host: impl TimerHost + 'static,
    callback: impl Fn(A) + 'static,
    wait: Duration,
) -> Scheduled<A> {
    Scheduled::new(host, callback, wait, Schedule::Debounce, false, true)
}

/// Run `callback` at most once per `wait` window, on the trailing edge, with
/// the latest arguments of the window.
pub fn throttle<A: 'static>(
    host: impl TimerHost + 'static,
    callback: impl Fn(A) + 'static,
    wait: Duration,
) -> Scheduled<A> {
    Scheduled::new(host, callback, wait, Schedule::Throttle, false, true)
}

/// Run `callback` right away on the first call of a window and ignore the
/// calls inside it.
pub fn leading<A: 'static>(
    schedule: Schedule,
    host: impl TimerHost + 'static,
    callback: impl Fn(A) + 'static,
    wait: Duration,
) -> Scheduled<A> {
    Scheduled::new(host, callback, wait, schedule, true, false)
}

/// Run `callback` right away on the first call of a window, and once more
/// at its end with the latest arguments if it was called again inside it.
pub fn leading_and_trailing<A: 'static>(
    schedule: Schedule,
    host: impl TimerHost + 'static,
    callback: impl Fn(A) + 'static,
    wait: Duration,
) -> Scheduled<A> {
    Scheduled::new(host, callback, wait, schedule, true, true)
}

#[cfg(all(test, not(feature = "server")))]
mod tests {
    use super::*;
    use crate::reactive::Root;

    const WAIT: Duration = Duration::from_millis(100);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn sink() -> (Rc<RefCell<Vec<i32>>>, impl Fn(i32) + 'static) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let out = log.clone();
        (log, move |n| out.borrow_mut().push(n))
    }

    #[test]
    fn debounce_collapses_bursts() {
        let timers = ManualTimers::new();
        let (log, callback) = sink();
        let scheduled = debounce(timers.clone(), callback, WAIT);

        scheduled.call(1);
        timers.advance(ms(50));
        scheduled.call(2);
        timers.advance(ms(50));
        scheduled.call(3);
        assert!(log.borrow().is_empty());

        timers.advance(ms(100));
        assert_eq!(*log.borrow(), vec![3]);
        assert!(!scheduled.is_pending());
    }

    #[test]
    fn throttle_fires_on_trailing_edge() {
        let timers = ManualTimers::new();
        let (log, callback) = sink();
        let scheduled = throttle(timers.clone(), callback, WAIT);

        scheduled.call(1);
        timers.advance(ms(30));
        scheduled.call(2);
        timers.advance(ms(30));
        scheduled.call(3);
        timers.advance(ms(40));
        assert_eq!(*log.borrow(), vec![3]);

        // The next call opens a new window
        scheduled.call(4);
        timers.advance(ms(100));
        assert_eq!(*log.borrow(), vec![3, 4]);
    }

    #[test]
    fn leading_runs_immediately_once_per_window() {
        let timers = ManualTimers::new();
        let (log, callback) = sink();
        let scheduled = leading(Schedule::Throttle, timers.clone(), callback, WAIT);

        scheduled.call(1);
        scheduled.call(2);
        assert_eq!(*log.borrow(), vec![1]);

        timers.advance(ms(100));
        assert_eq!(*log.borrow(), vec![1]);

        scheduled.call(3);
        assert_eq!(*log.borrow(), vec![1, 3]);
    }

    #[test]
    fn leading_debounce_extends_the_window() {
        let timers = ManualTimers::new();
        let (log, callback) = sink();
        let scheduled = leading(Schedule::Debounce, timers.clone(), callback, WAIT);

        scheduled.call(1);
        timers.advance(ms(80));
        scheduled.call(2);
        timers.advance(ms(80));
        scheduled.call(3);
        assert_eq!(*log.borrow(), vec![1]);

        timers.advance(ms(100));
        scheduled.call(4);
        assert_eq!(*log.borrow(), vec![1, 4]);
    }

    #[test]
    fn leading_and_trailing_only_trails_when_called_again() {
        let timers = ManualTimers::new();
        let (log, callback) = sink();
        let scheduled = leading_and_trailing(Schedule::Throttle, timers.clone(), callback, WAIT);

        scheduled.call(1);
        timers.advance(ms(100));
        assert_eq!(*log.borrow(), vec![1]);

        scheduled.call(2);
        scheduled.call(3);
        scheduled.call(4);
        timers.advance(ms(100));
        assert_eq!(*log.borrow(), vec![1, 2, 4]);
    }

    #[test]
    fn clear_cancels_without_calling() {
        let timers = ManualTimers::new();
        let (log, callback) = sink();
        let scheduled = debounce(timers.clone(), callback, WAIT);

        scheduled.call(1);
        scheduled.clear();
        scheduled.clear();
        timers.advance(ms(200));
        assert!(log.borrow().is_empty());
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn disposing_the_owner_clears_timers() {
        let timers = ManualTimers::new();
        let (log, callback) = sink();
        let (root, scheduled) = Root::new(|| throttle(timers.clone(), callback, WAIT));

        scheduled.call(1);
        root.dispose();
        timers.advance(ms(200));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn zero_wait_waits_for_the_next_tick() {
        let timers = ManualTimers::new();
        let (log, callback) = sink();
        let scheduled = debounce(timers.clone(), callback, Duration::ZERO);

        scheduled.call(7);
        assert!(log.borrow().is_empty());
        timers.run_due();
        assert_eq!(*log.borrow(), vec![7]);
    }
}
