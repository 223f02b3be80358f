//! Watchers
//!
//! A [`Watch`] calls a callback with the new and previous value of a
//! tracked source whenever it changes. Modifiers compose on top of that:
//!
//! ```rust
//! use filament_core::watch::{Modifier, Watch};
//! use filament_core::Signal;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let count = Signal::new(0);
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let (source, sink) = (count.clone(), seen.clone());
//! let handle = Watch::new(move || source.get(), move |n: &i32, _| sink.borrow_mut().push(*n))
//!     .modifier(Modifier::Defer)
//!     .modifier(Modifier::AtMost(2))
//!     .start();
//!
//! count.set(1);
//! count.set(2);
//! count.set(3);
//! assert_eq!(*seen.borrow(), vec![1, 2]);
//! assert!(handle.is_stopped());
//! ```
//!
//! Modifiers apply in the order they are added where order matters
//! (`Debounce` and `Throttle` wrap whatever came before them).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::reactive::{batch, untrack, Effect};
use crate::scheduled::{debounce, throttle, TimerHost};

/// Changes how a [`Watch`] reacts.
#[derive(Clone)]
pub enum Modifier {
    /// Skip the initial run.
    Defer,
    /// Stop after the callback ran `n` times.
    AtMost(usize),
    /// Stop after the first callback.
    Once,
    /// Only call back while the condition is true. The condition is
    /// tracked, so it turning true calls back with the current value.
    When(Rc<dyn Fn() -> bool>),
    /// Start active or paused; see [`WatchHandle::pause`].
    Pausable { active: bool },
    /// Enable [`WatchHandle::ignoring`].
    Ignorable,
    /// Call back once `wait` passes without a change.
    Debounce { host: Rc<dyn TimerHost>, wait: Duration },
    /// Call back at most once per `wait` window.
    Throttle { host: Rc<dyn TimerHost>, wait: Duration },
}

impl Modifier {
    pub fn when(condition: impl Fn() -> bool + 'static) -> Self {
        Self::When(Rc::new(condition))
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defer => f.write_str("Defer"),
            Self::AtMost(n) => f.debug_tuple("AtMost").field(n).finish(),
            Self::Once => f.write_str("Once"),
            Self::When(_) => f.write_str("When(..)"),
            Self::Pausable { active } => f.debug_struct("Pausable").field("active", active).finish(),
            Self::Ignorable => f.write_str("Ignorable"),
            Self::Debounce { wait, .. } => f.debug_struct("Debounce").field("wait", wait).finish(),
            Self::Throttle { wait, .. } => f.debug_struct("Throttle").field("wait", wait).finish(),
        }
    }
}

/// A watcher under construction.
pub struct Watch<T: 'static> {
    source: Box<dyn Fn() -> T>,
    callback: Box<dyn FnMut(&T, Option<&T>)>,
    modifiers: Vec<Modifier>,
}

impl<T: Clone + 'static> Watch<T> {
    /// Watch `source`. The callback receives the new value and the value of
    /// the previous run.
    pub fn new(
        source: impl Fn() -> T + 'static,
        callback: impl FnMut(&T, Option<&T>) + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            callback: Box::new(callback),
            modifiers: Vec::new(),
        }
    }

    pub fn modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Create the underlying effect under the current owner.
    pub fn start(self) -> WatchHandle {
        let Self {
            source,
            callback,
            modifiers,
        } = self;

        let mut defer = false;
        let mut limit: Option<usize> = None;
        let mut active = true;
        let mut ignorable = false;
        let mut conditions = Vec::new();
        let mut schedules = Vec::new();
        for modifier in modifiers {
            match modifier {
                Modifier::Defer => defer = true,
                Modifier::AtMost(n) => limit = Some(limit.map_or(n, |l| l.min(n))),
                Modifier::Once => limit = Some(limit.map_or(1, |l| l.min(1))),
                Modifier::When(condition) => conditions.push(condition),
                Modifier::Pausable { active: initial } => active = initial,
                Modifier::Ignorable => ignorable = true,
                Modifier::Debounce { host, wait } => schedules.push((true, host, wait)),
                Modifier::Throttle { host, wait } => schedules.push((false, host, wait)),
            }
        }

        let state = Rc::new(WatchState {
            active: Cell::new(active),
            ignorable,
            ignoring: Cell::new(false),
            stopped: Cell::new(false),
            runs: Cell::new(0),
            limit,
            effect: RefCell::new(None),
            clears: RefCell::new(Vec::new()),
        });

        let callback = RefCell::new(callback);
        // Scheduled wrappers live in `clears`; a strong ref here would cycle
        let weak = Rc::downgrade(&state);
        let mut deliver: Rc<dyn Fn((T, Option<T>))> = Rc::new(move |(value, prev): (T, Option<T>)| {
            let Some(st) = weak.upgrade() else {
                return;
            };
            if st.stopped.get() {
                return;
            }
            st.runs.set(st.runs.get() + 1);
            (callback.borrow_mut())(&value, prev.as_ref());
            if st.limit.is_some_and(|limit| st.runs.get() >= limit) {
                st.stop();
            }
        });

        for (debounced, host, wait) in schedules {
            let inner = deliver.clone();
            let scheduled = if debounced {
                debounce(host, move |args: (T, Option<T>)| inner(args), wait)
            } else {
                throttle(host, move |args: (T, Option<T>)| inner(args), wait)
            };
            let handle = scheduled.clone();
            state.clears.borrow_mut().push(Box::new(move || handle.clear()));
            deliver = Rc::new(move |args: (T, Option<T>)| scheduled.call(args));
        }

        let st = state.clone();
        let mut first = true;
        let effect = Effect::new(move |prev: Option<T>| {
            let value = source();
            let allowed = conditions.iter().fold(true, |ok, condition| condition() && ok);
            let skip = std::mem::replace(&mut first, false) && defer;
            if !skip && allowed && st.active.get() && !st.ignoring.get() {
                let args = (value.clone(), prev);
                untrack(|| deliver(args));
            }
            value
        });

        *state.effect.borrow_mut() = Some(effect.clone());
        if state.stopped.get() {
            effect.dispose();
        }

        WatchHandle { state }
    }
}

impl<T: 'static> fmt::Debug for Watch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("modifiers", &self.modifiers)
            .finish_non_exhaustive()
    }
}

struct WatchState {
    active: Cell<bool>,
    ignorable: bool,
    ignoring: Cell<bool>,
    stopped: Cell<bool>,
    runs: Cell<usize>,
    limit: Option<usize>,
    effect: RefCell<Option<Effect>>,
    clears: RefCell<Vec<Box<dyn Fn()>>>,
}

impl WatchState {
    fn stop(&self) {
        self.stopped.set(true);
        let effect = self.effect.borrow_mut().take();
        if let Some(effect) = effect {
            effect.dispose();
        }
        for clear in self.clears.borrow().iter() {
            clear();
        }
    }
}

/// Controls a started [`Watch`].
#[derive(Clone)]
pub struct WatchHandle {
    state: Rc<WatchState>,
}

impl WatchHandle {
    /// Dispose the underlying effect and drop pending scheduled calls.
    pub fn stop(&self) {
        self.state.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.get()
    }

    /// Changes while paused are dropped, not replayed on resume.
    pub fn pause(&self) {
        self.state.active.set(false);
    }

    pub fn resume(&self) {
        self.state.active.set(true);
    }

    /// Flip between paused and active; returns whether it is active now.
    pub fn toggle(&self) -> bool {
        let active = !self.state.active.get();
        self.state.active.set(active);
        active
    }

    pub fn is_active(&self) -> bool {
        self.state.active.get() && !self.state.stopped.get()
    }

    /// Run `f` in a batch without calling back for the writes it makes.
    ///
    /// Needs [`Modifier::Ignorable`]; otherwise `f` just runs. Writes only
    /// go unnoticed when the batch flushes before this returns, so calling
    /// it inside an outer batch has no effect.
    pub fn ignoring<R>(&self, f: impl FnOnce() -> R) -> R {
        if !self.state.ignorable {
            return f();
        }
        let _ignore = IgnoreGuard::enter(&self.state.ignoring);
        batch(f)
    }

    /// How many times the callback ran.
    pub fn run_count(&self) -> usize {
        self.state.runs.get()
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .field("stopped", &self.is_stopped())
            .field("runs", &self.run_count())
            .finish()
    }
}

struct IgnoreGuard<'a> {
    flag: &'a Cell<bool>,
    prev: bool,
}

impl<'a> IgnoreGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        let prev = flag.replace(true);
        Self { flag, prev }
    }
}

impl Drop for IgnoreGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.prev);
    }
}

#[cfg(all(test, not(feature = "server")))]
mod tests {
    use super::*;
    use crate::reactive::{Root, Signal};
    use crate::scheduled::ManualTimers;

    type Seen = Rc<RefCell<Vec<(i32, Option<i32>)>>>;

    fn watch(source: &Signal<i32>) -> (Watch<i32>, Seen) {
        let seen: Seen = Rc::default();
        let (read, sink) = (source.clone(), seen.clone());
        let watch = Watch::new(move || read.get(), move |value: &i32, prev: Option<&i32>| {
            sink.borrow_mut().push((*value, prev.copied()));
        });
        (watch, seen)
    }

    #[test]
    fn reports_previous_values() {
        let source = Signal::new(1);
        let (watch, seen) = watch(&source);
        let _handle = watch.start();

        source.set(2);
        assert_eq!(*seen.borrow(), vec![(1, None), (2, Some(1))]);
    }

    #[test]
    fn once_stops_after_first_call() {
        let source = Signal::new(1);
        let (watch, seen) = watch(&source);
        let handle = watch.modifier(Modifier::Once).start();

        source.set(2);
        assert_eq!(*seen.borrow(), vec![(1, None)]);
        assert!(handle.is_stopped());
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn when_gates_on_a_condition() {
        let source = Signal::new(1);
        let enabled = Signal::new(false);
        let (watch, seen) = watch(&source);
        let gate = enabled.clone();
        let _handle = watch.modifier(Modifier::when(move || gate.get())).start();

        source.set(2);
        assert!(seen.borrow().is_empty());
        enabled.set(true);
        assert_eq!(*seen.borrow(), vec![(2, Some(2))]);
    }

    #[test]
    fn pause_and_resume() {
        let source = Signal::new(0);
        let (watch, seen) = watch(&source);
        let handle = watch.modifier(Modifier::Pausable { active: false }).start();
        assert!(!handle.is_active());

        source.set(1);
        handle.resume();
        source.set(2);
        assert!(!handle.toggle());
        source.set(3);

        assert_eq!(*seen.borrow(), vec![(2, Some(1))]);
        assert_eq!(handle.run_count(), 1);
    }

    #[test]
    fn ignoring_skips_own_writes() {
        let source = Signal::new(0);
        let (watch, seen) = watch(&source);
        let handle = watch
            .modifier(Modifier::Defer)
            .modifier(Modifier::Ignorable)
            .start();

        handle.ignoring(|| source.set(5));
        source.set(6);
        assert_eq!(*seen.borrow(), vec![(6, Some(5))]);
    }

    #[test]
    fn debounced_callback() {
        let timers = ManualTimers::new();
        let source = Signal::new(0);
        let (watch, seen) = watch(&source);
        let _handle = watch
            .modifier(Modifier::Defer)
            .modifier(Modifier::Debounce {
                host: Rc::new(timers.clone()),
                wait: Duration::from_millis(50),
            })
            .start();

        source.set(1);
        source.set(2);
        source.set(3);
        assert!(seen.borrow().is_empty());

        timers.advance(Duration::from_millis(50));
        assert_eq!(*seen.borrow(), vec![(3, Some(2))]);
    }

    #[test]
    fn stopping_drops_pending_calls() {
        let timers = ManualTimers::new();
        let source = Signal::new(0);
        let (watch, seen) = watch(&source);
        let handle = watch
            .modifier(Modifier::Defer)
            .modifier(Modifier::Throttle {
                host: Rc::new(timers.clone()),
                wait: Duration::from_millis(50),
            })
            .start();

        source.set(1);
        handle.stop();
        timers.advance(Duration::from_millis(50));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn disposed_with_its_root() {
        let source = Signal::new(0);
        let (watch, seen) = watch(&source);
        let (root, handle) = Root::new(|| watch.start());

        root.dispose();
        source.set(1);
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(handle.run_count(), 1);
    }
}
