//! Switch transitions.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::{TransitionEntry, TransitionPhase};
use crate::config::is_server;
use crate::reactive::{batch, untrack, Computed, Equals, Signal};

/// Order of the enter and exit hooks when the active item changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransitionMode {
    /// Exit the old item, then enter the new one.
    OutIn,
    /// Enter the new item, then exit the old one.
    InOut,
    /// Start both at once.
    #[default]
    Parallel,
}

/// Completion callback handed to enter and exit hooks. Calling it more
/// than once has no effect.
#[derive(Clone)]
pub struct Done {
    then: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl Done {
    fn new(then: impl FnOnce() + 'static) -> Self {
        Self {
            then: Rc::new(RefCell::new(Some(Box::new(then)))),
        }
    }

    pub fn call(&self) {
        let then = self.then.borrow_mut().take();
        if let Some(then) = then {
            batch(then);
        }
    }

    pub fn is_done(&self) -> bool {
        self.then.borrow().is_none()
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("done", &self.is_done())
            .finish()
    }
}

type Hook<T> = Box<dyn Fn(&T, Done)>;

/// Options for [`SwitchTransition::new`].
pub struct SwitchTransitionOptions<T: 'static> {
    /// Called when an item starts entering. Without a hook the enter
    /// completes at once.
    pub on_enter: Option<Hook<T>>,
    /// Called when an item starts exiting. Without a hook the exit
    /// completes at once.
    pub on_exit: Option<Hook<T>>,
    pub mode: TransitionMode,
    /// Run the enter hook for the initial item.
    pub appear: bool,
}

impl<T: 'static> Default for SwitchTransitionOptions<T> {
    fn default() -> Self {
        Self {
            on_enter: None,
            on_exit: None,
            mode: TransitionMode::default(),
            appear: false,
        }
    }
}

struct Slot<T> {
    current: Option<T>,
    entering: bool,
    exiting: Option<T>,
    busy: bool,
    queued: Option<Option<T>>,
}

struct SwitchInner<T: 'static> {
    on_enter: Option<Hook<T>>,
    on_exit: Option<Hook<T>>,
    mode: TransitionMode,
    slot: RefCell<Slot<T>>,
    output: Signal<Vec<T>>,
}

impl<T: Clone + PartialEq + 'static> SwitchInner<T> {
    fn publish(&self) {
        let items = {
            let slot = self.slot.borrow();
            slot.current.iter().chain(slot.exiting.iter()).cloned().collect()
        };
        self.output.set(items);
    }

    fn request(self: &Rc<Self>, target: Option<T>) {
        {
            let mut slot = self.slot.borrow_mut();
            if slot.busy {
                slot.queued = Some(target);
                return;
            }
        }
        self.start(target);
    }

    fn start(self: &Rc<Self>, target: Option<T>) {
        let prev = {
            let mut slot = self.slot.borrow_mut();
            if slot.current == target {
                return;
            }
            slot.busy = true;
            slot.current.clone()
        };

        let this = self.clone();
        let finish = move || this.finish();
        match self.mode {
            TransitionMode::OutIn => {
                let this = self.clone();
                self.exit(prev, Box::new(move || this.enter(target, Box::new(finish))));
            }
            TransitionMode::InOut => {
                let this = self.clone();
                self.enter(target, Box::new(move || this.exit(prev, Box::new(finish))));
            }
            TransitionMode::Parallel => {
                let remaining = Rc::new(Cell::new(2));
                let join: Rc<dyn Fn()> = Rc::new(move || {
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        finish();
                    }
                });
                let j = join.clone();
                self.exit(prev, Box::new(move || j()));
                self.enter(target, Box::new(move || join()));
            }
        }
    }

    fn enter(self: &Rc<Self>, target: Option<T>, then: Box<dyn FnOnce()>) {
        let Some(item) = target else {
            return then();
        };
        {
            let mut slot = self.slot.borrow_mut();
            slot.current = Some(item.clone());
            slot.entering = true;
        }
        self.publish();

        let this = self.clone();
        let done = Done::new(move || {
            this.slot.borrow_mut().entering = false;
            this.publish();
            then();
        });
        match &self.on_enter {
            Some(hook) => untrack(|| hook(&item, done)),
            None => done.call(),
        }
    }

    fn exit(self: &Rc<Self>, prev: Option<T>, then: Box<dyn FnOnce()>) {
        let Some(item) = prev else {
            return then();
        };
        {
            let mut slot = self.slot.borrow_mut();
            if slot.current.as_ref() == Some(&item) {
                slot.current = None;
                slot.entering = false;
            }
            slot.exiting = Some(item.clone());
        }
        self.publish();

        let this = self.clone();
        let done = Done::new(move || {
            this.slot.borrow_mut().exiting = None;
            this.publish();
            then();
        });
        match &self.on_exit {
            Some(hook) => untrack(|| hook(&item, done)),
            None => done.call(),
        }
    }

    fn finish(self: &Rc<Self>) {
        let queued = {
            let mut slot = self.slot.borrow_mut();
            slot.busy = false;
            slot.queued.take()
        };
        if let Some(target) = queued {
            self.start(target);
        }
    }
}

/// A single slot whose item changes with enter and exit transitions.
///
/// The output holds the current item first and the exiting item, if any,
/// second. While a transition is in progress further changes of the
/// source are coalesced and only the latest one starts once it completes.
///
/// # Example
///
/// ```rust
/// use filament_core::transition::{Done, SwitchTransition, SwitchTransitionOptions, TransitionMode};
/// use filament_core::Signal;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let page = Signal::new(Some("home"));
/// let exits = Rc::new(RefCell::new(Vec::new()));
///
/// let (source, pending) = (page.clone(), exits.clone());
/// let switch = SwitchTransition::new(
///     move || source.get(),
///     SwitchTransitionOptions {
///         on_exit: Some(Box::new(move |_: &&str, done: Done| pending.borrow_mut().push(done))),
///         mode: TransitionMode::Parallel,
///         ..Default::default()
///     },
/// );
///
/// page.set(Some("about"));
/// assert_eq!(switch.get(), vec!["about", "home"]);
///
/// exits.borrow()[0].call();
/// assert_eq!(switch.get(), vec!["about"]);
/// ```
pub struct SwitchTransition<T: 'static> {
    inner: Rc<SwitchInner<T>>,
    _driver: Option<Computed>,
}

impl<T: Clone + PartialEq + 'static> SwitchTransition<T> {
    pub fn new(
        source: impl Fn() -> Option<T> + 'static,
        options: SwitchTransitionOptions<T>,
    ) -> Self {
        let init = untrack(&source);
        let start_empty = options.appear && !is_server();

        let output = Signal::with_equality(
            if start_empty {
                Vec::new()
            } else {
                init.iter().cloned().collect()
            },
            Equals::Never,
        );
        let inner = Rc::new(SwitchInner {
            on_enter: options.on_enter,
            on_exit: options.on_exit,
            mode: options.mode,
            slot: RefCell::new(Slot {
                current: if start_empty { None } else { init },
                entering: false,
                exiting: None,
                busy: false,
                queued: None,
            }),
            output,
        });

        if is_server() {
            return Self {
                inner,
                _driver: None,
            };
        }

        let driver_inner = inner.clone();
        let driver = Computed::new(move |_| {
            let target = source();
            untrack(|| driver_inner.request(target));
        });

        Self {
            inner,
            _driver: Some(driver),
        }
    }

    /// The current item followed by the exiting one, tracked.
    pub fn get(&self) -> Vec<T> {
        self.inner.output.get()
    }

    /// The output with the phase of every item, tracked.
    pub fn entries(&self) -> Vec<TransitionEntry<T>> {
        self.inner.output.with(|_| ());
        let slot = self.inner.slot.borrow();
        let current = slot.current.iter().map(|item| TransitionEntry {
            item: item.clone(),
            phase: if slot.entering {
                TransitionPhase::Entering
            } else {
                TransitionPhase::Present
            },
        });
        let exiting = slot.exiting.iter().map(|item| TransitionEntry {
            item: item.clone(),
            phase: TransitionPhase::Exiting,
        });
        current.chain(exiting).collect()
    }

    /// Whether an enter or exit is still waiting for its `Done`.
    pub fn is_transitioning(&self) -> bool {
        self.inner.slot.borrow().busy
    }
}
