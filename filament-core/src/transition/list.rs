//! List transitions.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use super::{TransitionEntry, TransitionPhase};
use crate::config::is_server;
use crate::reactive::{untrack, Equals, Memo, Signal};

/// Where removed items stay until they are finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitMethod {
    /// Removed items move to the end, in their previous relative order.
    #[default]
    MoveToEnd,
    /// Removed items keep their previous index.
    KeepIndex,
    /// Removed items disappear right away; finishing does nothing.
    Remove,
}

/// Removes exiting items from a [`ListTransition`] once their exit
/// animation is over.
pub struct FinishRemoved<T: 'static> {
    pending: Rc<RefCell<Vec<T>>>,
    exiting: Rc<RefCell<HashSet<T>>>,
    trigger: Option<Signal<()>>,
}

impl<T: Clone + Eq + Hash + 'static> FinishRemoved<T> {
    /// Remove `items` from the result. Items that are not exiting are
    /// ignored.
    pub fn call(&self, items: &[T]) {
        let Some(trigger) = &self.trigger else {
            return;
        };
        let finished = {
            let mut exiting = self.exiting.borrow_mut();
            let mut pending = self.pending.borrow_mut();
            let before = pending.len();
            for item in items {
                if exiting.remove(item) {
                    pending.push(item.clone());
                }
            }
            pending.len() > before
        };
        if finished {
            trigger.notify();
        }
    }
}

impl<T: 'static> Clone for FinishRemoved<T> {
    fn clone(&self) -> Self {
        Self {
            pending: self.pending.clone(),
            exiting: self.exiting.clone(),
            trigger: self.trigger.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for FinishRemoved<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinishRemoved")
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

/// The partition handed to `on_change`.
#[derive(Debug, Clone)]
pub struct ListChange<T: 'static> {
    /// The new result: source order plus exiting items.
    pub list: Vec<T>,
    pub added: Vec<T>,
    pub removed: Vec<T>,
    pub unchanged: Vec<T>,
    pub finish_removed: FinishRemoved<T>,
}

/// Options for [`ListTransition::new`].
pub struct ListTransitionOptions<T: 'static> {
    /// Called once per flush in which the result changed.
    pub on_change: Option<Box<dyn Fn(ListChange<T>)>>,
    /// Treat the initial items as added.
    pub appear: bool,
    pub exit_method: ExitMethod,
}

impl<T: 'static> Default for ListTransitionOptions<T> {
    fn default() -> Self {
        Self {
            on_change: None,
            appear: false,
            exit_method: ExitMethod::default(),
        }
    }
}

/// A list that keeps removed items around until their exit is finished.
///
/// On every change of the source list the items are partitioned into
/// added, removed and unchanged ones. Items are compared by equality, so
/// they should be cheap identities (ids, `Rc` pointers, handles).
///
/// # Example
///
/// ```rust
/// use filament_core::transition::{ListTransition, ListTransitionOptions};
/// use filament_core::Signal;
///
/// let items = Signal::new(vec!["a", "b"]);
/// let source = items.clone();
/// let list = ListTransition::new(move || source.get(), ListTransitionOptions::default());
///
/// items.set(vec!["c", "a"]);
/// assert_eq!(list.get(), vec!["c", "a", "b"]);
///
/// list.finish_removed().call(&["b"]);
/// assert_eq!(list.get(), vec!["c", "a"]);
/// ```
pub struct ListTransition<T: 'static> {
    result: Memo<Vec<T>>,
    finish: FinishRemoved<T>,
    added: Rc<RefCell<HashSet<T>>>,
}

struct ListState<T> {
    prev_set: HashSet<T>,
    initial: Option<Vec<T>>,
}

impl<T: Clone + Eq + Hash + 'static> ListTransition<T> {
    pub fn new(source: impl Fn() -> Vec<T> + 'static, options: ListTransitionOptions<T>) -> Self {
        let init = untrack(&source);

        let exiting = Rc::new(RefCell::new(HashSet::new()));
        let pending = Rc::new(RefCell::new(Vec::new()));
        let added = Rc::new(RefCell::new(HashSet::new()));

        if is_server() {
            let finish = FinishRemoved {
                pending,
                exiting,
                trigger: None,
            };
            let result = Memo::new(move |_| init.clone());
            return Self {
                result,
                finish,
                added,
            };
        }

        let ListTransitionOptions {
            on_change,
            appear,
            exit_method,
        } = options;

        let trigger = match exit_method {
            ExitMethod::Remove => None,
            _ => Some(Signal::with_equality((), Equals::Never)),
        };
        let finish = FinishRemoved {
            pending: pending.clone(),
            exiting: exiting.clone(),
            trigger: trigger.clone(),
        };

        let state = RefCell::new(ListState {
            prev_set: if appear {
                HashSet::new()
            } else {
                init.iter().cloned().collect()
            },
            initial: Some(if appear { Vec::new() } else { init }),
        });

        let (finish_handle, added_set) = (finish.clone(), added.clone());
        let result = Memo::new(move |prev: Option<&Vec<T>>| {
            if let Some(trigger) = &trigger {
                trigger.with(|_| ());
            }
            let source_list = source();

            let mut state = state.borrow_mut();
            let prev = match state.initial.take() {
                Some(initial) => initial,
                None => prev.cloned().unwrap_or_default(),
            };

            // Finished items leave before the source is partitioned, so a
            // finish and a source change in one flush are both applied
            let finished: Vec<T> = std::mem::take(&mut *pending.borrow_mut());
            let prev: Vec<T> = if finished.is_empty() {
                prev
            } else {
                prev.into_iter().filter(|item| !finished.contains(item)).collect()
            };

            let next_set: HashSet<T> = source_list.iter().cloned().collect();
            let mut next = source_list.clone();
            let (mut added, mut removed, mut unchanged) = (Vec::new(), Vec::new(), Vec::new());

            for item in &source_list {
                if state.prev_set.contains(item) {
                    unchanged.push(item.clone());
                } else {
                    // An exiting item that comes back enters again
                    exiting.borrow_mut().remove(item);
                    added.push(item.clone());
                }
            }

            let mut nothing_changed = added.is_empty();
            for (index, item) in prev.iter().enumerate() {
                if !next_set.contains(item) {
                    if exiting.borrow_mut().insert(item.clone()) {
                        removed.push(item.clone());
                    }
                    match exit_method {
                        ExitMethod::MoveToEnd => next.push(item.clone()),
                        ExitMethod::KeepIndex => next.insert(index.min(next.len()), item.clone()),
                        ExitMethod::Remove => {}
                    }
                }
                if nothing_changed && next.get(index) != Some(item) {
                    nothing_changed = false;
                }
            }
            if exit_method == ExitMethod::Remove {
                exiting.borrow_mut().clear();
            }

            if removed.is_empty() && nothing_changed && finished.is_empty() {
                return prev;
            }

            state.prev_set = next_set;
            *added_set.borrow_mut() = added.iter().cloned().collect();
            if let Some(on_change) = &on_change {
                let change = ListChange {
                    list: next.clone(),
                    added,
                    removed,
                    unchanged,
                    finish_removed: finish_handle.clone(),
                };
                untrack(|| on_change(change));
            }
            next
        });

        Self {
            result,
            finish,
            added,
        }
    }
}

impl<T: Clone + Eq + Hash + 'static> ListTransition<T> {
    /// The current result, tracked.
    pub fn get(&self) -> Vec<T> {
        self.result.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&Vec<T>) -> R) -> R {
        self.result.with(f)
    }

    /// A handle that removes exiting items.
    pub fn finish_removed(&self) -> FinishRemoved<T> {
        self.finish.clone()
    }

    /// The current result with the phase of every item, tracked.
    pub fn entries(&self) -> Vec<TransitionEntry<T>> {
        // Reading first may recompute, which writes both sets
        let items = self.result.get();
        let exiting = self.finish.exiting.borrow();
        let added = self.added.borrow();
        items
            .into_iter()
            .map(|item| {
                let phase = if exiting.contains(&item) {
                    TransitionPhase::Exiting
                } else if added.contains(&item) {
                    TransitionPhase::Entering
                } else {
                    TransitionPhase::Present
                };
                TransitionEntry { item, phase }
            })
            .collect()
    }
}

#[cfg(all(test, not(feature = "server")))]
mod tests {
    use super::*;
    use crate::reactive::batch;

    type Changes = Rc<RefCell<Vec<(Vec<&'static str>, Vec<&'static str>, Vec<&'static str>)>>>;

    fn recorded(
        items: &Signal<Vec<&'static str>>,
        appear: bool,
        exit_method: ExitMethod,
    ) -> (ListTransition<&'static str>, Changes) {
        let changes: Changes = Rc::default();
        let log = changes.clone();
        let source = items.clone();
        let list = ListTransition::new(
            move || source.get(),
            ListTransitionOptions {
                on_change: Some(Box::new(move |change: ListChange<&'static str>| {
                    log.borrow_mut()
                        .push((change.added, change.removed, change.unchanged));
                })),
                appear,
                exit_method,
            },
        );
        (list, changes)
    }

    #[test]
    fn partitions_added_removed_unchanged() {
        let items = Signal::new(vec!["e1", "e2"]);
        let (list, changes) = recorded(&items, false, ExitMethod::MoveToEnd);
        assert!(changes.borrow().is_empty());

        items.set(vec!["e3", "e1", "e4"]);
        assert_eq!(list.get(), vec!["e3", "e1", "e4", "e2"]);
        assert_eq!(
            *changes.borrow(),
            vec![(vec!["e3", "e4"], vec!["e2"], vec!["e1"])]
        );

        let phases: Vec<_> = list.entries().into_iter().map(|e| e.phase).collect();
        assert_eq!(
            phases,
            vec![
                TransitionPhase::Entering,
                TransitionPhase::Present,
                TransitionPhase::Entering,
                TransitionPhase::Exiting,
            ]
        );
    }

    #[test]
    fn finishing_a_subset() {
        let items = Signal::new(vec!["a", "b", "c"]);
        let (list, _) = recorded(&items, false, ExitMethod::MoveToEnd);

        items.set(vec!["b"]);
        assert_eq!(list.get(), vec!["b", "a", "c"]);

        list.finish_removed().call(&["c"]);
        assert_eq!(list.get(), vec!["b", "a"]);
        list.finish_removed().call(&["a", "a"]);
        assert_eq!(list.get(), vec!["b"]);
    }

    #[test]
    fn keep_index_and_remove() {
        let items = Signal::new(vec!["a", "b", "c"]);
        let (kept, _) = recorded(&items, false, ExitMethod::KeepIndex);
        let (dropped, _) = recorded(&items, false, ExitMethod::Remove);

        items.set(vec!["a", "c"]);
        assert_eq!(kept.get(), vec!["a", "b", "c"]);
        assert_eq!(dropped.get(), vec!["a", "c"]);
    }

    #[test]
    fn appear_reports_initial_items() {
        let items = Signal::new(vec!["x"]);
        let (list, changes) = recorded(&items, true, ExitMethod::MoveToEnd);
        assert_eq!(list.get(), vec!["x"]);
        let none: Vec<&str> = Vec::new();
        assert_eq!(*changes.borrow(), vec![(vec!["x"], none.clone(), none)]);
    }

    #[test]
    fn one_change_per_flush() {
        let items = Signal::new(vec!["a"]);
        let (_list, changes) = recorded(&items, false, ExitMethod::MoveToEnd);

        batch(|| {
            items.set(vec!["a", "b"]);
            items.set(vec!["b", "c"]);
        });
        assert_eq!(changes.borrow().len(), 1);
        assert_eq!(changes.borrow()[0].1, vec!["a"]);
    }

    #[test]
    fn returning_item_enters_again() {
        let items = Signal::new(vec!["a", "b"]);
        let (list, changes) = recorded(&items, false, ExitMethod::MoveToEnd);

        items.set(vec!["a"]);
        items.set(vec!["a", "b"]);
        assert_eq!(list.get(), vec!["a", "b"]);
        assert_eq!(changes.borrow()[1].0, vec!["b"]);

        items.set(vec!["a"]);
        assert_eq!(changes.borrow()[2].1, vec!["b"]);
    }

    #[test]
    fn finish_and_source_change_in_one_batch() {
        let items = Signal::new(vec!["a", "b"]);
        let (list, changes) = recorded(&items, false, ExitMethod::MoveToEnd);

        items.set(vec!["a"]);
        assert_eq!(list.get(), vec!["a", "b"]);

        let finish = list.finish_removed();
        batch(|| {
            finish.call(&["b"]);
            items.set(vec!["a", "c"]);
        });
        assert_eq!(list.get(), vec!["a", "c"]);
        assert_eq!(changes.borrow().len(), 2);
        assert_eq!(changes.borrow()[1].0, vec!["c"]);
        assert!(changes.borrow()[1].1.is_empty());

        // The partition base moved on with the source
        items.set(vec!["c"]);
        assert_eq!(list.get(), vec!["c", "a"]);
        assert_eq!(changes.borrow()[2].1, vec!["a"]);
    }

    #[test]
    fn finish_alone_reports_remaining_items() {
        let items = Signal::new(vec!["a", "b"]);
        let (list, changes) = recorded(&items, false, ExitMethod::MoveToEnd);

        items.set(vec!["a"]);
        assert_eq!(list.get(), vec!["a", "b"]);
        list.finish_removed().call(&["b"]);
        assert_eq!(list.get(), vec!["a"]);
        let none: Vec<&str> = Vec::new();
        assert_eq!(changes.borrow()[1], (none.clone(), none, vec!["a"]));
    }
}
