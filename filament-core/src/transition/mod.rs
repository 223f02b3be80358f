//! Transitions
//!
//! Both primitives keep outgoing items visible until the caller reports
//! that their exit is finished:
//!
//! - [`ListTransition`] partitions every change of a list into added,
//!   removed and unchanged items. Removed items stay in the result until
//!   [`FinishRemoved`] is called for them.
//! - [`SwitchTransition`] drives a single slot through enter and exit
//!   hooks, each completed with a [`Done`] callback.
//!
//! With the `server` feature both return their initial value unchanged.

mod list;
mod switch;

pub use list::{ExitMethod, FinishRemoved, ListChange, ListTransition, ListTransitionOptions};
pub use switch::{Done, SwitchTransition, SwitchTransitionOptions, TransitionMode};

/// Where an item is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionPhase {
    Entering,
    Present,
    Exiting,
}

/// An item of a transition result together with its phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEntry<T> {
    pub item: T,
    pub phase: TransitionPhase,
}
