//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and effects.
//! These primitives form the foundation of Filament's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes. Memos are useful for expensive computations
//! that should not be repeated unnecessarily. A [`LazyMemo`] additionally does
//! no work at all while nobody observes it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with external systems,
//! such as updating the DOM or logging. A [`Computed`] is an effect that runs
//! before effects, together with memos.
//!
//! ## Owners
//!
//! Every node is owned by the root or computation that created it, and is
//! disposed together with it.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod context;
mod effect;
mod lazy_memo;
mod memo;
mod root;
pub(crate) mod runtime;
mod signal;

pub use context::ReactiveContext;
pub use effect::{Computed, Effect, EffectOptions};
pub use lazy_memo::LazyMemo;
pub use memo::Memo;
pub use root::{Owner, Root};
pub use runtime::{batch, is_batching, on_cleanup, untrack, Runtime};
pub use signal::{Equals, Signal};
