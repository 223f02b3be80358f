//! Filament Core
//!
//! This crate provides a fine-grained reactive runtime and the primitives
//! built on it. It implements:
//!
//! - Reactive primitives (signals, memos, lazy memos, effects, owners)
//! - A push-pull dependency graph with batched, glitch-free flushes
//! - Debounce and throttle scheduling over pluggable timer hosts
//! - Path-tracked stores and a deep structural diff engine
//! - List and switch transitions
//! - Composable watchers and a reactive filesystem cache
//!
//! The runtime is per-thread and single-threaded; handles are cheap `Rc`
//! clones and are not `Send`.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `graph`: Computational dependency graph implementation
//! - `scheduled`: Debounce, throttle and timer hosts
//! - `store`: Stores, store values and diffing
//! - `transition`: List and switch transitions
//! - `watch`: Watchers with composable modifiers
//! - `fs`: Reactive filesystem over an adapter
//!
//! # Example
//!
//! ```rust
//! use filament_core::{Effect, Memo, Signal};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = Memo::new(move |_| c.get() * 2);
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let (c, d, sink) = (count.clone(), doubled.clone(), log.clone());
//! let _effect = Effect::new(move |_| {
//!     sink.borrow_mut().push(format!("Count: {}, Doubled: {}", c.get(), d.get()));
//! });
//!
//! // Update the signal
//! count.set(5);
//! assert_eq!(log.borrow().last().unwrap(), "Count: 5, Doubled: 10");
//! ```

pub mod config;
pub mod error;
pub mod fs;
pub mod graph;
pub mod reactive;
pub mod scheduled;
pub mod store;
pub mod transition;
pub mod watch;

pub use config::RuntimeConfig;
pub use error::{AdapterError, ConfigError, StoreError};
pub use reactive::{
    batch, is_batching, on_cleanup, untrack, Computed, Effect, EffectOptions, Equals, LazyMemo,
    Memo, Owner, Root, Runtime, Signal,
};
