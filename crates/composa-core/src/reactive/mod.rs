#![forbid(unsafe_code)]

//! Reactive values for Composa.
//!
//! - [`Observable`]: shared, version-tracked value with change callbacks.
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//! - [`Computed`]: lazily recomputed value derived from observables.
//! - [`MaybeReactive`]: an argument that is either a plain value or an
//!   observable.
//! - [`watch`]: push-style watcher with scope-bound lifetime.
//!
//! # Architecture
//!
//! Everything is `Rc<RefCell<..>>` based and single-threaded. Subscribers are
//! stored as `Weak` callbacks and pruned lazily during notification.
//! `Computed` pulls: sources only flip its dirty flag, recomputation happens
//! on read. Watchers push: their callback runs inside the source's `set()`.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Subscribers are notified in registration order.
//! 3. Setting a value equal to the current value is a no-op.
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification.
//! 5. `Computed::get()` never returns a stale value.

pub mod computed;
pub mod maybe;
pub mod observable;
pub mod watch;

pub use computed::{Computed, Invalidator};
pub use maybe::MaybeReactive;
pub use observable::{Observable, Subscription};
pub use watch::{WatchHandle, WatchOptions, watch};
