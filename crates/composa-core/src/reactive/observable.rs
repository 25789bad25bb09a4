#![forbid(unsafe_code)]

//! Shared, version-tracked values with change notification.
//!
//! # Design
//!
//! [`Observable<T>`] keeps its value, a version counter, and a subscriber list
//! in one `Rc<RefCell<..>>`. Subscribers are held as `Weak` callbacks; the
//! strong side lives in the [`Subscription`] guard handed back to the caller.
//! Dead entries are pruned during the next notification.
//!
//! # Invariants
//!
//! 1. `version` increments exactly once per `set()` that changes the value.
//! 2. Callbacks run after the value is stored and without any borrow held, so
//!    a callback may read or write the same observable.
//! 3. Callbacks run in registration order.
//!
//! # Failure Modes
//!
//! - **Re-entrant write from a callback**: the nested `set()` notifies with
//!   the newer value first; the outer loop then continues delivering the value
//!   it started with. Subscribers that care should read `get()` instead of
//!   trusting the argument.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = dyn Fn(&T);

struct SubscriberEntry<T> {
    id: u64,
    callback: Weak<Callback<T>>,
}

struct ObservableInner<T> {
    value: T,
    version: u64,
    next_subscriber_id: u64,
    subscribers: Vec<SubscriberEntry<T>>,
}

/// A shared, version-tracked value.
///
/// Cloning an `Observable` creates a new handle to the **same** value.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Default + Clone + PartialEq + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Wrap `value` in a new observable at version 0.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                next_subscriber_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Clone out the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Borrow the current value for the duration of `f`.
    ///
    /// # Panics
    ///
    /// Panics if `f` calls `set()` on the same observable.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Store `value` and notify subscribers. Equal values are ignored.
    pub fn set(&self, value: T) {
        let (snapshot, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.value = value;
            inner.version += 1;
            inner
                .subscribers
                .retain(|entry| entry.callback.strong_count() > 0);
            let callbacks: Vec<Rc<Callback<T>>> = inner
                .subscribers
                .iter()
                .filter_map(|entry| entry.callback.upgrade())
                .collect();
            (inner.value.clone(), callbacks)
        };
        for callback in callbacks {
            callback(&snapshot);
        }
    }

    /// Modify the value in place. Notifies only if the result differs.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }

    /// Number of changing writes since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Register `callback` to run after every change.
    ///
    /// The callback stays registered for as long as the returned
    /// [`Subscription`] is alive.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Rc<Callback<T>> = Rc::new(callback);
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.push(SubscriberEntry {
            id,
            callback: Rc::downgrade(&strong),
        });
        Subscription {
            id,
            _guard: Box::new(strong),
        }
    }

    /// Live subscribers (dropped guards are not counted).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|entry| entry.callback.strong_count() > 0)
            .count()
    }

    /// Whether both handles point at the same value.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// RAII guard for an [`Observable::subscribe`] registration.
///
/// Dropping the guard drops the only strong reference to the callback, so
/// it can no longer be reached by a notification.
pub struct Subscription {
    id: u64,
    _guard: Box<dyn Any>,
}

impl Subscription {
    /// Subscriber id, unique per observable.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
