#![forbid(unsafe_code)]

//! Lazy derived values that recompute when their sources change.
//!
//! # Design
//!
//! [`Computed<T>`] stores a compute function next to its cached result. Each
//! source subscription flips a shared dirty flag; the next read recomputes.
//! Sources that are not [`Observable`]s (static values, host state) can be
//! wired by hand through [`Computed::invalidator`] and [`Computed::retain`].
//!
//! # Invariants
//!
//! 1. A read never returns a value older than the last completed source
//!    change.
//! 2. The compute function runs at most once per change cycle.
//! 3. `version` increments by exactly 1 per recomputation.
//!
//! # Failure Modes
//!
//! - **Compute function panics**: the previous cached value survives and the
//!   dirty flag stays set, so the next read retries.
//! - **Source dropped**: its subscription goes inert; the last cached result
//!   is kept.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::observable::{Observable, Subscription};

struct ComputedInner<T> {
    compute: Box<dyn Fn() -> T>,
    cached: Option<T>,
    dirty: Rc<Cell<bool>>,
    version: u64,
    /// Kept alive for their side effect on `dirty`; never read.
    subscriptions: Vec<Subscription>,
}

/// A memoized value derived from one or more sources.
///
/// Cloning a `Computed` creates a new handle to the **same** cache.
pub struct Computed<T> {
    inner: Rc<RefCell<ComputedInner<T>>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Computed")
            .field("cached", &inner.cached)
            .field("dirty", &inner.dirty.get())
            .field("version", &inner.version)
            .finish()
    }
}

/// Weak handle that marks a [`Computed`] dirty.
///
/// Holding an `Invalidator` does not keep the computed value alive, so it is
/// safe to capture inside a source's subscription callback.
#[derive(Clone)]
pub struct Invalidator {
    dirty: Weak<Cell<bool>>,
}

impl Invalidator {
    /// Mark the target dirty. Returns `false` once the target is gone.
    pub fn invalidate(&self) -> bool {
        match self.dirty.upgrade() {
            Some(flag) => {
                flag.set(true);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Invalidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invalidator")
            .field("alive", &(self.dirty.strong_count() > 0))
            .finish()
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Build from a compute function and subscriptions the caller already
    /// wired. Nothing marks the value dirty unless those subscriptions (or an
    /// [`Invalidator`]) do.
    pub fn from_fn(compute: impl Fn() -> T + 'static, subscriptions: Vec<Subscription>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ComputedInner {
                compute: Box::new(compute),
                cached: None,
                dirty: Rc::new(Cell::new(true)),
                version: 0,
                subscriptions,
            })),
        }
    }

    /// Derive from a single observable.
    pub fn from_observable<S: Clone + PartialEq + 'static>(
        source: &Observable<S>,
        map: impl Fn(&S) -> T + 'static,
    ) -> Self {
        let reader = source.clone();
        let computed = Self::from_fn(move || reader.with(|v| map(v)), Vec::new());
        computed.track(source);
        computed
    }

    /// Derive from two observables.
    pub fn from2<S1, S2>(
        s1: &Observable<S1>,
        s2: &Observable<S2>,
        map: impl Fn(&S1, &S2) -> T + 'static,
    ) -> Self
    where
        S1: Clone + PartialEq + 'static,
        S2: Clone + PartialEq + 'static,
    {
        let (r1, r2) = (s1.clone(), s2.clone());
        let computed = Self::from_fn(move || r1.with(|a| r2.with(|b| map(a, b))), Vec::new());
        computed.track(s1);
        computed.track(s2);
        computed
    }

    /// Derive from three observables.
    pub fn from3<S1, S2, S3>(
        s1: &Observable<S1>,
        s2: &Observable<S2>,
        s3: &Observable<S3>,
        map: impl Fn(&S1, &S2, &S3) -> T + 'static,
    ) -> Self
    where
        S1: Clone + PartialEq + 'static,
        S2: Clone + PartialEq + 'static,
        S3: Clone + PartialEq + 'static,
    {
        let (r1, r2, r3) = (s1.clone(), s2.clone(), s3.clone());
        let computed = Self::from_fn(
            move || r1.with(|a| r2.with(|b| r3.with(|c| map(a, b, c)))),
            Vec::new(),
        );
        computed.track(s1);
        computed.track(s2);
        computed.track(s3);
        computed
    }

    /// Mark this value dirty whenever `source` changes.
    pub fn track<S: Clone + PartialEq + 'static>(&self, source: &Observable<S>) {
        let invalidator = self.invalidator();
        self.retain(source.subscribe(move |_| {
            invalidator.invalidate();
        }));
    }

    /// A weak handle that marks this value dirty.
    #[must_use]
    pub fn invalidator(&self) -> Invalidator {
        Invalidator {
            dirty: Rc::downgrade(&self.inner.borrow().dirty),
        }
    }

    /// Keep `subscription` alive for as long as this value lives.
    pub fn retain(&self, subscription: Subscription) {
        self.inner.borrow_mut().subscriptions.push(subscription);
    }

    fn refresh(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.dirty.get() || inner.cached.is_none() {
            let value = (inner.compute)();
            inner.cached = Some(value);
            inner.dirty.set(false);
            inner.version += 1;
        }
    }

    /// Current value, recomputed first if a source changed.
    #[must_use]
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Borrow the current value without cloning.
    ///
    /// # Panics
    ///
    /// Panics if `f` reads the same `Computed` again (re-entrant borrow).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.refresh();
        let inner = self.inner.borrow();
        match inner.cached.as_ref() {
            Some(value) => f(value),
            None => unreachable!("refresh always fills the cache"),
        }
    }

    /// Whether the next read will recompute.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.borrow().dirty.get()
    }

    /// Force the next read to recompute.
    pub fn invalidate(&self) {
        self.inner.borrow().dirty.set(true);
    }

    /// Number of recomputations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }
}
