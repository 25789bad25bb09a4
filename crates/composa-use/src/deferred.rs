#![forbid(unsafe_code)]

//! A settle-once value that many callers can await.
//!
//! [`Deferred<T>`] is the memoized pending operation behind the script
//! loader: every clone observes the same outcome, and only the first
//! `resolve` counts. Polling clones the outcome out, so `T` must be `Clone`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

struct Slot<T> {
    outcome: Option<T>,
    /// One waker per polling handle, keyed by that handle's waiter id.
    wakers: BTreeMap<u64, Waker>,
    next_waiter: u64,
}

/// Shared, single-assignment future. Clones share the slot.
///
/// Each handle owns at most one waker registration. Re-polling replaces it,
/// and dropping the handle withdraws it.
#[must_use = "a Deferred does nothing unless polled or inspected"]
pub struct Deferred<T> {
    slot: Rc<RefCell<Slot<T>>>,
    waiter: Option<u64>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
            waiter: None,
        }
    }
}

impl<T> Drop for Deferred<T> {
    fn drop(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            if let Ok(mut slot) = self.slot.try_borrow_mut() {
                slot.wakers.remove(&waiter);
            }
        }
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Deferred<T> {
    pub fn new() -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot {
                outcome: None,
                wakers: BTreeMap::new(),
                next_waiter: 0,
            })),
            waiter: None,
        }
    }

    /// A deferred that is already settled.
    pub fn settled(outcome: T) -> Self {
        let deferred = Self::new();
        deferred.resolve(outcome);
        deferred
    }

    /// Settle with `outcome` and wake every waiter. Returns `false` if the
    /// value was already settled, in which case `outcome` is dropped.
    pub fn resolve(&self, outcome: T) -> bool {
        let wakers = {
            let mut slot = self.slot.borrow_mut();
            if slot.outcome.is_some() {
                return false;
            }
            slot.outcome = Some(outcome);
            std::mem::take(&mut slot.wakers)
        };
        for waker in wakers.into_values() {
            waker.wake();
        }
        true
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.borrow().outcome.is_some()
    }

    /// The outcome, if settled.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.slot.borrow().outcome.clone()
    }

    /// Whether both handles share one slot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }

    /// Number of handles currently parked on this value.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.slot.borrow().wakers.len()
    }
}

impl<T: Clone> Future for Deferred<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        let mut slot = this.slot.borrow_mut();
        if let Some(outcome) = slot.outcome.as_ref() {
            return Poll::Ready(outcome.clone());
        }
        let waiter = match this.waiter {
            Some(waiter) => waiter,
            None => {
                let waiter = slot.next_waiter;
                slot.next_waiter += 1;
                this.waiter = Some(waiter);
                waiter
            }
        };
        match slot.wakers.get_mut(&waiter) {
            Some(stored) if stored.will_wake(cx.waker()) => {}
            Some(stored) => stored.clone_from(cx.waker()),
            None => {
                slot.wakers.insert(waiter, cx.waker().clone());
            }
        }
        Poll::Pending
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        f.debug_struct("Deferred")
            .field("outcome", &slot.outcome)
            .field("waiters", &slot.wakers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll_now<F: Future + Unpin>(future: &mut F) -> Poll<F::Output> {
        Pin::new(future).poll(&mut Context::from_waker(Waker::noop()))
    }

    #[test]
    fn first_resolve_wins() {
        let deferred = Deferred::new();
        assert!(deferred.resolve(1));
        assert!(!deferred.resolve(2));
        assert_eq!(deferred.peek(), Some(1));
    }

    #[test]
    fn clones_observe_same_outcome() {
        let a: Deferred<&str> = Deferred::new();
        let mut b = a.clone();
        assert!(poll_now(&mut b).is_pending());
        a.resolve("done");
        assert_eq!(poll_now(&mut b), Poll::Ready("done"));
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn settled_is_ready() {
        let deferred = Deferred::settled(5u8);
        assert!(deferred.is_settled());
        assert_eq!(pollster::block_on(deferred), 5);
    }

    #[test]
    fn repolling_keeps_one_waker_per_handle() {
        let mut deferred: Deferred<u8> = Deferred::new();
        for _ in 0..3 {
            assert!(poll_now(&mut deferred).is_pending());
        }
        assert_eq!(deferred.waiters(), 1);

        let mut other = deferred.clone();
        assert!(poll_now(&mut other).is_pending());
        assert!(poll_now(&mut other).is_pending());
        assert_eq!(deferred.waiters(), 2);

        drop(other);
        assert_eq!(deferred.waiters(), 1);

        deferred.resolve(3);
        assert_eq!(deferred.waiters(), 0);
        assert_eq!(poll_now(&mut deferred), Poll::Ready(3));
    }

    #[test]
    fn unpolled_clones_hold_no_waker() {
        let deferred: Deferred<u8> = Deferred::new();
        let clones: Vec<_> = (0..4).map(|_| deferred.clone()).collect();
        assert_eq!(deferred.waiters(), 0);
        drop(clones);
        assert_eq!(deferred.waiters(), 0);
    }
}
