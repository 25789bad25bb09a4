#![forbid(unsafe_code)]

//! Side-effecting watchers over reactive sources.
//!
//! A watcher pushes every change of its source into a callback until it is
//! stopped, either explicitly through [`WatchHandle::stop`] or implicitly when
//! the scope that was current at creation is disposed.
//!
//! Callbacks run synchronously inside the source's `set()`, so a sink updated
//! by a watcher is never observed holding an older value than its source.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::scope::try_on_scope_dispose;

use super::maybe::MaybeReactive;
use super::observable::Subscription;

/// Watcher configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Also run the callback once with the current value on creation.
    pub immediate: bool,
}

impl WatchOptions {
    #[must_use]
    pub fn immediate() -> Self {
        Self { immediate: true }
    }
}

/// Stops a watcher. Clones share the same watcher.
#[derive(Clone, Default)]
pub struct WatchHandle {
    subscription: Rc<RefCell<Option<Subscription>>>,
}

impl WatchHandle {
    /// Detach the watcher. Idempotent.
    pub fn stop(&self) {
        self.subscription.borrow_mut().take();
    }

    /// Whether the watcher still receives changes. Watchers over static
    /// sources are never active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.subscription.borrow().is_some()
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Call `callback` with each new value of `source`.
pub fn watch<T: Clone + PartialEq + 'static>(
    source: &MaybeReactive<T>,
    callback: impl Fn(&T) + 'static,
    options: WatchOptions,
) -> WatchHandle {
    let callback = Rc::new(callback);
    if options.immediate {
        callback(&source.get());
    }
    let notify = Rc::clone(&callback);
    let handle = WatchHandle {
        subscription: Rc::new(RefCell::new(source.subscribe(move |value| notify(value)))),
    };
    if handle.is_active() {
        let on_dispose = handle.clone();
        try_on_scope_dispose(move || on_dispose.stop());
    }
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observable;
    use crate::scope::Scope;

    fn sink() -> (Rc<RefCell<Vec<String>>>, impl Fn(&String) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        (seen, move |v: &String| seen_clone.borrow_mut().push(v.clone()))
    }

    #[test]
    fn immediate_runs_once_up_front() {
        let source = MaybeReactive::from(Observable::new("a".to_string()));
        let (seen, cb) = sink();
        let _handle = watch(&source, cb, WatchOptions::immediate());
        assert_eq!(*seen.borrow(), vec!["a"]);
    }

    #[test]
    fn lazy_watch_waits_for_change() {
        let obs = Observable::new("a".to_string());
        let (seen, cb) = sink();
        let handle = watch(&MaybeReactive::from(&obs), cb, WatchOptions::default());
        assert!(seen.borrow().is_empty());
        obs.set("b".to_string());
        assert_eq!(*seen.borrow(), vec!["b"]);
        assert!(handle.is_active());
    }

    #[test]
    fn stop_detaches() {
        let obs = Observable::new("a".to_string());
        let (seen, cb) = sink();
        let handle = watch(&MaybeReactive::from(&obs), cb, WatchOptions::default());
        handle.stop();
        handle.stop();
        obs.set("b".to_string());
        assert!(seen.borrow().is_empty());
        assert_eq!(obs.subscriber_count(), 0);
    }

    #[test]
    fn static_source_only_fires_immediate() {
        let (seen, cb) = sink();
        let source: MaybeReactive<String> = "fixed".into();
        let handle = watch(&source, cb, WatchOptions::immediate());
        assert_eq!(*seen.borrow(), vec!["fixed"]);
        assert!(!handle.is_active());
    }

    #[test]
    fn scope_dispose_stops_watcher() {
        let obs = Observable::new("a".to_string());
        let (seen, cb) = sink();
        let scope = Scope::detached();
        let handle = scope
            .run(|| watch(&MaybeReactive::from(&obs), cb, WatchOptions::default()))
            .unwrap();
        obs.set("b".to_string());
        scope.dispose();
        obs.set("c".to_string());
        assert_eq!(*seen.borrow(), vec!["b"]);
        assert!(!handle.is_active());
    }
}
