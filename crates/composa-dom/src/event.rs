#![forbid(unsafe_code)]

//! Event model and the listener registration primitive.
//!
//! [`DomEvent`] is the host-neutral view of a dispatched event: its kind, the
//! target element, the composed path, and the `detail` counter (zero for
//! clicks synthesized from the keyboard). [`use_event_listener`] attaches a
//! listener to any [`EventTarget`] and returns a [`ListenerStop`] that also
//! fires when the current scope is disposed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use composa_core::scope::try_on_scope_dispose;

use crate::element::Element;

// ─── Listener ids ────────────────────────────────────────────────────────────

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one registration on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a process-wide unique id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// `addEventListener` options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Fire during the capture phase instead of the bubble phase.
    pub capture: bool,
    /// The listener promises not to cancel the default action.
    pub passive: bool,
    /// Remove the listener after its first invocation.
    pub once: bool,
}

impl ListenerOptions {
    #[must_use]
    pub fn passive() -> Self {
        Self {
            passive: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    #[must_use]
    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// A dispatched event.
#[derive(Clone)]
pub struct DomEvent {
    kind: String,
    target: Option<Element>,
    path: Vec<Element>,
    detail: i32,
    propagation_stopped: Rc<Cell<bool>>,
}

impl DomEvent {
    /// An event of `kind` with no target and `detail == 1`.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            path: Vec::new(),
            detail: 1,
            propagation_stopped: Rc::new(Cell::new(false)),
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: Element) -> Self {
        self.target = Some(target);
        self
    }

    /// Composed path, innermost element first.
    #[must_use]
    pub fn with_path(mut self, path: Vec<Element>) -> Self {
        self.path = path;
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: i32) -> Self {
        self.detail = detail;
        self
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn target(&self) -> Option<&Element> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn composed_path(&self) -> &[Element] {
        &self.path
    }

    /// Click count for pointer events; `0` for keyboard-synthesized clicks.
    #[must_use]
    pub fn detail(&self) -> i32 {
        self.detail
    }

    /// Whether `element` is the target or anywhere on the composed path.
    #[must_use]
    pub fn involves(&self, element: &Element) -> bool {
        self.target.as_ref() == Some(element) || self.path.iter().any(|e| e == element)
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    #[must_use]
    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }
}

impl fmt::Debug for DomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomEvent")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("path_len", &self.path.len())
            .field("detail", &self.detail)
            .field("propagation_stopped", &self.propagation_stopped.get())
            .finish()
    }
}

// ─── Targets ─────────────────────────────────────────────────────────────────

/// Shared listener callback.
pub type Listener = Rc<dyn Fn(&DomEvent)>;

/// Something listeners can be attached to.
pub trait EventTarget {
    fn add_event_listener(&self, kind: &str, listener: Listener, options: ListenerOptions)
    -> ListenerId;

    /// Remove a registration. Unknown ids are ignored.
    fn remove_event_listener(&self, id: ListenerId);
}

impl<T: EventTarget + ?Sized> EventTarget for Rc<T> {
    fn add_event_listener(
        &self,
        kind: &str,
        listener: Listener,
        options: ListenerOptions,
    ) -> ListenerId {
        (**self).add_event_listener(kind, listener, options)
    }

    fn remove_event_listener(&self, id: ListenerId) {
        (**self).remove_event_listener(id);
    }
}

/// Handle returned by [`use_event_listener`]. Clones share the registration.
#[derive(Clone, Default)]
pub struct ListenerStop {
    remove: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl ListenerStop {
    /// A handle that was never attached to anything.
    #[must_use]
    pub fn noop() -> Self {
        Self::default()
    }

    /// Remove the listener. Idempotent.
    pub fn stop(&self) {
        let remove = self.remove.borrow_mut().take();
        if let Some(remove) = remove {
            remove();
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.remove.borrow().is_some()
    }
}

impl fmt::Debug for ListenerStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerStop")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Attach `listener` to `target` for events of `kind`.
///
/// The registration is removed by [`ListenerStop::stop`] or when the scope
/// current at call time is disposed, whichever comes first.
pub fn use_event_listener<T>(
    target: &T,
    kind: &str,
    listener: impl Fn(&DomEvent) + 'static,
    options: ListenerOptions,
) -> ListenerStop
where
    T: EventTarget + Clone + 'static,
{
    let id = target.add_event_listener(kind, Rc::new(listener), options);
    let owner = target.clone();
    let stop = ListenerStop {
        remove: Rc::new(RefCell::new(Some(Box::new(move || {
            owner.remove_event_listener(id);
        })))),
    };
    let on_dispose = stop.clone();
    try_on_scope_dispose(move || on_dispose.stop());
    stop
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_ids_are_unique() {
        assert_ne!(ListenerId::next(), ListenerId::next());
    }

    #[test]
    fn options_builders() {
        let opts = ListenerOptions::passive().with_capture(true).with_once(true);
        assert!(opts.passive && opts.capture && opts.once);
        assert_eq!(ListenerOptions::default(), ListenerOptions {
            capture: false,
            passive: false,
            once: false,
        });
    }

    #[test]
    fn event_defaults() {
        let event = DomEvent::new("click");
        assert_eq!(event.kind(), "click");
        assert_eq!(event.detail(), 1);
        assert!(event.target().is_none());
        assert!(event.composed_path().is_empty());
        assert!(!event.is_propagation_stopped());
    }

    #[test]
    fn stop_propagation_is_shared_across_clones() {
        let event = DomEvent::new("click");
        let copy = event.clone();
        copy.stop_propagation();
        assert!(event.is_propagation_stopped());
    }

    #[test]
    fn noop_stop_is_inactive() {
        let stop = ListenerStop::noop();
        assert!(!stop.is_active());
        stop.stop();
    }
}
