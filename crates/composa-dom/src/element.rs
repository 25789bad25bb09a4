#![forbid(unsafe_code)]

//! Host elements and the shared [`Element`] handle.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::event::{EventTarget, Listener, ListenerId, ListenerOptions};

/// Operations the composables need from a document element.
///
/// Tag names are reported upper-case, as the DOM does for HTML elements.
pub trait HostElement: EventTarget {
    fn tag_name(&self) -> String;

    fn attribute(&self, name: &str) -> Option<String>;

    fn set_attribute(&self, name: &str, value: &str);

    fn remove_attribute(&self, name: &str);

    fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Set or clear a boolean attribute (`async`, `defer`, `nomodule`).
    fn set_flag(&self, name: &str, on: bool) {
        if on {
            self.set_attribute(name, "");
        } else {
            self.remove_attribute(name);
        }
    }

    fn text_content(&self) -> Option<String>;

    fn set_text_content(&self, text: &str);

    /// Whether the element is attached to its document.
    fn is_connected(&self) -> bool;

    /// Whether `other` is this element or one of its descendants.
    fn contains(&self, other: &dyn HostElement) -> bool;

    /// Node identity, independent of how many handles point at the node.
    fn is_same_node(&self, other: &dyn HostElement) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// Cheaply cloneable handle to a host element.
///
/// Equality is node identity.
#[derive(Clone)]
pub struct Element(Rc<dyn HostElement>);

impl Element {
    pub fn new(host: impl HostElement + 'static) -> Self {
        Self(Rc::new(host))
    }

    #[must_use]
    pub fn from_rc(host: Rc<dyn HostElement>) -> Self {
        Self(host)
    }

    #[must_use]
    pub fn host(&self) -> &dyn HostElement {
        &*self.0
    }

    /// Downcast to the backend's concrete element type.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    #[must_use]
    pub fn contains(&self, other: &Element) -> bool {
        self.0.contains(other.host())
    }
}

impl std::ops::Deref for Element {
    type Target = dyn HostElement;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0.is_same_node(other.host())
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Element");
        dbg.field("tag", &self.0.tag_name());
        if let Some(id) = self.0.attribute("id") {
            dbg.field("id", &id);
        }
        dbg.field("connected", &self.0.is_connected()).finish()
    }
}

impl EventTarget for Element {
    fn add_event_listener(
        &self,
        kind: &str,
        listener: Listener,
        options: ListenerOptions,
    ) -> ListenerId {
        self.0.add_event_listener(kind, listener, options)
    }

    fn remove_event_listener(&self, id: ListenerId) {
        self.0.remove_event_listener(id);
    }
}
