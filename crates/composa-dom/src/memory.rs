#![forbid(unsafe_code)]

//! Deterministic in-memory document.
//!
//! [`MemoryDocument`] models just enough of a DOM for the composables to run
//! outside a browser: an `<html>` root with `<head>` and `<body>`, attributes,
//! text content, and listeners. [`MemoryWindow`] adds three-phase event
//! dispatch (capture, target, bubble) and a task queue drained by
//! [`MemoryWindow::flush_tasks`].
//!
//! Scripts are recorded, never executed. Tests drive readiness by firing
//! `load`/`error`/`abort` on the element with [`MemoryElement::fire`].
//!
//! # Invariants
//!
//! 1. An element has at most one parent; appending moves it.
//! 2. An element is connected iff its ancestor chain reaches the root.
//! 3. Listeners fire in registration order within a phase. The set is fixed
//!    when a phase starts: listeners added during dispatch wait for the next
//!    event, and listeners removed during dispatch are skipped.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{trace, warn};

use crate::document::{DocumentRef, HostDocument, HostWindow, Query, WindowRef};
use crate::element::{Element, HostElement};
use crate::error::{HostError, Result};
use crate::event::{DomEvent, EventTarget, Listener, ListenerId, ListenerOptions};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

// ─── Listener bookkeeping ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Capture,
    AtTarget,
    Bubble,
}

struct ListenerEntry {
    id: ListenerId,
    kind: String,
    listener: Listener,
    options: ListenerOptions,
}

#[derive(Default)]
struct ListenerList {
    entries: RefCell<Vec<ListenerEntry>>,
}

impl ListenerList {
    fn add(&self, kind: &str, listener: Listener, options: ListenerOptions) -> ListenerId {
        let id = ListenerId::next();
        self.entries.borrow_mut().push(ListenerEntry {
            id,
            kind: kind.to_owned(),
            listener,
            options,
        });
        id
    }

    fn remove(&self, id: ListenerId) {
        self.entries.borrow_mut().retain(|entry| entry.id != id);
    }

    fn invoke(&self, event: &DomEvent, phase: Phase) {
        let selected: Vec<(ListenerId, Listener)> = self
            .entries
            .borrow()
            .iter()
            .filter(|entry| {
                entry.kind == event.kind()
                    && match phase {
                        Phase::Capture => entry.options.capture,
                        Phase::AtTarget => true,
                        Phase::Bubble => !entry.options.capture,
                    }
            })
            .map(|entry| (entry.id, Rc::clone(&entry.listener)))
            .collect();
        for (id, listener) in selected {
            if self.take_for_dispatch(id) {
                listener(event);
            }
        }
    }

    /// Whether `id` is still registered. A `once` entry is removed on the way.
    fn take_for_dispatch(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let Some(index) = entries.iter().position(|entry| entry.id == id) else {
            trace!(listener_id = id.raw(), "listener removed mid-dispatch, skipped");
            return false;
        };
        if entries[index].options.once {
            entries.remove(index);
        }
        true
    }

    fn registrations(&self, kind: &str) -> Vec<ListenerOptions> {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| entry.options)
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

// ─── Elements ────────────────────────────────────────────────────────────────

struct NodeData {
    id: u64,
    tag: String,
    is_root: bool,
    attributes: RefCell<BTreeMap<String, String>>,
    text: RefCell<Option<String>>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<Rc<NodeData>>>,
    listeners: ListenerList,
}

/// An element of a [`MemoryDocument`]. Clones are handles to the same node.
#[derive(Clone)]
pub struct MemoryElement {
    node: Rc<NodeData>,
}

impl MemoryElement {
    fn with_root_flag(tag: &str, is_root: bool) -> Self {
        Self {
            node: Rc::new(NodeData {
                id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
                tag: tag.to_ascii_uppercase(),
                is_root,
                attributes: RefCell::new(BTreeMap::new()),
                text: RefCell::new(None),
                parent: RefCell::new(Weak::new()),
                children: RefCell::new(Vec::new()),
                listeners: ListenerList::default(),
            }),
        }
    }

    /// A detached element.
    #[must_use]
    pub fn new(tag: &str) -> Self {
        Self::with_root_flag(tag, false)
    }

    #[must_use]
    pub fn node_id(&self) -> u64 {
        self.node.id
    }

    /// A shared [`Element`] handle for this node.
    #[must_use]
    pub fn to_element(&self) -> Element {
        Element::new(self.clone())
    }

    #[must_use]
    pub fn parent(&self) -> Option<MemoryElement> {
        self.node.parent.borrow().upgrade().map(|node| Self { node })
    }

    #[must_use]
    pub fn children(&self) -> Vec<MemoryElement> {
        self.node
            .children
            .borrow()
            .iter()
            .map(|node| Self {
                node: Rc::clone(node),
            })
            .collect()
    }

    /// Append `child`, detaching it from its current parent first.
    pub fn append_child(&self, child: &MemoryElement) {
        child.detach();
        *child.node.parent.borrow_mut() = Rc::downgrade(&self.node);
        self.node.children.borrow_mut().push(Rc::clone(&child.node));
    }

    /// Remove `child`. Returns `false` if it was not a child of this node.
    pub fn remove_child(&self, child: &MemoryElement) -> bool {
        let mut children = self.node.children.borrow_mut();
        let before = children.len();
        children.retain(|node| node.id != child.node.id);
        let removed = children.len() != before;
        if removed {
            *child.node.parent.borrow_mut() = Weak::new();
        }
        removed
    }

    /// Detach from the current parent, if any.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// This node followed by its ancestors, innermost first.
    fn ancestry(&self) -> Vec<MemoryElement> {
        let mut chain = vec![self.clone()];
        let mut cursor = self.parent();
        while let Some(node) = cursor {
            cursor = node.parent();
            chain.push(node);
        }
        chain
    }

    /// Dispatch an event of `kind` on this element only (no propagation),
    /// the way a resource signals `load`, `error`, or `abort`.
    pub fn fire(&self, kind: &str) -> DomEvent {
        let event = DomEvent::new(kind)
            .with_target(self.to_element())
            .with_path(self.ancestry().iter().map(Self::to_element).collect());
        trace!(node_id = self.node.id, kind, "memory element fire");
        self.node.listeners.invoke(&event, Phase::AtTarget);
        event
    }

    /// Options of every listener registered for `kind`.
    #[must_use]
    pub fn listener_options(&self, kind: &str) -> Vec<ListenerOptions> {
        self.node.listeners.registrations(kind)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.node.listeners.len()
    }

    fn descendants_into(&self, out: &mut Vec<MemoryElement>) {
        for child in self.children() {
            out.push(child.clone());
            child.descendants_into(out);
        }
    }
}

impl PartialEq for MemoryElement {
    fn eq(&self, other: &Self) -> bool {
        self.node.id == other.node.id
    }
}

impl Eq for MemoryElement {}

impl fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryElement")
            .field("node_id", &self.node.id)
            .field("tag", &self.node.tag)
            .field("attributes", &*self.node.attributes.borrow())
            .field("children", &self.node.children.borrow().len())
            .finish()
    }
}

impl EventTarget for MemoryElement {
    fn add_event_listener(
        &self,
        kind: &str,
        listener: Listener,
        options: ListenerOptions,
    ) -> ListenerId {
        self.node.listeners.add(kind, listener, options)
    }

    fn remove_event_listener(&self, id: ListenerId) {
        self.node.listeners.remove(id);
    }
}

impl HostElement for MemoryElement {
    fn tag_name(&self) -> String {
        self.node.tag.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.node.attributes.borrow().get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: &str) {
        self.node
            .attributes
            .borrow_mut()
            .insert(name.to_owned(), value.to_owned());
    }

    fn remove_attribute(&self, name: &str) {
        self.node.attributes.borrow_mut().remove(name);
    }

    fn text_content(&self) -> Option<String> {
        self.node.text.borrow().clone()
    }

    fn set_text_content(&self, text: &str) {
        *self.node.text.borrow_mut() = Some(text.to_owned());
    }

    fn is_connected(&self) -> bool {
        self.ancestry().last().is_some_and(|top| top.node.is_root)
    }

    fn contains(&self, other: &dyn HostElement) -> bool {
        other
            .as_any()
            .downcast_ref::<MemoryElement>()
            .is_some_and(|other| other.ancestry().iter().any(|node| node == self))
    }

    fn is_same_node(&self, other: &dyn HostElement) -> bool {
        other
            .as_any()
            .downcast_ref::<MemoryElement>()
            .is_some_and(|other| other == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ─── Document ────────────────────────────────────────────────────────────────

struct DocumentData {
    root: MemoryElement,
    head: MemoryElement,
    body: MemoryElement,
    created: Cell<usize>,
    active: RefCell<Option<MemoryElement>>,
}

/// In-memory [`HostDocument`]. Clones are handles to the same document.
#[derive(Clone)]
pub struct MemoryDocument {
    data: Rc<DocumentData>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// An empty `<html><head></head><body></body></html>` document.
    #[must_use]
    pub fn new() -> Self {
        let root = MemoryElement::with_root_flag("html", true);
        let head = MemoryElement::new("head");
        let body = MemoryElement::new("body");
        root.append_child(&head);
        root.append_child(&body);
        Self {
            data: Rc::new(DocumentData {
                root,
                head,
                body,
                created: Cell::new(0),
                active: RefCell::new(None),
            }),
        }
    }

    #[must_use]
    pub fn head(&self) -> MemoryElement {
        self.data.head.clone()
    }

    #[must_use]
    pub fn body(&self) -> MemoryElement {
        self.data.body.clone()
    }

    /// Children of `<head>`, in order.
    #[must_use]
    pub fn head_children(&self) -> Vec<MemoryElement> {
        self.data.head.children()
    }

    /// Number of `create_element` calls so far.
    #[must_use]
    pub fn elements_created(&self) -> usize {
        self.data.created.get()
    }

    /// Create a detached element without counting it as a composable's
    /// creation. Handy for building fixtures.
    #[must_use]
    pub fn fixture(&self, tag: &str) -> MemoryElement {
        MemoryElement::new(tag)
    }

    pub fn set_active_element(&self, element: Option<&MemoryElement>) {
        *self.data.active.borrow_mut() = element.cloned();
    }

    #[must_use]
    pub fn as_document_ref(&self) -> DocumentRef {
        Rc::new(self.clone())
    }

    fn connected_elements(&self) -> Vec<MemoryElement> {
        let mut out = Vec::new();
        self.data.root.descendants_into(&mut out);
        out
    }
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDocument")
            .field("head_children", &self.data.head.children().len())
            .field("body_children", &self.data.body.children().len())
            .field("elements_created", &self.data.created.get())
            .finish()
    }
}

impl HostDocument for MemoryDocument {
    fn create_element(&self, tag: &str) -> Result<Element> {
        self.data.created.set(self.data.created.get() + 1);
        Ok(MemoryElement::new(tag).to_element())
    }

    fn query_all(&self, query: &Query) -> Vec<Element> {
        self.connected_elements()
            .into_iter()
            .map(|node| node.to_element())
            .filter(|element| query.matches(element))
            .collect()
    }

    fn append_to_head(&self, element: &Element) -> Result<Element> {
        let Some(node) = element.downcast_ref::<MemoryElement>() else {
            warn!(?element, "foreign element cannot join a memory document");
            return Err(HostError::ForeignElement);
        };
        self.data.head.append_child(node);
        Ok(element.clone())
    }

    fn remove_from_head(&self, element: &Element) {
        if let Some(node) = element.downcast_ref::<MemoryElement>() {
            if !self.data.head.remove_child(node) {
                trace!(node_id = node.node_id(), "remove_from_head: not a head child");
            }
        }
    }

    fn active_element(&self) -> Option<Element> {
        self.data.active.borrow().as_ref().map(MemoryElement::to_element)
    }
}

// ─── Window ──────────────────────────────────────────────────────────────────

struct WindowData {
    document: MemoryDocument,
    listeners: ListenerList,
    tasks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
}

/// In-memory [`HostWindow`] with full capture/target/bubble dispatch.
#[derive(Clone)]
pub struct MemoryWindow {
    data: Rc<WindowData>,
}

impl MemoryWindow {
    #[must_use]
    pub fn new(document: MemoryDocument) -> Self {
        Self {
            data: Rc::new(WindowData {
                document,
                listeners: ListenerList::default(),
                tasks: RefCell::new(VecDeque::new()),
            }),
        }
    }

    #[must_use]
    pub fn memory_document(&self) -> MemoryDocument {
        self.data.document.clone()
    }

    #[must_use]
    pub fn as_window_ref(&self) -> WindowRef {
        Rc::new(self.clone())
    }

    /// Dispatch `event` at `target`, or at the window itself when `target`
    /// is `None`. Returns the event as seen by the last listener.
    pub fn dispatch(&self, target: Option<&MemoryElement>, event: DomEvent) -> DomEvent {
        let Some(target) = target else {
            self.data.listeners.invoke(&event, Phase::AtTarget);
            return event;
        };

        let chain = target.ancestry();
        let event = event
            .with_target(target.to_element())
            .with_path(chain.iter().map(MemoryElement::to_element).collect());

        let stopped = || event.is_propagation_stopped();

        self.data.listeners.invoke(&event, Phase::Capture);
        for node in chain.iter().skip(1).rev() {
            if stopped() {
                return event;
            }
            node.node.listeners.invoke(&event, Phase::Capture);
        }
        if stopped() {
            return event;
        }
        target.node.listeners.invoke(&event, Phase::AtTarget);
        for node in chain.iter().skip(1) {
            if stopped() {
                return event;
            }
            node.node.listeners.invoke(&event, Phase::Bubble);
        }
        if !stopped() {
            self.data.listeners.invoke(&event, Phase::Bubble);
        }
        event
    }

    /// A pointer click: `pointerdown` then `click` with `detail == 1`.
    pub fn click(&self, target: &MemoryElement) -> DomEvent {
        self.dispatch(Some(target), DomEvent::new("pointerdown"));
        self.dispatch(Some(target), DomEvent::new("click"))
    }

    /// A keyboard-activated click: no `pointerdown`, `detail == 0`.
    pub fn keyboard_click(&self, target: &MemoryElement) -> DomEvent {
        self.dispatch(Some(target), DomEvent::new("click").with_detail(0))
    }

    /// The window loses focus.
    pub fn blur(&self) -> DomEvent {
        self.dispatch(None, DomEvent::new("blur"))
    }

    /// Run queued tasks, including ones queued while flushing. Returns how
    /// many ran.
    pub fn flush_tasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.data.tasks.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.data.tasks.borrow().len()
    }

    /// Options of every window listener registered for `kind`.
    #[must_use]
    pub fn listener_options(&self, kind: &str) -> Vec<ListenerOptions> {
        self.data.listeners.registrations(kind)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.data.listeners.len()
    }
}

impl fmt::Debug for MemoryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryWindow")
            .field("listeners", &self.data.listeners.len())
            .field("pending_tasks", &self.data.tasks.borrow().len())
            .finish()
    }
}

impl EventTarget for MemoryWindow {
    fn add_event_listener(
        &self,
        kind: &str,
        listener: Listener,
        options: ListenerOptions,
    ) -> ListenerId {
        self.data.listeners.add(kind, listener, options)
    }

    fn remove_event_listener(&self, id: ListenerId) {
        self.data.listeners.remove(id);
    }
}

impl HostWindow for MemoryWindow {
    fn document(&self) -> Option<DocumentRef> {
        Some(self.data.document.as_document_ref())
    }

    fn queue_task(&self, task: Box<dyn FnOnce()>) {
        self.data.tasks.borrow_mut().push_back(task);
    }
}
