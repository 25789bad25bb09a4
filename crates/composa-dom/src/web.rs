#![forbid(unsafe_code)]

//! Browser backend over `web-sys` (wasm32 only).
//!
//! Wrappers are created per lookup, so identity goes through
//! `Node::isSameNode` rather than the wrapper. Listener closures are kept in a
//! thread-local registry until removed; dropping a `Closure` while the browser
//! still holds the function would invalidate it.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::warn;
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen::closure::Closure;

use crate::document::{DocumentRef, HostDocument, HostWindow, Query, WindowRef};
use crate::element::{Element, HostElement};
use crate::error::{HostError, Result};
use crate::event::{DomEvent, EventTarget, Listener, ListenerId, ListenerOptions};

struct Registration {
    target: web_sys::EventTarget,
    kind: String,
    capture: bool,
    closure: Closure<dyn FnMut(web_sys::Event)>,
}

thread_local! {
    static REGISTRATIONS: RefCell<HashMap<ListenerId, Registration>> = RefCell::new(HashMap::new());
}

fn js_message(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

fn add_listener(
    target: &web_sys::EventTarget,
    kind: &str,
    listener: Listener,
    options: ListenerOptions,
) -> ListenerId {
    let id = ListenerId::next();
    let closure = Closure::<dyn FnMut(web_sys::Event)>::new(move |event: web_sys::Event| {
        listener(&convert_event(&event));
    });
    let js_options = web_sys::AddEventListenerOptions::new();
    js_options.set_capture(options.capture);
    js_options.set_passive(options.passive);
    js_options.set_once(options.once);
    if let Err(err) = target.add_event_listener_with_callback_and_add_event_listener_options(
        kind,
        closure.as_ref().unchecked_ref(),
        &js_options,
    ) {
        warn!(kind, error = %js_message(&err), "addEventListener failed");
    }
    REGISTRATIONS.with(|registry| {
        registry.borrow_mut().insert(
            id,
            Registration {
                target: target.clone(),
                kind: kind.to_owned(),
                capture: options.capture,
                closure,
            },
        );
    });
    id
}

fn remove_listener(id: ListenerId) {
    let registration = REGISTRATIONS.with(|registry| registry.borrow_mut().remove(&id));
    if let Some(reg) = registration {
        if let Err(err) = reg.target.remove_event_listener_with_callback_and_bool(
            &reg.kind,
            reg.closure.as_ref().unchecked_ref(),
            reg.capture,
        ) {
            warn!(kind = %reg.kind, error = %js_message(&err), "removeEventListener failed");
        }
    }
}

fn convert_event(event: &web_sys::Event) -> DomEvent {
    let composed: js_sys::Array = event.composed_path();
    let path: Vec<Element> = composed
        .iter()
        .filter_map(|value| value.dyn_into::<web_sys::Element>().ok())
        .map(WebElement::wrap)
        .collect();
    let mut converted = DomEvent::new(event.type_()).with_path(path);
    if let Some(target) = event
        .target()
        .and_then(|target| target.dyn_into::<web_sys::Element>().ok())
    {
        converted = converted.with_target(WebElement::wrap(target));
    }
    if let Some(ui) = event.dyn_ref::<web_sys::UiEvent>() {
        converted = converted.with_detail(ui.detail());
    }
    converted
}

// ─── Element ─────────────────────────────────────────────────────────────────

/// A browser element.
#[derive(Clone)]
pub struct WebElement(web_sys::Element);

impl WebElement {
    #[must_use]
    pub fn wrap(element: web_sys::Element) -> Element {
        Element::new(Self(element))
    }

    #[must_use]
    pub fn raw(&self) -> &web_sys::Element {
        &self.0
    }

    fn node(&self) -> &web_sys::Node {
        self.0.as_ref()
    }
}

impl EventTarget for WebElement {
    fn add_event_listener(
        &self,
        kind: &str,
        listener: Listener,
        options: ListenerOptions,
    ) -> ListenerId {
        add_listener(self.0.as_ref(), kind, listener, options)
    }

    fn remove_event_listener(&self, id: ListenerId) {
        remove_listener(id);
    }
}

impl HostElement for WebElement {
    fn tag_name(&self) -> String {
        self.0.tag_name()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.0.get_attribute(name)
    }

    fn set_attribute(&self, name: &str, value: &str) {
        if let Err(err) = self.0.set_attribute(name, value) {
            warn!(name, error = %js_message(&err), "setAttribute failed");
        }
    }

    fn remove_attribute(&self, name: &str) {
        if let Err(err) = self.0.remove_attribute(name) {
            warn!(name, error = %js_message(&err), "removeAttribute failed");
        }
    }

    fn set_flag(&self, name: &str, on: bool) {
        // Script-inserted scripts are async unless the property is cleared;
        // removing the attribute alone does not do that.
        if name == "async" {
            if let Some(script) = self.0.dyn_ref::<web_sys::HtmlScriptElement>() {
                script.set_async(on);
                return;
            }
        }
        if on {
            self.set_attribute(name, "");
        } else {
            self.remove_attribute(name);
        }
    }

    fn text_content(&self) -> Option<String> {
        self.node().text_content()
    }

    fn set_text_content(&self, text: &str) {
        self.node().set_text_content(Some(text));
    }

    fn is_connected(&self) -> bool {
        self.node().is_connected()
    }

    fn contains(&self, other: &dyn HostElement) -> bool {
        other
            .as_any()
            .downcast_ref::<WebElement>()
            .is_some_and(|other| self.node().contains(Some(other.node())))
    }

    fn is_same_node(&self, other: &dyn HostElement) -> bool {
        other
            .as_any()
            .downcast_ref::<WebElement>()
            .is_some_and(|other| self.node().is_same_node(Some(other.node())))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ─── Document ────────────────────────────────────────────────────────────────

/// A browser document.
#[derive(Clone)]
pub struct WebDocument(web_sys::Document);

impl WebDocument {
    #[must_use]
    pub fn new(document: web_sys::Document) -> Self {
        Self(document)
    }

    fn head(&self) -> Result<web_sys::HtmlHeadElement> {
        self.0.head().ok_or(HostError::MissingHead)
    }
}

fn web_node(element: &Element) -> Result<web_sys::Node> {
    element
        .downcast_ref::<WebElement>()
        .map(|web| web.node().clone())
        .ok_or(HostError::ForeignElement)
}

impl HostDocument for WebDocument {
    fn create_element(&self, tag: &str) -> Result<Element> {
        self.0
            .create_element(tag)
            .map(WebElement::wrap)
            .map_err(|err| HostError::call("createElement", js_message(&err)))
    }

    fn query_all(&self, query: &Query) -> Vec<Element> {
        let selector = query.to_selector();
        let list = match self.0.query_selector_all(&selector) {
            Ok(list) => list,
            Err(err) => {
                warn!(%selector, error = %js_message(&err), "querySelectorAll failed");
                return Vec::new();
            }
        };
        (0..list.length())
            .filter_map(|index| list.get(index))
            .filter_map(|node| node.dyn_into::<web_sys::Element>().ok())
            .map(WebElement::wrap)
            .collect()
    }

    fn element_by_id(&self, id: &str) -> Option<Element> {
        self.0.get_element_by_id(id).map(WebElement::wrap)
    }

    fn append_to_head(&self, element: &Element) -> Result<Element> {
        let node = web_node(element)?;
        self.head()?
            .append_child(&node)
            .map_err(|err| HostError::call("appendChild", js_message(&err)))?;
        Ok(element.clone())
    }

    fn remove_from_head(&self, element: &Element) {
        let (Ok(node), Ok(head)) = (web_node(element), self.head()) else {
            return;
        };
        if let Err(err) = head.remove_child(&node) {
            warn!(error = %js_message(&err), "removeChild failed");
        }
    }

    fn active_element(&self) -> Option<Element> {
        self.0.active_element().map(WebElement::wrap)
    }
}

// ─── Window ──────────────────────────────────────────────────────────────────

/// A browser window.
#[derive(Clone)]
pub struct WebWindow(web_sys::Window);

impl WebWindow {
    #[must_use]
    pub fn new(window: web_sys::Window) -> Self {
        Self(window)
    }
}

impl EventTarget for WebWindow {
    fn add_event_listener(
        &self,
        kind: &str,
        listener: Listener,
        options: ListenerOptions,
    ) -> ListenerId {
        add_listener(self.0.as_ref(), kind, listener, options)
    }

    fn remove_event_listener(&self, id: ListenerId) {
        remove_listener(id);
    }
}

impl HostWindow for WebWindow {
    fn document(&self) -> Option<DocumentRef> {
        self.0
            .document()
            .map(|document| Rc::new(WebDocument(document)) as DocumentRef)
    }

    fn queue_task(&self, task: Box<dyn FnOnce()>) {
        let callback = Closure::once_into_js(move || task());
        if let Err(err) = self
            .0
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), 0)
        {
            warn!(error = %js_message(&err), "setTimeout failed");
        }
    }
}

/// The global document, if running in a browser.
#[must_use]
pub fn document() -> Option<DocumentRef> {
    let document = web_sys::window()?.document()?;
    Some(Rc::new(WebDocument(document)))
}

/// The global window, if running in a browser.
#[must_use]
pub fn window() -> Option<WindowRef> {
    web_sys::window().map(|window| Rc::new(WebWindow(window)) as WindowRef)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn head_roundtrip() {
        let doc = document().expect("browser document");
        let style = doc.create_element("style").expect("create style");
        style.set_attribute("id", "composa-web-test");
        doc.append_to_head(&style).expect("append");
        assert_eq!(doc.element_by_id("composa-web-test"), Some(style.clone()));
        doc.remove_from_head(&style);
        assert!(!style.is_connected());
    }
}
