#![forbid(unsafe_code)]

//! Declarative element bindings.
//!
//! A template layer calls [`ElementDirective::mounted`] when a bound element
//! enters the document and [`ElementDirective::unmounted`] when it leaves.
//! [`VOnClickOutside`] is the click-outside binding.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use composa_dom::{DomEvent, Element};
use tracing::trace;

use crate::click_outside::{
    ClickOutside, ClickOutsideHandler, OnClickOutsideOptions, on_click_outside,
};

/// Modifier that moves the click listener to the bubble phase.
pub const BUBBLE: &str = "bubble";

/// The value and modifiers a template attaches to an element.
#[derive(Debug, Clone)]
pub struct DirectiveBinding<V> {
    pub value: V,
    pub modifiers: BTreeSet<String>,
}

impl<V> DirectiveBinding<V> {
    pub fn new(value: V) -> Self {
        Self {
            value,
            modifiers: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_modifier(mut self, modifier: impl Into<String>) -> Self {
        self.modifiers.insert(modifier.into());
        self
    }

    #[must_use]
    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.contains(modifier)
    }
}

/// Element lifecycle callbacks for a directive.
pub trait ElementDirective {
    type Value;

    fn mounted(&self, element: &Element, binding: &DirectiveBinding<Self::Value>);

    fn unmounted(&self, element: &Element);
}

/// Binding value of [`VOnClickOutside`]: a handler, or a handler plus
/// options.
#[derive(Clone)]
pub enum ClickOutsideBinding {
    Handler(ClickOutsideHandler),
    WithOptions(ClickOutsideHandler, OnClickOutsideOptions),
}

impl ClickOutsideBinding {
    pub fn handler(handler: impl Fn(&DomEvent) + 'static) -> Self {
        Self::Handler(Rc::new(handler))
    }

    pub fn with_options(
        handler: impl Fn(&DomEvent) + 'static,
        options: OnClickOutsideOptions,
    ) -> Self {
        Self::WithOptions(Rc::new(handler), options)
    }
}

impl fmt::Debug for ClickOutsideBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::WithOptions(_, options) => {
                f.debug_tuple("WithOptions").field(&"..").field(options).finish()
            }
        }
    }
}

/// `v-on-click-outside`: runs the handler on clicks outside the bound
/// element. Listens in the capture phase unless the `bubble` modifier is
/// set; an explicit `capture` option wins over the modifier.
#[derive(Default)]
pub struct VOnClickOutside {
    bound: RefCell<Vec<(Element, ClickOutside)>>,
}

impl VOnClickOutside {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `element` currently has a live binding.
    #[must_use]
    pub fn is_bound(&self, element: &Element) -> bool {
        self.bound.borrow().iter().any(|(el, _)| el == element)
    }

    fn take(&self, element: &Element) -> Option<ClickOutside> {
        let mut bound = self.bound.borrow_mut();
        let index = bound.iter().position(|(el, _)| el == element)?;
        Some(bound.swap_remove(index).1)
    }
}

impl ElementDirective for VOnClickOutside {
    type Value = ClickOutsideBinding;

    fn mounted(&self, element: &Element, binding: &DirectiveBinding<ClickOutsideBinding>) {
        if let Some(previous) = self.take(element) {
            previous.stop();
        }
        let bubble = binding.has_modifier(BUBBLE);
        let (handler, mut options) = match &binding.value {
            ClickOutsideBinding::Handler(handler) => {
                (Rc::clone(handler), OnClickOutsideOptions::default())
            }
            ClickOutsideBinding::WithOptions(handler, options) => {
                (Rc::clone(handler), options.clone())
            }
        };
        options.capture = options.capture.or(Some(!bubble));
        trace!(?element, capture = options.capture(), "binding click-outside");
        let controls = on_click_outside(element, move |event: &DomEvent| handler(event), options);
        self.bound.borrow_mut().push((element.clone(), controls));
    }

    fn unmounted(&self, element: &Element) {
        if let Some(controls) = self.take(element) {
            controls.stop();
        }
    }
}

impl fmt::Debug for VOnClickOutside {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VOnClickOutside")
            .field("bound", &self.bound.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composa_dom::memory::{MemoryDocument, MemoryElement, MemoryWindow};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    fn setup() -> (MemoryWindow, MemoryElement, MemoryElement) {
        let doc = MemoryDocument::new();
        let window = MemoryWindow::new(doc.clone());
        let panel = doc.fixture("div");
        let outside = doc.fixture("span");
        doc.body().append_child(&panel);
        doc.body().append_child(&outside);
        (window, panel, outside)
    }

    fn with_window(window: &MemoryWindow) -> OnClickOutsideOptions {
        OnClickOutsideOptions::default().with_window(Some(window.as_window_ref()))
    }

    #[test]
    fn mount_listens_unmount_stops() {
        let (window, panel, outside) = setup();
        let hits = Rc::new(Cell::new(0));
        let sink = Rc::clone(&hits);
        let directive = VOnClickOutside::new();
        let element = panel.to_element();

        directive.mounted(
            &element,
            &DirectiveBinding::new(ClickOutsideBinding::with_options(
                move |_| sink.set(sink.get() + 1),
                with_window(&window),
            )),
        );
        assert!(directive.is_bound(&element));
        window.click(&outside);
        assert_eq!(hits.get(), 1);

        directive.unmounted(&element);
        assert!(!directive.is_bound(&element));
        assert_eq!(window.listener_count(), 0);
        window.click(&outside);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn bubble_modifier_selects_bubble_phase() {
        let (window, panel, _) = setup();
        let directive = VOnClickOutside::new();
        directive.mounted(
            &panel.to_element(),
            &DirectiveBinding::new(ClickOutsideBinding::with_options(|_| {}, with_window(&window)))
                .with_modifier(BUBBLE),
        );
        let captures: Vec<bool> = window
            .listener_options("click")
            .iter()
            .map(|o| o.capture)
            .collect();
        assert_eq!(captures, vec![false]);
    }

    #[test]
    fn explicit_capture_beats_modifier() {
        let (window, panel, _) = setup();
        let directive = VOnClickOutside::new();
        directive.mounted(
            &panel.to_element(),
            &DirectiveBinding::new(ClickOutsideBinding::with_options(
                |_| {},
                with_window(&window).with_capture(true),
            ))
            .with_modifier(BUBBLE),
        );
        let captures: Vec<bool> = window
            .listener_options("click")
            .iter()
            .map(|o| o.capture)
            .collect();
        assert_eq!(captures, vec![true]);
    }

    #[test]
    fn remount_replaces_binding() {
        let (window, panel, _) = setup();
        let directive = VOnClickOutside::new();
        let element = panel.to_element();
        let binding =
            DirectiveBinding::new(ClickOutsideBinding::with_options(|_| {}, with_window(&window)));
        directive.mounted(&element, &binding);
        directive.mounted(&element, &binding);
        assert_eq!(window.listener_options("click").len(), 1);
    }
}
