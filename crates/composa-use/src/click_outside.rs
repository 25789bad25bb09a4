#![forbid(unsafe_code)]

//! Detect clicks that land outside an element.
//!
//! A press counts as outside when its `pointerdown` started outside both the
//! target and every ignored element. The `click` that follows then calls the
//! handler. Keyboard-activated clicks carry `detail == 0` and no pointer
//! press, so they are judged from the click alone.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use composa_core::reactive::Observable;
use composa_dom::{
    DocumentRef, DomEvent, Element, HostWindow, ListenerOptions, ListenerStop, Query, WindowRef,
    default_window, use_event_listener,
};
use tracing::{debug, trace};

/// Callback for an outside click (or an iframe focus steal).
pub type ClickOutsideHandler = Rc<dyn Fn(&DomEvent)>;

/// The element clicks are measured against.
#[derive(Clone)]
pub enum ClickTarget {
    Element(Element),
    /// Resolved on every event, so the target can come and go.
    Ref(Observable<Option<Element>>),
}

impl ClickTarget {
    #[must_use]
    pub fn resolve(&self) -> Option<Element> {
        match self {
            Self::Element(element) => Some(element.clone()),
            Self::Ref(slot) => slot.get(),
        }
    }
}

impl fmt::Debug for ClickTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(element) => f.debug_tuple("Element").field(element).finish(),
            Self::Ref(slot) => f.debug_tuple("Ref").field(slot).finish(),
        }
    }
}

impl From<Element> for ClickTarget {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<&Element> for ClickTarget {
    fn from(element: &Element) -> Self {
        Self::Element(element.clone())
    }
}

impl From<Observable<Option<Element>>> for ClickTarget {
    fn from(slot: Observable<Option<Element>>) -> Self {
        Self::Ref(slot)
    }
}

impl From<&Observable<Option<Element>>> for ClickTarget {
    fn from(slot: &Observable<Option<Element>>) -> Self {
        Self::Ref(slot.clone())
    }
}

/// Elements whose subtree never counts as outside.
#[derive(Debug, Clone)]
pub enum IgnoreTarget {
    Element(Element),
    /// Every element matching the query at event time.
    Query(Query),
}

impl From<Element> for IgnoreTarget {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<Query> for IgnoreTarget {
    fn from(query: Query) -> Self {
        Self::Query(query)
    }
}

/// Configuration for [`on_click_outside`].
#[derive(Clone)]
pub struct OnClickOutsideOptions {
    /// Window to listen on. Defaults to the ambient browser window.
    pub window: Option<WindowRef>,
    /// Listen for `click` in the capture phase. Unset means `true`.
    pub capture: Option<bool>,
    pub ignore: Vec<IgnoreTarget>,
    /// Also fire when focus moves into an iframe outside the target.
    pub detect_iframe: bool,
}

impl Default for OnClickOutsideOptions {
    fn default() -> Self {
        Self {
            window: default_window(),
            capture: None,
            ignore: Vec::new(),
            detect_iframe: false,
        }
    }
}

impl OnClickOutsideOptions {
    #[must_use]
    pub fn with_window(mut self, window: Option<WindowRef>) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = Some(capture);
        self
    }

    #[must_use]
    pub fn with_ignore(mut self, ignore: impl Into<IgnoreTarget>) -> Self {
        self.ignore.push(ignore.into());
        self
    }

    #[must_use]
    pub fn with_detect_iframe(mut self, detect_iframe: bool) -> Self {
        self.detect_iframe = detect_iframe;
        self
    }

    /// The effective capture flag.
    #[must_use]
    pub fn capture(&self) -> bool {
        self.capture.unwrap_or(true)
    }
}

impl fmt::Debug for OnClickOutsideOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnClickOutsideOptions")
            .field("has_window", &self.window.is_some())
            .field("capture", &self.capture)
            .field("ignore", &self.ignore)
            .field("detect_iframe", &self.detect_iframe)
            .finish()
    }
}

struct Detector {
    target: ClickTarget,
    ignore: Vec<IgnoreTarget>,
    document: Option<DocumentRef>,
    handler: ClickOutsideHandler,
    should_listen: Cell<bool>,
}

impl Detector {
    fn is_ignored(&self, event: &DomEvent) -> bool {
        self.ignore.iter().any(|ignore| match ignore {
            IgnoreTarget::Element(element) => event.involves(element),
            IgnoreTarget::Query(query) => self
                .document
                .as_ref()
                .is_some_and(|doc| doc.query_all(query).iter().any(|el| event.involves(el))),
        })
    }

    fn on_pointer_down(&self, event: &DomEvent) {
        let outside = self
            .target
            .resolve()
            .is_some_and(|el| !event.composed_path().contains(&el));
        self.should_listen.set(outside && !self.is_ignored(event));
    }

    fn on_click(&self, event: &DomEvent) {
        let Some(el) = self.target.resolve() else {
            return;
        };
        if event.involves(&el) {
            return;
        }
        if event.detail() == 0 {
            self.should_listen.set(!self.is_ignored(event));
        }
        if !self.should_listen.get() {
            trace!("click outside suppressed");
            self.should_listen.set(true);
            return;
        }
        (self.handler)(event);
    }

    fn on_blur(&self, event: &DomEvent) {
        let Some(active) = self.document.as_ref().and_then(|doc| doc.active_element()) else {
            return;
        };
        if active.tag_name() != "IFRAME" {
            return;
        }
        if self.target.resolve().is_some_and(|el| el.contains(&active)) {
            return;
        }
        debug!("focus moved into an outside iframe");
        (self.handler)(event);
    }
}

/// Controls returned by [`on_click_outside`]. Clones share the detector.
#[derive(Clone)]
pub struct ClickOutside {
    detector: Option<Rc<Detector>>,
    stops: Rc<RefCell<Vec<ListenerStop>>>,
}

impl ClickOutside {
    fn inert() -> Self {
        Self {
            detector: None,
            stops: Rc::default(),
        }
    }

    /// Remove every listener. Idempotent.
    pub fn stop(&self) {
        for stop in self.stops.borrow_mut().drain(..) {
            stop.stop();
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.stops.borrow().iter().any(ListenerStop::is_active)
    }

    /// Ignore the next click.
    pub fn cancel(&self) {
        if let Some(detector) = &self.detector {
            detector.should_listen.set(false);
        }
    }

    /// Call the handler as if an outside click happened.
    pub fn trigger(&self, event: &DomEvent) {
        if let Some(detector) = &self.detector {
            (detector.handler)(event);
        }
    }
}

impl fmt::Debug for ClickOutside {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClickOutside")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Call `handler` when a click lands outside `target`.
///
/// Listeners go on the options' window and are removed by
/// [`ClickOutside::stop`] or when the current scope is disposed. Without a
/// window the returned controls are inert.
pub fn on_click_outside(
    target: impl Into<ClickTarget>,
    handler: impl Fn(&DomEvent) + 'static,
    options: OnClickOutsideOptions,
) -> ClickOutside {
    let capture = options.capture();
    let Some(window) = options.window else {
        trace!("no host window, click-outside is inert");
        return ClickOutside::inert();
    };
    let detector = Rc::new(Detector {
        target: target.into(),
        ignore: options.ignore,
        document: window.document(),
        handler: Rc::new(handler),
        should_listen: Cell::new(true),
    });

    let mut stops = Vec::with_capacity(3);

    let on_click = Rc::clone(&detector);
    stops.push(use_event_listener(
        &window,
        "click",
        move |event: &DomEvent| on_click.on_click(event),
        ListenerOptions::passive().with_capture(capture),
    ));

    let on_pointer_down = Rc::clone(&detector);
    stops.push(use_event_listener(
        &window,
        "pointerdown",
        move |event: &DomEvent| on_pointer_down.on_pointer_down(event),
        ListenerOptions::passive(),
    ));

    if options.detect_iframe {
        let on_blur = Rc::clone(&detector);
        let weak_window: Weak<dyn HostWindow> = Rc::downgrade(&window);
        stops.push(use_event_listener(
            &window,
            "blur",
            move |event: &DomEvent| {
                let Some(window) = weak_window.upgrade() else {
                    return;
                };
                let detector = Rc::clone(&on_blur);
                let event = event.clone();
                window.queue_task(Box::new(move || detector.on_blur(&event)));
            },
            ListenerOptions::passive(),
        ));
    }

    ClickOutside {
        detector: Some(detector),
        stops: Rc::new(RefCell::new(stops)),
    }
}
