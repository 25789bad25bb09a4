#![forbid(unsafe_code)]

//! Script-tag injection.
//!
//! [`use_script_tag`] keeps a `<script src=…>` in the document head in step
//! with a loader handle. Loading is idempotent: every [`ScriptTag::load`]
//! call made before [`ScriptTag::unload`] shares one [`PendingLoad`], so a
//! burst of callers injects exactly one element and observes one outcome.
//!
//! # Invariants
//!
//! 1. At most one `script[src=…]` per URL is created by a loader.
//! 2. The pending load is cleared only by `unload`.
//! 3. `is_loaded` turns true only on readiness, or on append when readiness
//!    waiting is disabled.
//! 4. `unload` does not cancel an in-flight load. The shared future still
//!    settles, but a stale load no longer touches the loader state.
//! 5. The `load`/`error`/`abort` listeners of a load detach together on the
//!    first of those events, or when the scope that started the load is
//!    disposed.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use composa_core::reactive::{MaybeReactive, Observable};
use composa_core::scope::{try_on_mounted, try_on_unmounted};
use composa_dom::{
    DocumentRef, DomEvent, Element, ListenerOptions, ListenerStop, Query, default_document,
    use_event_listener,
};
use tracing::{debug, trace, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::deferred::Deferred;
use crate::error::ScriptLoadError;

/// Attribute set on a script once its `load` event has fired.
pub const DATA_LOADED: &str = "data-loaded";

/// Settled value of a load: the script element, or `None` when there is no
/// host document.
pub type LoadOutcome = Result<Option<Element>, ScriptLoadError>;

/// The memoized load shared by every caller of [`ScriptTag::load`].
pub type PendingLoad = Deferred<LoadOutcome>;

// ─── Options ─────────────────────────────────────────────────────────────────

/// `crossorigin` attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum CrossOrigin {
    Anonymous,
    UseCredentials,
}

impl CrossOrigin {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::UseCredentials => "use-credentials",
        }
    }
}

/// `referrerpolicy` attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ReferrerPolicy {
    NoReferrer,
    NoReferrerWhenDowngrade,
    Origin,
    OriginWhenCrossOrigin,
    SameOrigin,
    StrictOrigin,
    StrictOriginWhenCrossOrigin,
    UnsafeUrl,
}

impl ReferrerPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoReferrer => "no-referrer",
            Self::NoReferrerWhenDowngrade => "no-referrer-when-downgrade",
            Self::Origin => "origin",
            Self::OriginWhenCrossOrigin => "origin-when-cross-origin",
            Self::SameOrigin => "same-origin",
            Self::StrictOrigin => "strict-origin",
            Self::StrictOriginWhenCrossOrigin => "strict-origin-when-cross-origin",
            Self::UnsafeUrl => "unsafe-url",
        }
    }
}

/// Configuration for [`use_script_tag`].
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScriptTagOptions {
    /// Load as soon as the owning component mounts.
    pub immediate: bool,
    /// Skip every lifecycle binding; the caller drives `load`/`unload`.
    pub manual: bool,
    #[cfg_attr(feature = "serde", serde(rename = "async"))]
    pub async_: bool,
    pub defer: bool,
    pub cross_origin: Option<CrossOrigin>,
    pub referrer_policy: Option<ReferrerPolicy>,
    pub no_module: bool,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub type_: String,
    /// Extra attributes, applied last.
    pub attrs: BTreeMap<String, String>,
    pub nonce: Option<String>,
    /// Target document. Defaults to the ambient browser document.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub document: Option<DocumentRef>,
}

impl Default for ScriptTagOptions {
    fn default() -> Self {
        Self {
            immediate: true,
            manual: false,
            async_: true,
            defer: false,
            cross_origin: None,
            referrer_policy: None,
            no_module: false,
            type_: "text/javascript".to_owned(),
            attrs: BTreeMap::new(),
            nonce: None,
            document: default_document(),
        }
    }
}

impl ScriptTagOptions {
    #[must_use]
    pub fn with_immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    #[must_use]
    pub fn with_manual(mut self, manual: bool) -> Self {
        self.manual = manual;
        self
    }

    #[must_use]
    pub fn with_async(mut self, async_: bool) -> Self {
        self.async_ = async_;
        self
    }

    #[must_use]
    pub fn with_defer(mut self, defer: bool) -> Self {
        self.defer = defer;
        self
    }

    #[must_use]
    pub fn with_cross_origin(mut self, cross_origin: CrossOrigin) -> Self {
        self.cross_origin = Some(cross_origin);
        self
    }

    #[must_use]
    pub fn with_referrer_policy(mut self, policy: ReferrerPolicy) -> Self {
        self.referrer_policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_no_module(mut self, no_module: bool) -> Self {
        self.no_module = no_module;
        self
    }

    #[must_use]
    pub fn with_type(mut self, type_: impl Into<String>) -> Self {
        self.type_ = type_.into();
        self
    }

    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    #[must_use]
    pub fn with_document(mut self, document: Option<DocumentRef>) -> Self {
        self.document = document;
        self
    }
}

impl fmt::Debug for ScriptTagOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptTagOptions")
            .field("immediate", &self.immediate)
            .field("manual", &self.manual)
            .field("async_", &self.async_)
            .field("defer", &self.defer)
            .field("cross_origin", &self.cross_origin)
            .field("referrer_policy", &self.referrer_policy)
            .field("no_module", &self.no_module)
            .field("type_", &self.type_)
            .field("attrs", &self.attrs)
            .field("nonce", &self.nonce)
            .field("has_document", &self.document.is_some())
            .finish()
    }
}

// ─── Loader ──────────────────────────────────────────────────────────────────

struct ScriptTagInner {
    src: MaybeReactive<String>,
    options: ScriptTagOptions,
    on_loaded: Rc<dyn Fn(&Element)>,
    script_tag: Observable<Option<Element>>,
    loaded: Observable<bool>,
    pending: RefCell<Option<PendingLoad>>,
    /// Bumped by `unload`; loads started under an older generation settle
    /// their future but leave the loader state alone.
    generation: Cell<u64>,
}

/// Handle to an injected script. Clones share the loader.
#[derive(Clone)]
pub struct ScriptTag {
    inner: Rc<ScriptTagInner>,
}

/// The readiness listeners of one load. Detaching any of them detaches all.
#[derive(Clone, Default)]
struct Readiness {
    stops: Rc<RefCell<Vec<ListenerStop>>>,
}

impl Readiness {
    fn track(&self, stop: ListenerStop) {
        self.stops.borrow_mut().push(stop);
    }

    fn detach(&self) {
        let stops = std::mem::take(&mut *self.stops.borrow_mut());
        for stop in stops {
            stop.stop();
        }
    }
}

fn script_query(src: &str) -> Query {
    Query::tag_attr("script", "src", src)
}

impl ScriptTag {
    fn new(
        src: MaybeReactive<String>,
        on_loaded: Rc<dyn Fn(&Element)>,
        options: ScriptTagOptions,
    ) -> Self {
        Self {
            inner: Rc::new(ScriptTagInner {
                src,
                options,
                on_loaded,
                script_tag: Observable::new(None),
                loaded: Observable::new(false),
                pending: RefCell::new(None),
                generation: Cell::new(0),
            }),
        }
    }

    /// The script URL as of now.
    #[must_use]
    pub fn src(&self) -> String {
        self.inner.src.get()
    }

    /// The script element, once a load has resolved.
    #[must_use]
    pub fn script_tag(&self) -> Option<Element> {
        self.inner.script_tag.get()
    }

    /// Observable view of [`Self::script_tag`].
    #[must_use]
    pub fn script_tag_observable(&self) -> Observable<Option<Element>> {
        self.inner.script_tag.clone()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.get()
    }

    /// Whether a load has started since the last `unload`.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.pending.borrow().is_some()
    }

    #[must_use]
    pub fn options(&self) -> &ScriptTagOptions {
        &self.inner.options
    }

    /// Start loading, or join the load already in progress.
    ///
    /// With `wait_for_ready`, the returned future settles on the script's
    /// `load`, `error` or `abort` event. Without it, the future is settled as
    /// soon as the element is in the head.
    pub fn load(&self, wait_for_ready: bool) -> PendingLoad {
        if let Some(pending) = self.inner.pending.borrow().as_ref() {
            trace!(src = %self.src(), "joining pending script load");
            return pending.clone();
        }
        let pending = PendingLoad::new();
        *self.inner.pending.borrow_mut() = Some(pending.clone());
        self.start_load(&pending, wait_for_ready);
        pending
    }

    /// Remove the script and reset the loader. A no-op without a document.
    pub fn unload(&self) {
        let Some(document) = self.inner.options.document.as_ref() else {
            return;
        };
        self.inner.pending.borrow_mut().take();
        self.inner.generation.set(self.inner.generation.get() + 1);
        self.inner.script_tag.set(None);
        self.inner.loaded.set(false);

        let src = self.src();
        if let Some(element) = document.query(&script_query(&src)) {
            debug!(%src, "removing script");
            document.remove_from_head(&element);
        }
    }

    fn start_load(&self, pending: &PendingLoad, wait_for_ready: bool) {
        let Some(document) = self.inner.options.document.clone() else {
            trace!("no host document, script load resolves empty");
            pending.resolve(Ok(None));
            return;
        };
        let generation = self.inner.generation.get();
        let src = self.src();

        let (element, fresh) = match document.query(&script_query(&src)) {
            Some(existing) if existing.has_attribute(DATA_LOADED) => {
                debug!(%src, "script already loaded");
                self.settle(generation, pending, existing);
                return;
            }
            Some(existing) => {
                debug!(%src, "waiting on existing script");
                (existing, false)
            }
            None => match self.build_script(&document, &src) {
                Ok(element) => (element, true),
                Err(err) => {
                    warn!(%src, error = %err, "could not create script");
                    pending.resolve(Err(err));
                    return;
                }
            },
        };

        let readiness = self.watch_readiness(&element, pending, generation, &src);

        let element = if fresh {
            match document.append_to_head(&element) {
                Ok(element) => {
                    debug!(%src, "script appended");
                    element
                }
                Err(err) => {
                    warn!(%src, error = %err, "could not append script");
                    readiness.detach();
                    pending.resolve(Err(err.into()));
                    return;
                }
            }
        } else {
            element
        };

        if !wait_for_ready {
            self.settle(generation, pending, element);
        }
    }

    fn build_script(
        &self,
        document: &DocumentRef,
        src: &str,
    ) -> Result<Element, ScriptLoadError> {
        let options = &self.inner.options;
        let element = document.create_element("script")?;
        element.set_attribute("type", &options.type_);
        element.set_flag("async", options.async_);
        element.set_attribute("src", src);
        if options.defer {
            element.set_flag("defer", true);
        }
        if let Some(cross_origin) = options.cross_origin {
            element.set_attribute("crossorigin", cross_origin.as_str());
        }
        if options.no_module {
            element.set_flag("nomodule", true);
        }
        if let Some(policy) = options.referrer_policy {
            element.set_attribute("referrerpolicy", policy.as_str());
        }
        if let Some(nonce) = &options.nonce {
            element.set_attribute("nonce", nonce);
        }
        for (name, value) in &options.attrs {
            element.set_attribute(name, value);
        }
        Ok(element)
    }

    fn watch_readiness(
        &self,
        element: &Element,
        pending: &PendingLoad,
        generation: u64,
        src: &str,
    ) -> Readiness {
        let readiness = Readiness::default();
        let weak = Rc::downgrade(&self.inner);
        let on_load = pending.clone();
        let load_readiness = readiness.clone();
        readiness.track(use_event_listener(
            element,
            "load",
            move |event: &DomEvent| {
                load_readiness.detach();
                let Some(element) = event.target().cloned() else {
                    return;
                };
                element.set_attribute(DATA_LOADED, "true");
                match weak.upgrade() {
                    Some(inner) => {
                        (inner.on_loaded)(&element);
                        ScriptTag { inner }.settle(generation, &on_load, element);
                    }
                    None => {
                        on_load.resolve(Ok(Some(element)));
                    }
                }
            },
            ListenerOptions::passive(),
        ));

        let on_error = pending.clone();
        let error_src = src.to_owned();
        let error_readiness = readiness.clone();
        readiness.track(use_event_listener(
            element,
            "error",
            move |_: &DomEvent| {
                error_readiness.detach();
                warn!(src = %error_src, "script failed to load");
                on_error.resolve(Err(ScriptLoadError::Errored {
                    src: error_src.clone(),
                }));
            },
            ListenerOptions::passive(),
        ));

        let on_abort = pending.clone();
        let abort_src = src.to_owned();
        let abort_readiness = readiness.clone();
        readiness.track(use_event_listener(
            element,
            "abort",
            move |_: &DomEvent| {
                abort_readiness.detach();
                warn!(src = %abort_src, "script load aborted");
                on_abort.resolve(Err(ScriptLoadError::Aborted {
                    src: abort_src.clone(),
                }));
            },
            ListenerOptions::passive(),
        ));
        readiness
    }

    fn settle(&self, generation: u64, pending: &PendingLoad, element: Element) {
        if self.inner.generation.get() == generation {
            self.inner.script_tag.set(Some(element.clone()));
            self.inner.loaded.set(true);
        } else {
            trace!("stale script load settled after unload");
        }
        pending.resolve(Ok(Some(element)));
    }
}

impl fmt::Debug for ScriptTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptTag")
            .field("src", &self.src())
            .field("loaded", &self.is_loaded())
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Inject `<script src=…>` into the document head.
///
/// Unless `manual` is set, the script loads when the current component
/// mounts (or right away outside a component) and is removed when it
/// unmounts. `on_loaded` receives the element on its `load` event.
pub fn use_script_tag(
    src: impl Into<MaybeReactive<String>>,
    on_loaded: impl Fn(&Element) + 'static,
    options: ScriptTagOptions,
) -> ScriptTag {
    let immediate = options.immediate;
    let manual = options.manual;
    let tag = ScriptTag::new(src.into(), Rc::new(on_loaded), options);

    if immediate && !manual {
        let mounted = tag.clone();
        try_on_mounted(move || {
            let _ = mounted.load(true);
        });
    }
    if !manual {
        let unmounted = tag.clone();
        try_on_unmounted(move || unmounted.unload());
    }
    tag
}

#[cfg(test)]
mod tests {
    use super::*;
    use composa_dom::HostElement;
    use composa_dom::memory::{MemoryDocument, MemoryElement};
    use pretty_assertions::assert_eq;
    use std::future::Future;
    use std::pin::Pin;
    use std::task::{Context, Poll, Waker};

    const SRC: &str = "https://cdn.example/widget.js";

    fn poll_now(pending: &mut PendingLoad) -> Poll<LoadOutcome> {
        Pin::new(pending).poll(&mut Context::from_waker(Waker::noop()))
    }

    fn manual(doc: &MemoryDocument) -> ScriptTagOptions {
        ScriptTagOptions::default()
            .with_manual(true)
            .with_document(Some(doc.as_document_ref()))
    }

    fn head_script(doc: &MemoryDocument) -> MemoryElement {
        let scripts: Vec<_> = doc
            .head_children()
            .into_iter()
            .filter(|node| node.tag_name() == "SCRIPT")
            .collect();
        assert_eq!(scripts.len(), 1, "expected exactly one script in head");
        scripts.into_iter().next().unwrap()
    }

    #[test]
    fn default_attributes() {
        let doc = MemoryDocument::new();
        let tag = use_script_tag(SRC, |_| {}, manual(&doc));
        let _ = tag.load(true);

        let script = head_script(&doc);
        assert_eq!(script.attribute("src").as_deref(), Some(SRC));
        assert_eq!(script.attribute("type").as_deref(), Some("text/javascript"));
        assert!(script.has_attribute("async"));
        assert!(!script.has_attribute("defer"));
        assert!(!script.has_attribute("nomodule"));
        assert_eq!(script.listener_options("load"), vec![ListenerOptions::passive()]);
    }

    #[test]
    fn configured_attributes() {
        let doc = MemoryDocument::new();
        let options = manual(&doc)
            .with_async(false)
            .with_defer(true)
            .with_cross_origin(CrossOrigin::UseCredentials)
            .with_referrer_policy(ReferrerPolicy::StrictOrigin)
            .with_no_module(true)
            .with_type("module")
            .with_nonce("n0nce")
            .with_attr("data-widget", "chat");
        let tag = use_script_tag(SRC, |_| {}, options);
        let _ = tag.load(false);

        let script = head_script(&doc);
        assert!(!script.has_attribute("async"));
        assert!(script.has_attribute("defer"));
        assert!(script.has_attribute("nomodule"));
        assert_eq!(script.attribute("crossorigin").as_deref(), Some("use-credentials"));
        assert_eq!(script.attribute("referrerpolicy").as_deref(), Some("strict-origin"));
        assert_eq!(script.attribute("type").as_deref(), Some("module"));
        assert_eq!(script.attribute("nonce").as_deref(), Some("n0nce"));
        assert_eq!(script.attribute("data-widget").as_deref(), Some("chat"));
    }

    #[test]
    fn load_event_marks_ready_and_calls_back() {
        let doc = MemoryDocument::new();
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let tag = use_script_tag(
            SRC,
            move |el: &Element| *sink.borrow_mut() = Some(el.clone()),
            manual(&doc),
        );
        let mut pending = tag.load(true);
        assert!(poll_now(&mut pending).is_pending());
        assert!(!tag.is_loaded());

        let script = head_script(&doc);
        script.fire("load");

        let element = script.to_element();
        assert_eq!(poll_now(&mut pending), Poll::Ready(Ok(Some(element.clone()))));
        assert_eq!(script.attribute(DATA_LOADED).as_deref(), Some("true"));
        assert_eq!(seen.borrow().clone(), Some(element.clone()));
        assert_eq!(tag.script_tag(), Some(element));
        assert!(tag.is_loaded());
    }

    #[test]
    fn error_and_abort_reject() {
        for (kind, expected) in [
            ("error", ScriptLoadError::Errored { src: SRC.into() }),
            ("abort", ScriptLoadError::Aborted { src: SRC.into() }),
        ] {
            let doc = MemoryDocument::new();
            let tag = use_script_tag(SRC, |_| {}, manual(&doc));
            let mut pending = tag.load(true);
            head_script(&doc).fire(kind);
            assert_eq!(poll_now(&mut pending), Poll::Ready(Err(expected)));
            assert!(!tag.is_loaded());
            assert_eq!(tag.script_tag(), None);
        }
    }

    #[test]
    fn existing_unready_script_is_adopted() {
        let doc = MemoryDocument::new();
        let existing = doc.fixture("script");
        existing.set_attribute("src", SRC);
        doc.head().append_child(&existing);

        let tag = use_script_tag(SRC, |_| {}, manual(&doc));
        let mut pending = tag.load(true);
        assert!(poll_now(&mut pending).is_pending());
        assert_eq!(doc.elements_created(), 0);

        existing.fire("load");
        assert_eq!(
            poll_now(&mut pending),
            Poll::Ready(Ok(Some(existing.to_element())))
        );
    }

    #[test]
    fn without_wait_resolves_on_append() {
        let doc = MemoryDocument::new();
        let tag = use_script_tag(SRC, |_| {}, manual(&doc));
        let mut pending = tag.load(false);

        let script = head_script(&doc);
        assert!(script.is_connected());
        assert_eq!(poll_now(&mut pending), Poll::Ready(Ok(Some(script.to_element()))));
        assert!(tag.is_loaded());
        assert!(!script.has_attribute(DATA_LOADED));
    }

    #[test]
    fn no_document_resolves_empty() {
        let tag = use_script_tag(SRC, |_| {}, ScriptTagOptions::default().with_manual(true).with_document(None));
        assert_eq!(pollster::block_on(tag.load(true)), Ok(None));
        tag.unload();
        assert!(tag.is_pending());
    }

    #[test]
    fn reactive_src_is_read_at_load_time() {
        let doc = MemoryDocument::new();
        let src = Observable::new("/a.js".to_owned());
        let tag = use_script_tag(&src, |_| {}, manual(&doc));
        src.set("/b.js".to_owned());
        let _ = tag.load(false);
        assert_eq!(head_script(&doc).attribute("src").as_deref(), Some("/b.js"));
    }

    #[test]
    fn stale_load_leaves_state_alone() {
        let doc = MemoryDocument::new();
        let tag = use_script_tag(SRC, |_| {}, manual(&doc));
        let mut first = tag.load(true);
        let script = head_script(&doc);

        tag.unload();
        script.fire("load");

        assert_eq!(poll_now(&mut first), Poll::Ready(Ok(Some(script.to_element()))));
        assert!(!tag.is_loaded());
        assert_eq!(tag.script_tag(), None);
        assert_eq!(script.listener_count(), 0);
    }

    #[test]
    fn readiness_listeners_detach_on_first_signal() {
        for kind in ["load", "error", "abort"] {
            let doc = MemoryDocument::new();
            let tag = use_script_tag(SRC, |_| {}, manual(&doc));
            let _ = tag.load(true);
            let script = head_script(&doc);
            assert_eq!(script.listener_count(), 3, "{kind}");

            script.fire(kind);
            assert_eq!(script.listener_count(), 0, "{kind}");
        }
    }

    #[test]
    fn eager_load_keeps_listening_until_ready() {
        let doc = MemoryDocument::new();
        let tag = use_script_tag(SRC, |_| {}, manual(&doc));
        let _ = tag.load(false);
        let script = head_script(&doc);
        assert_eq!(script.listener_count(), 3);

        script.fire("load");
        assert_eq!(script.attribute(DATA_LOADED).as_deref(), Some("true"));
        assert_eq!(script.listener_count(), 0);
    }

    #[test]
    fn script_tag_observable_follows_load_and_unload() {
        use composa_core::reactive::{WatchOptions, watch};

        let doc = MemoryDocument::new();
        let tag = use_script_tag(SRC, |_| {}, manual(&doc));
        let slot = tag.script_tag_observable();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _handle = watch(
            &MaybeReactive::from(&slot),
            move |value: &Option<Element>| sink.borrow_mut().push(value.is_some()),
            WatchOptions::default(),
        );

        let _ = tag.load(true);
        assert_eq!(slot.get(), None);
        head_script(&doc).fire("load");
        assert_eq!(slot.get(), tag.script_tag());
        assert!(slot.get().is_some());

        tag.unload();
        assert_eq!(slot.get(), None);
        assert_eq!(*seen.borrow(), vec![true, false]);
    }
}
