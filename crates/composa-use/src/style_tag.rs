#![forbid(unsafe_code)]

//! Style-tag injection.
//!
//! A [`StyleTag`] owns one `<style id=…>` in the document head and keeps its
//! text equal to the `css` observable while loaded. Writes to `css` reach the
//! element synchronously.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use composa_core::reactive::{MaybeReactive, Observable, WatchHandle, WatchOptions, watch};
use composa_core::scope::{try_on_mounted, try_on_scope_dispose};
use composa_dom::{DocumentRef, HostError, default_document};
use tracing::{debug, trace, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

static NEXT_STYLE_ID: AtomicU64 = AtomicU64::new(1);

/// `composa_styletag_<n>`, unique for the life of the process.
fn next_style_id() -> String {
    format!(
        "composa_styletag_{}",
        NEXT_STYLE_ID.fetch_add(1, Ordering::Relaxed)
    )
}

/// Configuration for [`use_style_tag`].
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StyleTagOptions {
    pub immediate: bool,
    pub manual: bool,
    pub media: Option<String>,
    pub nonce: Option<String>,
    /// Element id. Generated when absent.
    pub id: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub document: Option<DocumentRef>,
}

impl Default for StyleTagOptions {
    fn default() -> Self {
        Self {
            immediate: true,
            manual: false,
            media: None,
            nonce: None,
            id: None,
            document: default_document(),
        }
    }
}

impl StyleTagOptions {
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
    pub fn with_media(mut self, media: impl Into<String>) -> Self {
        self.media = Some(media.into());
        self
    }

    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_document(mut self, document: Option<DocumentRef>) -> Self {
        self.document = document;
        self
    }
}

impl fmt::Debug for StyleTagOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleTagOptions")
            .field("immediate", &self.immediate)
            .field("manual", &self.manual)
            .field("media", &self.media)
            .field("nonce", &self.nonce)
            .field("id", &self.id)
            .field("has_document", &self.document.is_some())
            .finish()
    }
}

struct StyleTagInner {
    id: String,
    css: Observable<String>,
    loaded: Observable<bool>,
    media: Option<String>,
    nonce: Option<String>,
    document: Option<DocumentRef>,
    watcher: RefCell<Option<WatchHandle>>,
}

/// Handle to an injected stylesheet. Clones share the element.
#[derive(Clone)]
pub struct StyleTag {
    inner: Rc<StyleTagInner>,
}

impl StyleTag {
    fn new(css: Observable<String>, options: StyleTagOptions) -> Self {
        Self {
            inner: Rc::new(StyleTagInner {
                id: options.id.unwrap_or_else(next_style_id),
                css,
                loaded: Observable::new(false),
                media: options.media,
                nonce: options.nonce,
                document: options.document,
                watcher: RefCell::new(None),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The stylesheet text. Writable; writes apply while loaded.
    #[must_use]
    pub fn css(&self) -> &Observable<String> {
        &self.inner.css
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.get()
    }

    /// Insert the element (reusing one with the same id) and start mirroring
    /// `css` into it. A no-op while loaded or without a document.
    pub fn load(&self) -> Result<(), HostError> {
        let Some(document) = self.inner.document.as_ref() else {
            return Ok(());
        };
        let id = &self.inner.id;

        let element = match document.element_by_id(id) {
            Some(element) => element,
            None => document.create_element("style")?,
        };

        if !element.is_connected() {
            element.set_attribute("id", id);
            if let Some(nonce) = &self.inner.nonce {
                element.set_attribute("nonce", nonce);
            }
            if let Some(media) = &self.inner.media {
                element.set_attribute("media", media);
            }
            document.append_to_head(&element)?;
            debug!(%id, "style appended");
        }

        if self.is_loaded() {
            trace!(%id, "style already loaded");
            return Ok(());
        }

        let sink = element.clone();
        let handle = watch(
            &MaybeReactive::from(&self.inner.css),
            move |css: &String| sink.set_text_content(css),
            WatchOptions::immediate(),
        );
        *self.inner.watcher.borrow_mut() = Some(handle);
        self.inner.loaded.set(true);
        Ok(())
    }

    /// Stop mirroring and remove the element. A no-op unless loaded.
    pub fn unload(&self) {
        let Some(document) = self.inner.document.as_ref() else {
            return;
        };
        if !self.is_loaded() {
            return;
        }
        if let Some(watcher) = self.inner.watcher.borrow_mut().take() {
            watcher.stop();
        }
        if let Some(element) = document.element_by_id(&self.inner.id) {
            debug!(id = %self.inner.id, "removing style");
            document.remove_from_head(&element);
        }
        self.inner.loaded.set(false);
    }
}

impl fmt::Debug for StyleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleTag")
            .field("id", &self.inner.id)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Inject `<style>` into the document head, kept in sync with `css`.
///
/// A plain string is wrapped in a fresh observable; pass an
/// [`Observable`] to share one. Unless `manual` is set, the style loads when
/// the current component mounts and is removed when the current scope is
/// disposed.
pub fn use_style_tag(css: impl Into<MaybeReactive<String>>, options: StyleTagOptions) -> StyleTag {
    let immediate = options.immediate;
    let manual = options.manual;
    let tag = StyleTag::new(css.into().into_observable(), options);

    if immediate && !manual {
        let mounted = tag.clone();
        try_on_mounted(move || {
            if let Err(err) = mounted.load() {
                warn!(id = %mounted.id(), error = %err, "style load failed");
            }
        });
    }
    if !manual {
        let disposed = tag.clone();
        try_on_scope_dispose(move || disposed.unload());
    }
    tag
}
