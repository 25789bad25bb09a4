#![forbid(unsafe_code)]

//! Host document abstraction for Composa.
//!
//! Composables only see the traits in this crate: [`HostDocument`] for
//! element creation, lookup, and `<head>` management, [`HostWindow`] for
//! window listeners and deferred tasks, and [`HostElement`] behind the shared
//! [`Element`] handle. Two backends ship with it:
//!
//! - [`memory`]: a deterministic in-memory document for native use and tests.
//! - `web` (wasm32 only): the browser DOM through `web-sys`.
//!
//! A missing document is represented by `None` rather than an error; every
//! composable treats it as "nothing to do".

pub mod document;
pub mod element;
pub mod error;
pub mod event;
pub mod memory;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use document::{
    DocumentRef, HostDocument, HostWindow, Query, WindowRef, default_document, default_window,
};
pub use element::{Element, HostElement};
pub use error::{HostError, Result};
pub use event::{
    DomEvent, EventTarget, Listener, ListenerId, ListenerOptions, ListenerStop, use_event_listener,
};
