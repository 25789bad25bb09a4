#![forbid(unsafe_code)]

//! Core: reactive values, watchers, and lifecycle scopes.
//!
//! Everything in this crate is single-threaded (`Rc`/`RefCell`). Host
//! frameworks plug their component lifecycle in through
//! [`scope::HookRegistrar`]; the built-in [`scope::Scope`] covers native use
//! and tests.

pub mod error;
pub mod reactive;
pub mod scope;

pub use error::{ComposeError, Result};
