#![forbid(unsafe_code)]

//! Composables over the host document.
//!
//! - [`script_tag`]: inject a `<script>` once and await its readiness.
//! - [`style_tag`]: keep a `<style>` element in sync with a CSS observable.
//! - [`click_outside`] and [`directive`]: react to clicks outside an element.
//! - [`change_case`]: reactive case conversion.
//!
//! Loaders bind themselves to the current component through
//! [`composa_core::scope`] unless created with `manual: true`.

pub mod change_case;
pub mod click_outside;
pub mod deferred;
pub mod directive;
pub mod error;
pub mod script_tag;
pub mod style_tag;

pub use change_case::{
    CaseMethod, ChangeCase, ChangeCaseOptions, ParseCaseMethodError, use_change_case,
};
pub use click_outside::{
    ClickOutside, ClickOutsideHandler, ClickTarget, IgnoreTarget, OnClickOutsideOptions,
    on_click_outside,
};
pub use deferred::Deferred;
pub use directive::{ClickOutsideBinding, DirectiveBinding, ElementDirective, VOnClickOutside};
pub use error::ScriptLoadError;
pub use script_tag::{
    CrossOrigin, LoadOutcome, PendingLoad, ReferrerPolicy, ScriptTag, ScriptTagOptions,
    use_script_tag,
};
pub use style_tag::{StyleTag, StyleTagOptions, use_style_tag};
