#![forbid(unsafe_code)]

//! Composa public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub mod prelude {
    pub use composa_core as core;
    pub use composa_dom as dom;
    #[cfg(feature = "use")]
    pub use composa_use as composables;

    pub use composa_core::reactive::{MaybeReactive, Observable, WatchOptions, watch};
    pub use composa_core::scope::Scope;
    pub use composa_dom::{DocumentRef, Element, WindowRef};
    #[cfg(feature = "use")]
    pub use composa_use::{
        CaseMethod, ChangeCaseOptions, OnClickOutsideOptions, ScriptTagOptions, StyleTagOptions,
        on_click_outside, use_change_case, use_script_tag, use_style_tag,
    };
}
