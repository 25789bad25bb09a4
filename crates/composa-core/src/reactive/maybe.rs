#![forbid(unsafe_code)]

//! Arguments that may be a plain value or a live [`Observable`].

use std::fmt;

use super::observable::{Observable, Subscription};

/// A value that is either fixed at construction or read from an observable.
///
/// Composables accept `impl Into<MaybeReactive<T>>` so callers can pass a
/// literal where nothing ever changes and an observable where it does.
pub enum MaybeReactive<T> {
    Static(T),
    Observable(Observable<T>),
}

impl<T: Clone + PartialEq + 'static> MaybeReactive<T> {
    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        match self {
            Self::Static(value) => value.clone(),
            Self::Observable(obs) => obs.get(),
        }
    }

    /// Subscribe to changes. Static values never change, so they yield `None`.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Option<Subscription> {
        match self {
            Self::Static(_) => None,
            Self::Observable(obs) => Some(obs.subscribe(callback)),
        }
    }

    /// The backing observable, if any.
    #[must_use]
    pub fn as_observable(&self) -> Option<&Observable<T>> {
        match self {
            Self::Static(_) => None,
            Self::Observable(obs) => Some(obs),
        }
    }

    /// Reuse the backing observable, or wrap a static value in a fresh one.
    #[must_use]
    pub fn into_observable(self) -> Observable<T> {
        match self {
            Self::Static(value) => Observable::new(value),
            Self::Observable(obs) => obs,
        }
    }

    #[must_use]
    pub fn is_reactive(&self) -> bool {
        matches!(self, Self::Observable(_))
    }
}

impl<T: Clone> Clone for MaybeReactive<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Static(value) => Self::Static(value.clone()),
            Self::Observable(obs) => Self::Observable(obs.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MaybeReactive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Observable(obs) => f.debug_tuple("Observable").field(obs).finish(),
        }
    }
}

impl<T: Default> Default for MaybeReactive<T> {
    fn default() -> Self {
        Self::Static(T::default())
    }
}

impl<T> From<T> for MaybeReactive<T> {
    fn from(value: T) -> Self {
        Self::Static(value)
    }
}

impl<T> From<Observable<T>> for MaybeReactive<T> {
    fn from(obs: Observable<T>) -> Self {
        Self::Observable(obs)
    }
}

impl<T> From<&Observable<T>> for MaybeReactive<T> {
    fn from(obs: &Observable<T>) -> Self {
        Self::Observable(obs.clone())
    }
}

impl From<&str> for MaybeReactive<String> {
    fn from(value: &str) -> Self {
        Self::Static(value.to_owned())
    }
}
