#![forbid(unsafe_code)]

//! Lifecycle scopes and the hook registrar seam.
//!
//! Composables never talk to a UI framework directly. They ask for the
//! *current* [`HookRegistrar`] (set by [`Scope::run`] or [`with_registrar`])
//! and register `load`/`unload` style callbacks against it:
//!
//! - [`try_on_mounted`]: run on mount inside a component, immediately
//!   otherwise.
//! - [`try_on_unmounted`]: run on unmount inside a component, never otherwise.
//! - [`try_on_scope_dispose`]: run when the current scope is disposed.
//!
//! A host framework supplies its own registrar by implementing the trait and
//! calling [`with_registrar`] around component setup. [`Scope`] is the
//! built-in implementation.
//!
//! # Invariants
//!
//! 1. Mounted hooks run at most once, in registration order.
//! 2. `dispose()` runs scope-dispose hooks, then unmounted hooks (the latter
//!    only for a mounted component), each at most once.
//! 3. Hooks registered after disposal run immediately.
//! 4. Mounted hooks run with their scope current.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::error::{ComposeError, Result};

/// A deferred lifecycle callback.
pub type Hook = Box<dyn FnOnce()>;

/// Receives lifecycle callbacks on behalf of the owning component or scope.
pub trait HookRegistrar {
    /// Whether this registrar belongs to a component that will be mounted.
    /// Plain effect scopes return `false`.
    fn is_component(&self) -> bool;

    fn on_mounted(&self, hook: Hook);

    fn on_unmounted(&self, hook: Hook);

    fn on_scope_dispose(&self, hook: Hook);
}

thread_local! {
    static REGISTRAR_STACK: RefCell<Vec<Rc<dyn HookRegistrar>>> = const { RefCell::new(Vec::new()) };
}

/// Pops the registrar pushed by [`with_registrar`], even if `f` unwinds.
struct RegistrarGuard;

impl Drop for RegistrarGuard {
    fn drop(&mut self) {
        REGISTRAR_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Make `registrar` current while `f` runs.
pub fn with_registrar<R>(registrar: Rc<dyn HookRegistrar>, f: impl FnOnce() -> R) -> R {
    REGISTRAR_STACK.with(|stack| stack.borrow_mut().push(registrar));
    let _guard = RegistrarGuard;
    f()
}

/// The innermost current registrar, if any.
#[must_use]
pub fn current_registrar() -> Option<Rc<dyn HookRegistrar>> {
    REGISTRAR_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Run `hook` when the current component mounts, or right now when there is
/// no current component.
pub fn try_on_mounted(hook: impl FnOnce() + 'static) {
    match current_registrar() {
        Some(registrar) if registrar.is_component() => registrar.on_mounted(Box::new(hook)),
        _ => hook(),
    }
}

/// Run `hook` when the current component unmounts. Without a current
/// component this does nothing.
pub fn try_on_unmounted(hook: impl FnOnce() + 'static) {
    if let Some(registrar) = current_registrar() {
        if registrar.is_component() {
            registrar.on_unmounted(Box::new(hook));
        }
    }
}

/// Run `hook` when the current scope is disposed. Returns `false` (and drops
/// the hook) when no scope is current.
pub fn try_on_scope_dispose(hook: impl FnOnce() + 'static) -> bool {
    match current_registrar() {
        Some(registrar) => {
            registrar.on_scope_dispose(Box::new(hook));
            true
        }
        None => false,
    }
}

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

fn next_scope_id() -> u64 {
    NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Component,
    Detached,
}

#[derive(Default)]
struct ScopeState {
    mounted: bool,
    disposed: bool,
    mounted_hooks: Vec<Hook>,
    unmounted_hooks: Vec<Hook>,
    dispose_hooks: Vec<Hook>,
}

struct ScopeInner {
    id: u64,
    kind: ScopeKind,
    state: RefCell<ScopeState>,
}

/// Built-in [`HookRegistrar`].
///
/// A component scope collects mounted/unmounted hooks and is driven by
/// [`mount`](Scope::mount) and [`dispose`](Scope::dispose). A detached scope
/// only collects dispose hooks, like an effect scope.
///
/// Cloning a `Scope` creates a new handle to the same scope.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("mounted", &state.mounted)
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl Scope {
    fn with_kind(kind: ScopeKind) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                id: next_scope_id(),
                kind,
                state: RefCell::new(ScopeState::default()),
            }),
        }
    }

    /// A scope standing in for a component instance.
    #[must_use]
    pub fn component() -> Self {
        Self::with_kind(ScopeKind::Component)
    }

    /// A scope with no mount phase.
    #[must_use]
    pub fn detached() -> Self {
        Self::with_kind(ScopeKind::Detached)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.inner.state.borrow().mounted
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.state.borrow().disposed
    }

    /// Run `f` with this scope as the current registrar.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        if self.is_disposed() {
            return Err(ComposeError::ScopeDisposed {
                scope_id: self.inner.id,
            });
        }
        Ok(with_registrar(Rc::new(self.clone()), f))
    }

    /// Run the mounted hooks with this scope current, so effects they create
    /// are released by [`dispose`](Self::dispose). Later calls do nothing.
    pub fn mount(&self) {
        let hooks = {
            let mut state = self.inner.state.borrow_mut();
            if state.mounted || state.disposed {
                return;
            }
            state.mounted = true;
            std::mem::take(&mut state.mounted_hooks)
        };
        debug!(scope_id = self.inner.id, hooks = hooks.len(), "scope mounted");
        with_registrar(Rc::new(self.clone()), || {
            for hook in hooks {
                hook();
            }
        });
    }

    /// Run dispose hooks, then unmounted hooks. Later calls do nothing.
    pub fn dispose(&self) {
        let (dispose_hooks, unmounted_hooks) = {
            let mut state = self.inner.state.borrow_mut();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.mounted_hooks.clear();
            let unmounted = if state.mounted {
                std::mem::take(&mut state.unmounted_hooks)
            } else {
                state.unmounted_hooks.clear();
                Vec::new()
            };
            (std::mem::take(&mut state.dispose_hooks), unmounted)
        };
        debug!(
            scope_id = self.inner.id,
            dispose_hooks = dispose_hooks.len(),
            unmounted_hooks = unmounted_hooks.len(),
            "scope disposed"
        );
        for hook in dispose_hooks.into_iter().chain(unmounted_hooks) {
            hook();
        }
    }

    /// Queue `hook` unless the scope is past the point where it would run, in
    /// which case it is handed back.
    fn enqueue(&self, hook: Hook, pick: impl FnOnce(&mut ScopeState) -> Option<&mut Vec<Hook>>) -> Option<Hook> {
        let mut state = self.inner.state.borrow_mut();
        match pick(&mut state) {
            Some(queue) => {
                queue.push(hook);
                None
            }
            None => Some(hook),
        }
    }
}

impl HookRegistrar for Scope {
    fn is_component(&self) -> bool {
        self.inner.kind == ScopeKind::Component
    }

    fn on_mounted(&self, hook: Hook) {
        let late = self.enqueue(hook, |state| {
            (!state.mounted && !state.disposed).then_some(&mut state.mounted_hooks)
        });
        if let Some(hook) = late {
            if self.is_mounted() && !self.is_disposed() {
                trace!(scope_id = self.inner.id, "late mounted hook runs now");
                hook();
            }
        }
    }

    fn on_unmounted(&self, hook: Hook) {
        let late = self.enqueue(hook, |state| {
            (!state.disposed).then_some(&mut state.unmounted_hooks)
        });
        if let Some(hook) = late {
            hook();
        }
    }

    fn on_scope_dispose(&self, hook: Hook) {
        let late = self.enqueue(hook, |state| {
            (!state.disposed).then_some(&mut state.dispose_hooks)
        });
        if let Some(hook) = late {
            trace!(scope_id = self.inner.id, "dispose hook on disposed scope runs now");
            hook();
        }
    }
}
