use thiserror::Error;

pub type Result<T> = std::result::Result<T, ComposeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("{what} is read-only")]
    ReadOnly { what: &'static str },

    #[error("scope {scope_id} is already disposed")]
    ScopeDisposed { scope_id: u64 },
}

impl ComposeError {
    #[must_use]
    pub fn read_only(what: &'static str) -> Self {
        Self::ReadOnly { what }
    }
}
