use thiserror::Error;

pub type Result<T> = std::result::Result<T, HostError>;

/// A host document operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("document has no <head>")]
    MissingHead,

    #[error("element belongs to a different backend")]
    ForeignElement,

    #[error("host call `{operation}` failed: {message}")]
    Call {
        operation: &'static str,
        message: String,
    },
}

impl HostError {
    #[must_use]
    pub fn call(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Call {
            operation,
            message: message.into(),
        }
    }
}
