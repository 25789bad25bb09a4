use composa_dom::HostError;
use thiserror::Error;

/// Why a script load was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptLoadError {
    #[error("script {src} failed to load")]
    Errored { src: String },

    #[error("script {src} load was aborted")]
    Aborted { src: String },

    #[error(transparent)]
    Host(#[from] HostError),
}

impl ScriptLoadError {
    /// The script URL, when the failure came from the resource itself.
    #[must_use]
    pub fn src(&self) -> Option<&str> {
        match self {
            Self::Errored { src } | Self::Aborted { src } => Some(src),
            Self::Host(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_src() {
        let err = ScriptLoadError::Errored {
            src: "/app.js".into(),
        };
        assert_eq!(err.to_string(), "script /app.js failed to load");
        assert_eq!(err.src(), Some("/app.js"));

        let host = ScriptLoadError::from(HostError::MissingHead);
        assert_eq!(host.to_string(), "document has no <head>");
        assert_eq!(host.src(), None);
    }
}
