//! Error types for the omnisearch crate.
//!
//! Rate limiting is deliberately absent: a rate-limited source yields an
//! empty result list, never an error. Messages never include query text.

/// Errors that can occur while orchestrating source searches.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The requested source id is not registered.
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// The requested source is registered but disabled.
    #[error("source disabled: {0}")]
    SourceDisabled(String),

    /// Invalid orchestrator, source, or registry file configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A search adapter failed (network, parsing, upstream rejection).
    #[error("adapter error: {0}")]
    Adapter(String),

    /// A single adapter attempt exceeded the source timeout.
    #[error("source timed out: {0}")]
    Timeout(String),

    /// The external quality scorer failed.
    #[error("scoring error: {0}")]
    Scoring(String),

    /// Reading a registry file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// Returns `true` for errors raised by the caller's configuration
    /// rather than by a source at runtime.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownSource(_) | Self::SourceDisabled(_) | Self::Config(_)
        )
    }
}

/// Convenience type alias for omnisearch results.
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_source() {
        let err = SearchError::UnknownSource("arxiv".into());
        assert_eq!(err.to_string(), "unknown source: arxiv");
    }

    #[test]
    fn display_source_disabled() {
        let err = SearchError::SourceDisabled("pubmed".into());
        assert_eq!(err.to_string(), "source disabled: pubmed");
    }

    #[test]
    fn display_adapter() {
        let err = SearchError::Adapter("connection refused".into());
        assert_eq!(err.to_string(), "adapter error: connection refused");
    }

    #[test]
    fn display_timeout() {
        let err = SearchError::Timeout("news exceeded 5000ms".into());
        assert_eq!(err.to_string(), "source timed out: news exceeded 5000ms");
    }

    #[test]
    fn display_scoring() {
        let err = SearchError::Scoring("model unavailable".into());
        assert_eq!(err.to_string(), "scoring error: model unavailable");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SearchError = io.into();
        assert!(err.to_string().starts_with("I/O error"));
    }

    #[test]
    fn configuration_classification() {
        assert!(SearchError::UnknownSource("x".into()).is_configuration());
        assert!(SearchError::SourceDisabled("x".into()).is_configuration());
        assert!(SearchError::Config("x".into()).is_configuration());
        assert!(!SearchError::Adapter("x".into()).is_configuration());
        assert!(!SearchError::Timeout("x".into()).is_configuration());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchError>();
    }
}
