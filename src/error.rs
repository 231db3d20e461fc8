//! Error kinds surfaced by the ingestion and query pipeline.
//!
//! Every library operation returns [`Result<T>`](Result). The variants map
//! one-to-one onto the failure classes a caller has to tell apart:
//!
//! | Variant | Raised by |
//! |---------|-----------|
//! | [`UnsupportedFormat`](QaError::UnsupportedFormat) | unknown document type |
//! | [`DocumentLoad`](QaError::DocumentLoad) | corrupt or unreadable document content |
//! | [`EmbeddingService`](QaError::EmbeddingService) | embedding call failed |
//! | [`Generation`](QaError::Generation) | chat-completion call failed |
//! | [`Configuration`](QaError::Configuration) | missing credential or invalid config |
//! | [`Index`](QaError::Index) | local index storage failure |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QaError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to load document '{name}': {reason}")]
    DocumentLoad { name: String, reason: String },

    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("index storage error: {0}")]
    Index(String),
}

pub type Result<T> = std::result::Result<T, QaError>;

impl QaError {
    pub(crate) fn load(name: &str, reason: impl std::fmt::Display) -> Self {
        QaError::DocumentLoad {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for failures caused by configuration rather than by a call
    /// that went wrong at runtime.
    pub fn is_configuration(&self) -> bool {
        matches!(self, QaError::Configuration(_))
    }
}

impl From<sqlx::Error> for QaError {
    fn from(e: sqlx::Error) -> Self {
        QaError::Index(e.to_string())
    }
}

impl From<std::io::Error> for QaError {
    fn from(e: std::io::Error) -> Self {
        QaError::Index(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_document_name() {
        let err = QaError::load("policy.pdf", "bad xref table");
        assert_eq!(
            err.to_string(),
            "failed to load document 'policy.pdf': bad xref table"
        );
    }

    #[test]
    fn test_configuration_is_distinct_from_service_errors() {
        assert!(QaError::Configuration("OPENAI_API_KEY not set".into()).is_configuration());
        assert!(!QaError::EmbeddingService("429".into()).is_configuration());
        assert!(!QaError::Generation("timeout".into()).is_configuration());
    }
}
