use std::error::Error as StdError;

use thiserror::Error;

use crate::{infra::document::DocumentError, infra::error::InfraError};

type BoxedSource = Box<dyn StdError + Send + Sync>;

/// Failures surfaced by storage drivers and the post storage facade.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("document `{key}` not found")]
    NotFound { key: String },
    #[error("document `{key}` could not be decoded: {source}")]
    Format {
        key: String,
        #[source]
        source: DocumentError,
    },
    #[error("post `{key}` could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: DocumentError,
    },
    #[error("storage misconfigured: {message}")]
    Configuration { message: String },
    #[error("storage backend unavailable: {message}")]
    BackendUnavailable {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
    #[error("`{key}` cannot be used as a document key")]
    InvalidKey { key: String },
}

impl StorageError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn format(key: impl Into<String>, source: DocumentError) -> Self {
        Self::Format {
            key: key.into(),
            source,
        }
    }

    pub fn encode(key: impl Into<String>, source: DocumentError) -> Self {
        Self::Encode {
            key: key.into(),
            source,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn unavailable_with(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Top-level error reported by the `blogstore` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("post `{0}` not found")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Every message in the error's source chain, outermost first.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = self.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_walk_the_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = AppError::from(StorageError::unavailable_with("writing `p1.xml`", io));

        assert_eq!(
            error.messages(),
            vec![
                "storage backend unavailable: writing `p1.xml`".to_string(),
                "denied".to_string(),
            ]
        );
    }

    #[test]
    fn encode_and_decode_failures_read_differently() {
        let encode = StorageError::encode("p1", DocumentError::MissingRoot);
        let decode = StorageError::format("p1", DocumentError::MissingRoot);

        assert_eq!(
            encode.to_string(),
            "post `p1` could not be encoded: document has no root element"
        );
        assert_eq!(
            decode.to_string(),
            "document `p1` could not be decoded: document has no root element"
        );
    }
}
