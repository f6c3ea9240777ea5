//! Storage driver contract shared by the filesystem and blob backends.

use async_trait::async_trait;
use bytes::Bytes;

use crate::application::error::StorageError;
use crate::infra::document::DocumentError;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// A stored document as handed back by a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Document key: the post identifier, without extension.
    pub key: String,
    pub body: Bytes,
}

impl RawDocument {
    pub fn new(key: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            body: body.into(),
        }
    }

    /// Codec-ready text: validated UTF-8 with any leading byte-order mark removed.
    pub fn text(&self) -> Result<&str, DocumentError> {
        let text = std::str::from_utf8(&self.body)?;
        Ok(text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(text))
    }
}

/// Document persistence backend.
///
/// Keys are post identifiers; drivers map them to their own naming (for
/// example `<key>.xml`). Writes overwrite and deletes of absent keys succeed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every stored document, in no particular order.
    async fn list(&self) -> Result<Vec<RawDocument>, StorageError>;

    /// A single document; [`StorageError::NotFound`] when absent.
    async fn read(&self, key: &str) -> Result<RawDocument, StorageError>;

    async fn write(&self, key: &str, text: &str) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Human-readable location used in log output.
    fn describe(&self) -> String;
}

/// Reject keys that cannot safely name a flat document.
///
/// Dots are allowed anywhere except as the whole key; separators are what
/// would let a key leave the document namespace.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.trim().is_empty()
        || matches!(key, "." | "..")
        || key.contains(['/', '\\'])
        || key.chars().any(char::is_control);

    if invalid {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}
