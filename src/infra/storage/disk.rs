//! Filesystem document store: one `<key>.xml` file per post in a flat directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::application::error::StorageError;
use crate::application::repos::{DocumentStore, RawDocument, validate_key};
use crate::infra::document::{document_key, document_name};

#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Store rooted at `root`. The directory is created on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(document_name(key)))
    }

    async fn ensure_root(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|err| io_failure("creating posts directory", &self.root, err))
    }
}

#[async_trait]
impl DocumentStore for DiskStore {
    async fn list(&self) -> Result<Vec<RawDocument>, StorageError> {
        self.ensure_root().await?;

        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|err| io_failure("listing posts directory", &self.root, err))?;
        let mut documents = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| io_failure("listing posts directory", &self.root, err))?
        {
            let path = entry.path();
            let file_name = entry.file_name();
            let Some(key) = file_name.to_str().and_then(document_key) else {
                continue;
            };
            if validate_key(key).is_err() {
                debug!(file = %path.display(), "skipping file outside the flat document namespace");
                continue;
            }

            match fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => {}
                Ok(_) => continue,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(io_failure("inspecting", &path, err)),
            }

            match fs::read(&path).await {
                Ok(body) => documents.push(RawDocument::new(key, body)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!(key, "document removed while listing");
                }
                Err(err) => return Err(io_failure("reading", &path, err)),
            }
        }

        Ok(documents)
    }

    async fn read(&self, key: &str) -> Result<RawDocument, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(body) => Ok(RawDocument::new(key, body)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(key))
            }
            Err(err) => Err(io_failure("reading", &path, err)),
        }
    }

    async fn write(&self, key: &str, text: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        self.ensure_root().await?;

        // Readers must never see a half-written document.
        let staging = self
            .root
            .join(format!(".{}.{}.tmp", document_name(key), Uuid::new_v4().simple()));
        if let Err(err) = fs::write(&staging, text.as_bytes()).await {
            let _ = fs::remove_file(&staging).await;
            return Err(io_failure("writing", &staging, err));
        }
        if let Err(err) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(io_failure("replacing", &path, err));
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_failure("deleting", &path, err)),
        }
    }

    fn describe(&self) -> String {
        format!("directory `{}`", self.root.display())
    }
}

fn io_failure(action: &str, path: &Path, err: std::io::Error) -> StorageError {
    StorageError::unavailable_with(format!("{action} `{}`", path.display()), err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, DiskStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DiskStore::new(dir.path().join("posts"));
        (dir, store)
    }

    #[tokio::test]
    async fn list_creates_missing_directory() {
        let (_dir, store) = store();
        assert!(!store.root().exists());

        let documents = store.list().await.expect("list");

        assert!(documents.is_empty());
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn write_then_read_returns_same_text() {
        let (_dir, store) = store();
        store.write("p1", "<post/>").await.expect("write");

        let document = store.read("p1").await.expect("read");
        assert_eq!(document.key, "p1");
        assert_eq!(document.text().expect("utf-8"), "<post/>");
        assert!(store.root().join("p1.xml").is_file());
    }

    #[tokio::test]
    async fn write_overwrites_and_is_idempotent() {
        let (_dir, store) = store();
        store.write("p1", "<post>1</post>").await.expect("write");
        store.write("p1", "<post>2</post>").await.expect("write");
        store.write("p1", "<post>2</post>").await.expect("write");

        let documents = store.list().await.expect("list");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].text().expect("utf-8"), "<post>2</post>");
    }

    #[tokio::test]
    async fn list_only_returns_xml_files() {
        let (_dir, store) = store();
        store.write("p1", "<post/>").await.expect("write");
        std::fs::write(store.root().join("notes.txt"), "ignore").expect("write txt");
        std::fs::create_dir(store.root().join("nested.xml")).expect("mkdir");

        let keys: Vec<_> = store
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|document| document.key)
            .collect();
        assert_eq!(keys, ["p1"]);
    }

    #[tokio::test]
    async fn read_missing_key_is_not_found() {
        let (_dir, store) = store();
        let error = store.read("missing").await.expect_err("not found");
        assert!(matches!(error, StorageError::NotFound { key } if key == "missing"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, store) = store();
        store.write("p1", "<post/>").await.expect("write");

        store.delete("p1").await.expect("first delete");
        store.delete("p1").await.expect("second delete");

        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn dotted_keys_round_trip_through_every_operation() {
        let (_dir, store) = store();
        store.write("p1", "<post/>").await.expect("write p1");
        std::fs::write(store.root().join("release..notes.xml"), "<post>1</post>")
            .expect("seed dotted file");
        std::fs::write(store.root().join("...xml"), "<post/>").expect("seed dot-dot file");

        let mut keys: Vec<_> = store
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|document| document.key)
            .collect();
        keys.sort();
        assert_eq!(keys, ["p1", "release..notes"]);

        store
            .write("release..notes", "<post>2</post>")
            .await
            .expect("overwrite");
        let document = store.read("release..notes").await.expect("read");
        assert_eq!(document.text().expect("utf-8"), "<post>2</post>");

        store.delete("release..notes").await.expect("delete");
        store.delete("release..notes").await.expect("delete again");
        assert!(!store.root().join("release..notes.xml").exists());
    }

    #[tokio::test]
    async fn path_like_keys_are_rejected() {
        let (_dir, store) = store();
        let error = store
            .write("../escape", "<post/>")
            .await
            .expect_err("invalid key");
        assert!(matches!(error, StorageError::InvalidKey { .. }));
    }
}
