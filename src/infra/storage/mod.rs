//! Document store drivers and backend selection.

pub mod blob;
pub mod disk;

use std::sync::Arc;

use tracing::info;

use crate::application::{error::StorageError, repos::DocumentStore};
use crate::config::{StorageBackend, StorageSettings};

pub use blob::BlobStore;
pub use disk::DiskStore;

/// Build the driver selected by configuration.
///
/// Blob credentials are not checked here; a missing or invalid connection
/// string surfaces on the first storage operation.
pub fn connect(settings: &StorageSettings) -> Result<Arc<dyn DocumentStore>, StorageError> {
    let store: Arc<dyn DocumentStore> = match settings.backend {
        StorageBackend::Disk => Arc::new(DiskStore::new(&settings.posts_directory)),
        StorageBackend::Blob => Arc::new(BlobStore::new(
            settings.blob_connection_string.clone(),
            settings.blob_container.clone(),
        )?),
    };

    info!(
        backend = settings.backend.as_str(),
        location = %store.describe(),
        "storage backend selected"
    );
    Ok(store)
}
