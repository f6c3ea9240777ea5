//! Post storage facade: the only entry point callers use to read and mutate posts.

use std::{sync::Arc, time::Instant};

use metrics::{counter, histogram};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::error::StorageError;
use crate::application::repos::{DocumentStore, RawDocument};
use crate::cache::PostCache;
use crate::domain::{posts::Post, slug::generate_unique_slug};
use crate::infra::document::{self, DocumentError};
use crate::infra::telemetry::{
    CACHE_HIT_TOTAL, CACHE_LOAD_MS, CACHE_MISS_TOTAL, DOCUMENTS_SKIPPED_TOTAL,
};

/// Reads go through the cache; writes go to the backend first and are then
/// mirrored into the cache.
///
/// Backend population and every mutation are serialized by one gate, so a
/// save never interleaves with an in-flight load. Readers of an already
/// populated cache never wait on the gate.
pub struct PostStorage {
    store: Arc<dyn DocumentStore>,
    cache: Arc<PostCache>,
    gate: Mutex<()>,
}

impl PostStorage {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<PostCache>) -> Self {
        Self {
            store,
            cache,
            gate: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &Arc<PostCache> {
        &self.cache
    }

    /// Every decodable post, newest `pub_date` first.
    ///
    /// The first call loads the whole backend; later calls return the cached
    /// list. Documents that fail to decode are logged and skipped.
    pub async fn get_all(&self) -> Result<Arc<Vec<Post>>, StorageError> {
        if let Some(posts) = self.cache.snapshot() {
            counter!(CACHE_HIT_TOTAL).increment(1);
            return Ok(posts);
        }

        counter!(CACHE_MISS_TOTAL).increment(1);
        let _gate = self.gate.lock().await;
        self.populate().await
    }

    /// Persist `post` under its id, stamping `last_modified`.
    ///
    /// The cache only changes once the backend write succeeded.
    pub async fn save(&self, post: &mut Post) -> Result<(), StorageError> {
        let _gate = self.gate.lock().await;
        self.persist(post).await
    }

    /// Remove `post` from the backend and the cache. Deleting an absent post succeeds.
    pub async fn delete(&self, post: &Post) -> Result<(), StorageError> {
        self.delete_by_id(&post.id).await
    }

    /// Like [`PostStorage::delete`], for callers that only hold the id.
    pub async fn delete_by_id(&self, id: &str) -> Result<(), StorageError> {
        let _gate = self.gate.lock().await;
        self.store.delete(id).await?;
        let evicted = self.cache.remove(id);
        info!(id, evicted, "post deleted");
        Ok(())
    }

    /// Read a single post straight from the backend, bypassing the cache.
    pub async fn load(&self, id: &str) -> Result<Post, StorageError> {
        let raw = self.store.read(id).await?;
        decode_document(&raw).map_err(|err| StorageError::format(id, err))
    }

    /// Create, store and return a new published post.
    pub async fn create(
        &self,
        title: impl Into<String>,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Post, StorageError> {
        self.insert(Post::new(title, author, content)).await
    }

    /// Store a post built by the caller, first making its slug unique among
    /// the stored posts.
    pub async fn insert(&self, mut post: Post) -> Result<Post, StorageError> {
        let _gate = self.gate.lock().await;
        let existing = self.populate().await?;

        let slug = generate_unique_slug(&post.slug, |candidate| {
            !existing
                .iter()
                .any(|other| other.id != post.id && other.slug == candidate)
        });
        match slug {
            Ok(slug) => post.slug = slug,
            Err(err) => {
                debug!(id = %post.id, error = %err, "falling back to id as slug");
                post.slug = post.id.clone();
            }
        }
        drop(existing);

        self.persist(&mut post).await?;
        info!(id = %post.id, slug = %post.slug, "post created");
        Ok(post)
    }

    /// Re-encode every stored post in the current document format.
    ///
    /// Legacy documents come back with their defaults written out. Returns
    /// the number of posts rewritten.
    pub async fn resave_all(&self) -> Result<usize, StorageError> {
        let _gate = self.gate.lock().await;
        let mut posts: Vec<Post> = self.populate().await?.iter().cloned().collect();

        for post in &mut posts {
            self.persist(post).await?;
        }

        info!(count = posts.len(), location = %self.store.describe(), "posts resaved");
        Ok(posts.len())
    }

    /// Load the backend into the cache unless already populated. Caller holds the gate.
    async fn populate(&self) -> Result<Arc<Vec<Post>>, StorageError> {
        if let Some(posts) = self.cache.snapshot() {
            return Ok(posts);
        }

        let started_at = Instant::now();
        let documents = self.store.list().await?;
        let listed = documents.len();

        let mut posts = Vec::with_capacity(listed);
        for raw in &documents {
            match decode_document(raw) {
                Ok(post) => posts.push(post),
                Err(err) => {
                    counter!(DOCUMENTS_SKIPPED_TOTAL).increment(1);
                    warn!(key = %raw.key, error = %err, "skipping undecodable document");
                }
            }
        }

        let posts = self.cache.fill(posts);
        histogram!(CACHE_LOAD_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        info!(
            listed,
            loaded = posts.len(),
            location = %self.store.describe(),
            "post cache populated"
        );
        Ok(posts)
    }

    async fn persist(&self, post: &mut Post) -> Result<(), StorageError> {
        let text = document::encode(post).map_err(|err| StorageError::encode(&post.id, err))?;
        self.store.write(&post.id, &text).await?;
        self.cache.upsert(post.clone());
        debug!(id = %post.id, "post saved");
        Ok(())
    }
}

fn decode_document(raw: &RawDocument) -> Result<Post, DocumentError> {
    document::decode(raw.text()?, &raw.key)
}
