//! In-process post list.

use std::sync::{Arc, RwLock};

use crate::domain::posts::Post;

use super::lock::{rw_read, rw_write};

/// Lazily populated list of every post, newest `pub_date` first.
///
/// Readers receive a shared snapshot; mutations copy-on-write so a snapshot
/// handed out earlier never changes underneath its holder. Entries are unique
/// by post id.
#[derive(Debug, Default)]
pub struct PostCache {
    posts: RwLock<Option<Arc<Vec<Post>>>>,
}

impl PostCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current list, or `None` before the first population.
    pub fn snapshot(&self) -> Option<Arc<Vec<Post>>> {
        rw_read(&self.posts, "snapshot").clone()
    }

    pub fn is_populated(&self) -> bool {
        rw_read(&self.posts, "is_populated").is_some()
    }

    /// Number of cached posts; zero when unpopulated.
    pub fn len(&self) -> usize {
        rw_read(&self.posts, "len")
            .as_ref()
            .map_or(0, |posts| posts.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Populate the cache from a fresh backend listing.
    ///
    /// If another loader populated the cache first, its list is kept and
    /// returned instead. Duplicate ids keep their first occurrence.
    pub fn fill(&self, mut posts: Vec<Post>) -> Arc<Vec<Post>> {
        let mut guard = rw_write(&self.posts, "fill");
        if let Some(existing) = guard.as_ref() {
            return Arc::clone(existing);
        }

        let mut seen = std::collections::HashSet::new();
        posts.retain(|post| seen.insert(post.id.clone()));
        sort_newest_first(&mut posts);

        let posts = Arc::new(posts);
        *guard = Some(Arc::clone(&posts));
        posts
    }

    /// Insert or replace `post` by id, keeping the list sorted.
    ///
    /// Does nothing while the cache is unpopulated; the next population reads
    /// the post from the backend.
    ///
    /// The post is cached exactly as saved. Comment newlines only become
    /// `<br />` when a document is decoded, so a saved post and the same post
    /// loaded from storage can differ there until the cache is repopulated.
    pub fn upsert(&self, post: Post) {
        let mut guard = rw_write(&self.posts, "upsert");
        let Some(current) = guard.as_mut() else {
            return;
        };
        let posts = Arc::make_mut(current);

        match posts.iter().position(|existing| existing.id == post.id) {
            Some(index) => {
                let moved = posts[index].pub_date != post.pub_date;
                posts[index] = post;
                if moved {
                    sort_newest_first(posts);
                }
            }
            None => {
                posts.insert(0, post);
                sort_newest_first(posts);
            }
        }
    }

    /// Evict the post with `id`; returns whether an entry was removed.
    pub fn remove(&self, id: &str) -> bool {
        let mut guard = rw_write(&self.posts, "remove");
        let Some(current) = guard.as_mut() else {
            return false;
        };

        match current.iter().position(|existing| existing.id == id) {
            Some(index) => {
                Arc::make_mut(current).remove(index);
                true
            }
            None => false,
        }
    }
}

fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|left, right| right.pub_date.cmp(&left.pub_date));
}
