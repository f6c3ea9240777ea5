//! Blog posts and the comments attached to them.

use serde::Serialize;
use time::{OffsetDateTime, macros::datetime};
use uuid::Uuid;

use super::slug::derive_slug;

/// Publish date assigned to comments whose stored date is missing or unreadable.
pub const COMMENT_DATE_SENTINEL: OffsetDateTime = datetime!(2000-01-01 0:00 UTC);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    /// Storage key of the post; never changes once assigned.
    pub id: String,
    pub title: String,
    pub author: String,
    pub slug: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub pub_date: OffsetDateTime,
    /// Stamped by the document codec on every save.
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    pub is_published: bool,
    pub categories: Vec<String>,
    pub comments: Vec<Comment>,
}

impl Post {
    /// Create an unsaved, published post with a fresh identifier.
    ///
    /// The slug is derived from the title; titles that cannot produce a slug
    /// fall back to the identifier.
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        let title = title.into();
        let slug = derive_slug(&title).unwrap_or_else(|_| id.clone());
        let now = now_to_the_second();

        Self {
            id,
            title,
            author: author.into(),
            slug,
            content: content.into(),
            pub_date: now,
            last_modified: now,
            is_published: true,
            categories: Vec::new(),
            comments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub email: String,
    pub website: String,
    pub ip: String,
    pub user_agent: String,
    /// Newlines become `<br />` when read back from storage.
    pub content: String,
    pub is_admin: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub pub_date: OffsetDateTime,
}

impl Comment {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            author: author.into(),
            email: String::new(),
            website: String::new(),
            ip: String::new(),
            user_agent: String::new(),
            content: content.into(),
            is_admin: false,
            pub_date: now_to_the_second(),
        }
    }
}

/// Current UTC time truncated to whole seconds, the precision documents store.
pub(crate) fn now_to_the_second() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}
