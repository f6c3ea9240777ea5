//! Domain layer types.

pub mod posts;
pub mod slug;

pub use posts::{COMMENT_DATE_SENTINEL, Comment, Post};
