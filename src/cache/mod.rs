//! Post cache.
//!
//! Holds the full post collection in memory once it has been read from the
//! active backend. The storage facade keeps it coherent with every save and
//! delete instead of reloading from the backend.

mod lock;
mod store;

pub use store::PostCache;
