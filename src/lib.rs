//! Blog post persistence: an XML document codec, interchangeable disk and
//! blob-storage backends, and an in-process cache kept coherent with every
//! mutation.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
