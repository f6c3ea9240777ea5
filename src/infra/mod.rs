//! Infrastructure adapters and runtime bootstrap.

pub mod document;
pub mod error;
pub mod storage;
pub mod telemetry;
