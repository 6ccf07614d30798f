//! Infrastructure: process-level plumbing behind the application seams.
//!
//! Telemetry installation, the in-process cache backend, and connection
//! management for the source-of-truth store.

pub mod error;
pub mod memory;
pub mod pool;
pub mod telemetry;

pub use error::InfraError;
pub use memory::MemoryBackend;
pub use pool::{ConnectionManager, PoolGuard, PoolSettings};
