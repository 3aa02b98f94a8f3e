//! Store backends implementing the `KeyValueStore` port.
//!
//! The in-memory store is always available; the Redis store is compiled in
//! with the `storage-redis` feature.

pub mod in_memory;
#[cfg(feature = "storage-redis")]
pub mod redis;
