//! Adapters for the domain ports: storage, provider transport, notifications.

pub mod in_memory;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sandbox;
pub mod token_cache;
