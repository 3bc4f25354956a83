//! Core library for a Redis-protocol-compatible proxy that stores Redis
//! data types on an arbitrary ordered KV engine, with an optional secondary
//! Redis instance as a mirrored store for hot encoding-v1 keys.

pub mod client;
pub mod commander;
pub mod config;
pub mod error;
pub mod keys;
pub mod kv;
pub mod lru_cache;
pub mod metadata;
pub mod objects;
pub mod resp;
pub mod sentinel;
pub mod server;
pub mod storage_redis;
pub mod types;
pub mod write_buffer;

pub use client::ClientState;
pub use commander::{dispatch, ProxyContext};
pub use config::ProxyConfig;
pub use error::{ProxyError, ProxyResult};
pub use keys::KeyDesign;
pub use kv::{KvEngine, MemoryKvEngine, RocksDbKvEngine};
pub use metadata::{KeyMeta, KvMetadataStore, MetadataStore};
pub use resp::{Command, Reply};
