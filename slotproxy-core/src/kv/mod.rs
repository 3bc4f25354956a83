//! The ordered KV engine interface (spec.md §6) that the rest of the core
//! is built against. Every call is slot-scoped so an implementation may
//! route a call to a backend shard; the engines shipped here are
//! single-shard and ignore the slot beyond folding it into the key via
//! `KeyDesign`.

pub mod mem_engine;
pub mod rocksdb_engine;

use crate::error::ProxyResult;
use crate::types::Sort;
use async_trait::async_trait;
use bytes::Bytes;

pub use mem_engine::MemoryKvEngine;
pub use rocksdb_engine::RocksDbKvEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Bytes,
    pub value: Bytes,
}

#[async_trait]
pub trait KvEngine: Send + Sync {
    async fn get(&self, slot: u16, key: &[u8]) -> ProxyResult<Option<Bytes>>;
    async fn put(&self, slot: u16, key: &[u8], value: Bytes) -> ProxyResult<()>;
    async fn delete(&self, slot: u16, key: &[u8]) -> ProxyResult<()>;

    async fn batch_get(&self, slot: u16, keys: &[Bytes]) -> ProxyResult<Vec<Option<Bytes>>>;
    async fn batch_put(&self, slot: u16, entries: &[(Bytes, Bytes)]) -> ProxyResult<()>;
    async fn batch_delete(&self, slot: u16, keys: &[Bytes]) -> ProxyResult<()>;

    /// Forward (or, if `sort == Desc`, reverse) prefix scan bounded by
    /// `start_key`, returning up to `limit` pairs whose key starts with
    /// `prefix`. `include_start` controls whether `start_key` itself may be
    /// returned.
    async fn scan_by_prefix(
        &self,
        slot: u16,
        start_key: &[u8],
        prefix: &[u8],
        limit: usize,
        sort: Sort,
        include_start: bool,
    ) -> ProxyResult<Vec<KeyValue>>;

    /// Scan bounded on both ends: `[start_key, end_key)` forward, or the
    /// mirror image in reverse, filtered additionally to `prefix`.
    async fn scan_by_start_end(
        &self,
        slot: u16,
        start_key: &[u8],
        end_key: &[u8],
        prefix: &[u8],
        limit: usize,
        sort: Sort,
        include_start: bool,
    ) -> ProxyResult<Vec<KeyValue>>;

    fn supports_reverse_scan(&self) -> bool;
}
