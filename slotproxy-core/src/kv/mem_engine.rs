//! An in-memory `KvEngine`, used by commander/tier unit tests and by
//! `slotproxy-cli`'s scratch mode so they don't need a RocksDB directory.
//! Grounded on the teacher's `iterate`/prefix-scan shape in
//! `storage_rocksdb.rs`, reimplemented over a `BTreeMap` for ordering.

use super::{KeyValue, KvEngine};
use crate::error::ProxyResult;
use crate::types::Sort;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryKvEngine {
    data: RwLock<BTreeMap<(u16, Vec<u8>), Bytes>>,
}

impl MemoryKvEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvEngine for MemoryKvEngine {
    async fn get(&self, slot: u16, key: &[u8]) -> ProxyResult<Option<Bytes>> {
        let map = self.data.read().unwrap();
        Ok(map.get(&(slot, key.to_vec())).cloned())
    }

    async fn put(&self, slot: u16, key: &[u8], value: Bytes) -> ProxyResult<()> {
        self.data.write().unwrap().insert((slot, key.to_vec()), value);
        Ok(())
    }

    async fn delete(&self, slot: u16, key: &[u8]) -> ProxyResult<()> {
        self.data.write().unwrap().remove(&(slot, key.to_vec()));
        Ok(())
    }

    async fn batch_get(&self, slot: u16, keys: &[Bytes]) -> ProxyResult<Vec<Option<Bytes>>> {
        let map = self.data.read().unwrap();
        Ok(keys
            .iter()
            .map(|k| map.get(&(slot, k.to_vec())).cloned())
            .collect())
    }

    async fn batch_put(&self, slot: u16, entries: &[(Bytes, Bytes)]) -> ProxyResult<()> {
        let mut map = self.data.write().unwrap();
        for (k, v) in entries {
            map.insert((slot, k.to_vec()), v.clone());
        }
        Ok(())
    }

    async fn batch_delete(&self, slot: u16, keys: &[Bytes]) -> ProxyResult<()> {
        let mut map = self.data.write().unwrap();
        for k in keys {
            map.remove(&(slot, k.to_vec()));
        }
        Ok(())
    }

    async fn scan_by_prefix(
        &self,
        slot: u16,
        start_key: &[u8],
        prefix: &[u8],
        limit: usize,
        sort: Sort,
        include_start: bool,
    ) -> ProxyResult<Vec<KeyValue>> {
        // ASC walks from `start_key` up to just past the prefix's range;
        // DESC walks from `start_key` down to the prefix's own start.
        let far_bound = match sort {
            Sort::Asc => crate::keys::next_bytes(prefix),
            Sort::Desc => Bytes::copy_from_slice(prefix),
        };
        self.scan_by_start_end(slot, start_key, &far_bound, prefix, limit, sort, include_start)
            .await
    }

    async fn scan_by_start_end(
        &self,
        slot: u16,
        start_key: &[u8],
        end_key: &[u8],
        prefix: &[u8],
        limit: usize,
        sort: Sort,
        include_start: bool,
    ) -> ProxyResult<Vec<KeyValue>> {
        let map = self.data.read().unwrap();
        // By convention (matching the rest of the engine), `start_key` is
        // always the scan's entry point and `end_key` its far boundary:
        // for ASC, start <= end; for DESC, start >= end. `include_start`
        // always governs whether `start_key` itself may be returned.
        let (lower, upper) = match sort {
            Sort::Asc => {
                let lower = if include_start {
                    Bound::Included((slot, start_key.to_vec()))
                } else {
                    Bound::Excluded((slot, start_key.to_vec()))
                };
                (lower, Bound::Excluded((slot, end_key.to_vec())))
            }
            Sort::Desc => {
                let upper = if include_start {
                    Bound::Included((slot, start_key.to_vec()))
                } else {
                    Bound::Excluded((slot, start_key.to_vec()))
                };
                (Bound::Excluded((slot, end_key.to_vec())), upper)
            }
        };

        let mut out = Vec::new();
        let iter: Box<dyn Iterator<Item = (&(u16, Vec<u8>), &Bytes)>> = match sort {
            Sort::Asc => Box::new(map.range((lower, upper))),
            Sort::Desc => Box::new(map.range((lower, upper)).rev()),
        };
        for ((_, k), v) in iter {
            if !k.starts_with(prefix) {
                continue;
            }
            out.push(KeyValue {
                key: Bytes::copy_from_slice(k),
                value: v.clone(),
            });
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    fn supports_reverse_scan(&self) -> bool {
        true
    }
}
