//! RocksDB-backed `KvEngine`, adapted from the teacher's
//! `storage_rocksdb.rs`. Slot scoping here is a single-shard no-op (the
//! slot id is folded into keys upstream by `KeyDesign`); a sharded
//! deployment would route by slot to a different `rocksdb::DB` instead.

use super::{KeyValue, KvEngine};
use crate::error::{ProxyError, ProxyResult};
use crate::types::Sort;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

pub struct RocksDbKvEngine {
    db: Arc<rocksdb::DB>,
    write_opts: rocksdb::WriteOptions,
}

impl RocksDbKvEngine {
    pub fn open(path: impl AsRef<Path>) -> ProxyResult<Self> {
        let mut options = rocksdb::Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);
        options.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let db = rocksdb::DB::open(&options, path)?;

        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(false);

        Ok(RocksDbKvEngine {
            db: Arc::new(db),
            write_opts,
        })
    }

    fn run_scan(
        &self,
        start_key: &[u8],
        end_key: &[u8],
        prefix: &[u8],
        limit: usize,
        sort: Sort,
        include_start: bool,
    ) -> ProxyResult<Vec<KeyValue>> {
        let mut iter = self.db.raw_iterator();
        let mut out = Vec::with_capacity(limit.min(256));

        match sort {
            Sort::Asc => {
                iter.seek(start_key);
                if !include_start && iter.valid() && iter.key() == Some(start_key) {
                    iter.next();
                }
                while iter.valid() {
                    let Some(k) = iter.key() else { break };
                    if k >= end_key || !k.starts_with(prefix) {
                        break;
                    }
                    let Some(v) = iter.value() else { break };
                    out.push(KeyValue {
                        key: Bytes::copy_from_slice(k),
                        value: Bytes::copy_from_slice(v),
                    });
                    if out.len() >= limit {
                        break;
                    }
                    iter.next();
                }
            }
            Sort::Desc => {
                iter.seek_for_prev(start_key);
                if !include_start && iter.valid() && iter.key() == Some(start_key) {
                    iter.prev();
                }
                while iter.valid() {
                    let Some(k) = iter.key() else { break };
                    if k <= end_key || !k.starts_with(prefix) {
                        break;
                    }
                    let Some(v) = iter.value() else { break };
                    out.push(KeyValue {
                        key: Bytes::copy_from_slice(k),
                        value: Bytes::copy_from_slice(v),
                    });
                    if out.len() >= limit {
                        break;
                    }
                    iter.prev();
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl KvEngine for RocksDbKvEngine {
    async fn get(&self, _slot: u16, key: &[u8]) -> ProxyResult<Option<Bytes>> {
        let v = self.db.get(key)?;
        Ok(v.map(Bytes::from))
    }

    async fn put(&self, _slot: u16, key: &[u8], value: Bytes) -> ProxyResult<()> {
        self.db.put_opt(key, value, &self.write_opts)?;
        Ok(())
    }

    async fn delete(&self, _slot: u16, key: &[u8]) -> ProxyResult<()> {
        self.db.delete_opt(key, &self.write_opts)?;
        Ok(())
    }

    async fn batch_get(&self, _slot: u16, keys: &[Bytes]) -> ProxyResult<Vec<Option<Bytes>>> {
        let results = self.db.multi_get(keys.iter().map(|k| k.as_ref()));
        let mut out = Vec::with_capacity(results.len());
        for r in results {
            out.push(r.map_err(ProxyError::from)?.map(Bytes::from));
        }
        Ok(out)
    }

    async fn batch_put(&self, _slot: u16, entries: &[(Bytes, Bytes)]) -> ProxyResult<()> {
        let mut batch = rocksdb::WriteBatch::default();
        for (k, v) in entries {
            batch.put(k, v);
        }
        self.db.write_opt(batch, &self.write_opts)?;
        Ok(())
    }

    async fn batch_delete(&self, _slot: u16, keys: &[Bytes]) -> ProxyResult<()> {
        let mut batch = rocksdb::WriteBatch::default();
        for k in keys {
            batch.delete(k);
        }
        self.db.write_opt(batch, &self.write_opts)?;
        Ok(())
    }

    async fn scan_by_prefix(
        &self,
        _slot: u16,
        start_key: &[u8],
        prefix: &[u8],
        limit: usize,
        sort: Sort,
        include_start: bool,
    ) -> ProxyResult<Vec<KeyValue>> {
        let far_bound = match sort {
            Sort::Asc => crate::keys::next_bytes(prefix),
            Sort::Desc => Bytes::copy_from_slice(prefix),
        };
        self.run_scan(start_key, &far_bound, prefix, limit, sort, include_start)
    }

    async fn scan_by_start_end(
        &self,
        _slot: u16,
        start_key: &[u8],
        end_key: &[u8],
        prefix: &[u8],
        limit: usize,
        sort: Sort,
        include_start: bool,
    ) -> ProxyResult<Vec<KeyValue>> {
        self.run_scan(start_key, end_key, prefix, limit, sort, include_start)
    }

    fn supports_reverse_scan(&self) -> bool {
        true
    }
}

#[allow(unsafe_code)]
unsafe impl Send for RocksDbKvEngine {}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, RocksDbKvEngine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = RocksDbKvEngine::open(dir.path()).unwrap();
        (dir, engine)
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let (_dir, engine) = open_temp();
        engine.put(0, b"k1", Bytes::from_static(b"v1")).await.unwrap();
        assert_eq!(
            engine.get(0, b"k1").await.unwrap(),
            Some(Bytes::from_static(b"v1"))
        );
        engine.delete(0, b"k1").await.unwrap();
        assert_eq!(engine.get(0, b"k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn prefix_scan_forward_and_reverse() {
        let (_dir, engine) = open_temp();
        for m in ["a", "b", "c", "d"] {
            let key = format!("p:{m}");
            engine
                .put(0, key.as_bytes(), Bytes::copy_from_slice(m.as_bytes()))
                .await
                .unwrap();
        }
        let asc = engine
            .scan_by_prefix(0, b"p:", b"p:", 10, Sort::Asc, true)
            .await
            .unwrap();
        let members: Vec<_> = asc.iter().map(|kv| kv.value.clone()).collect();
        assert_eq!(members, vec!["a", "b", "c", "d"]);

        let desc_start = crate::keys::next_bytes(b"p:");
        let desc = engine
            .scan_by_prefix(0, &desc_start, b"p:", 10, Sort::Desc, true)
            .await
            .unwrap();
        let members: Vec<_> = desc.iter().map(|kv| kv.value.clone()).collect();
        assert_eq!(members, vec!["d", "c", "b", "a"]);
    }
}
