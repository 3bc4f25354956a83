//! Maps a logical key to its `KeyMeta` on top of the KV engine (spec.md
//! §4.2). Creation, mutation and deletion of metadata is always done by the
//! write commanders; read commanders only ever call `get_key_meta` /
//! `run_to_completion`.

use crate::error::ProxyResult;
use crate::kv::KvEngine;
use crate::types::{EncodingVersion, KeyType, ValueWrapper};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::Arc;

/// `{type, encoding_version, expire, opaque extra}` (spec.md §3.1).
#[derive(Debug, Clone, PartialEq)]
pub struct KeyMeta {
    pub key_type: KeyType,
    pub encoding_version: EncodingVersion,
    pub expire_at_ms: Option<u64>,
    /// Opaque per-type state. For zset v0 this is the element count, encoded
    /// as a big-endian u32 (spec.md §3.2 invariant).
    pub extra: Bytes,
}

impl KeyMeta {
    pub fn new(key_type: KeyType, encoding_version: EncodingVersion) -> Self {
        KeyMeta {
            key_type,
            encoding_version,
            expire_at_ms: None,
            extra: Bytes::new(),
        }
    }

    pub fn with_zset_count(mut self, count: u32) -> Self {
        self.extra = Bytes::copy_from_slice(&count.to_be_bytes());
        self
    }

    pub fn with_expire(mut self, expire_at_ms: Option<u64>) -> Self {
        self.expire_at_ms = expire_at_ms;
        self
    }

    /// Decode `extra` as the zset v0 element count. Panics-free: returns 0
    /// when extra is empty or malformed (a freshly created key).
    pub fn zset_count(&self) -> u32 {
        if self.extra.len() < 4 {
            return 0;
        }
        let mut arr = [0u8; 4];
        arr.copy_from_slice(&self.extra[..4]);
        u32::from_be_bytes(arr)
    }

    pub fn set_zset_count(&mut self, count: u32) {
        self.extra = Bytes::copy_from_slice(&count.to_be_bytes());
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expire_at_ms, Some(t) if t <= now_ms)
    }

    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(1 + 1 + 9 + self.extra.len());
        out.put_u8(self.key_type.as_u8());
        out.put_u8(self.encoding_version.as_u8());
        match self.expire_at_ms {
            Some(t) => {
                out.put_u8(1);
                out.put_u64(t);
            }
            None => out.put_u8(0),
        }
        out.put_slice(&self.extra);
        out.freeze()
    }

    pub fn decode(mut bytes: Bytes) -> Option<Self> {
        if bytes.len() < 3 {
            return None;
        }
        let key_type = KeyType::from_u8(bytes.get_u8())?;
        let encoding_version = EncodingVersion::from_u8(bytes.get_u8())?;
        let has_ttl = bytes.get_u8();
        let expire_at_ms = if has_ttl == 1 {
            if bytes.len() < 8 {
                return None;
            }
            Some(bytes.get_u64())
        } else {
            None
        };
        Some(KeyMeta {
            key_type,
            encoding_version,
            expire_at_ms,
            extra: bytes,
        })
    }
}

/// Metadata key prefix tag, kept distinct from any sub-key tag so a
/// metadata record and a logical key's sub-keys never share a KV namespace.
fn meta_key(logical_key: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(logical_key.len() + 1);
    out.put_u8(0);
    out.put_slice(logical_key);
    out.freeze()
}

/// Contract from spec.md §4.2.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    /// Blocking path, may do I/O. `None` iff the key does not exist.
    async fn get_key_meta(&self, slot: u16, logical_key: &[u8]) -> ProxyResult<Option<KeyMeta>>;

    /// Best-effort fast path: `None` means "would block, use the slow path".
    fn run_to_completion(&self, slot: u16, logical_key: &[u8]) -> ValueWrapper<KeyMeta>;

    async fn put_key_meta(&self, slot: u16, logical_key: &[u8], meta: &KeyMeta) -> ProxyResult<()>;

    async fn delete_key_meta(&self, slot: u16, logical_key: &[u8]) -> ProxyResult<()>;
}

/// KV-engine-backed metadata store. `run_to_completion` always returns
/// `None` here (no hot-metadata cache layer of its own) — callers fall
/// through to `get_key_meta`. A deployment that wants a truly non-blocking
/// fast path would wrap this with a small metadata LRU; spec.md treats that
/// as optional ("best-effort").
pub struct KvMetadataStore<E> {
    kv: Arc<E>,
}

impl<E: KvEngine> KvMetadataStore<E> {
    pub fn new(kv: Arc<E>) -> Self {
        KvMetadataStore { kv }
    }
}

#[async_trait::async_trait]
impl<E: KvEngine + Send + Sync> MetadataStore for KvMetadataStore<E> {
    async fn get_key_meta(&self, slot: u16, logical_key: &[u8]) -> ProxyResult<Option<KeyMeta>> {
        let raw = self.kv.get(slot, &meta_key(logical_key)).await?;
        Ok(raw.and_then(KeyMeta::decode))
    }

    fn run_to_completion(&self, _slot: u16, _logical_key: &[u8]) -> ValueWrapper<KeyMeta> {
        None
    }

    async fn put_key_meta(&self, slot: u16, logical_key: &[u8], meta: &KeyMeta) -> ProxyResult<()> {
        self.kv.put(slot, &meta_key(logical_key), meta.encode()).await
    }

    async fn delete_key_meta(&self, slot: u16, logical_key: &[u8]) -> ProxyResult<()> {
        self.kv.delete(slot, &meta_key(logical_key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_meta_round_trips() {
        let meta = KeyMeta::new(KeyType::ZSet, EncodingVersion::V0)
            .with_zset_count(42)
            .with_expire(Some(1234));
        let encoded = meta.encode();
        let decoded = KeyMeta::decode(encoded).unwrap();
        assert_eq!(decoded.key_type, KeyType::ZSet);
        assert_eq!(decoded.encoding_version, EncodingVersion::V0);
        assert_eq!(decoded.zset_count(), 42);
        assert_eq!(decoded.expire_at_ms, Some(1234));
    }
}
