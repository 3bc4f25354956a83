//! In-memory staging tier between a commander and the KV engine (spec.md
//! §4.3). A cache key is either absent, being loaded ("in flight"), or
//! resident with a value. The write buffer guarantees exactly one load is
//! ever in flight per cache key: late arrivals wait on the same load
//! instead of issuing their own, mirroring the blocked-client wait table in
//! the teacher's `server.rs` (`BlockedClientTable`, a `DashMap` keyed by the
//! blocking key with a FIFO of waiters), but waiting on a value instead of
//! a command completion.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// A write-buffer slot's resident value. `None` records a confirmed
/// absence (a deleted or never-created key) so repeat lookups don't refetch
/// from the KV engine; this is the `NoOpResult` sentinel from spec.md §4.3,
/// distinct from "nothing decided yet" which is represented by the slot not
/// existing in the map at all.
#[derive(Debug, Clone)]
pub struct WriteBufferValue<T> {
    pub value: Option<T>,
    /// Set once a commander has written through; the LRU promotion path
    /// uses this to avoid re-promoting a value nobody asked to persist.
    pub dirty: bool,
}

impl<T> WriteBufferValue<T> {
    pub fn present(value: T) -> Self {
        WriteBufferValue {
            value: Some(value),
            dirty: false,
        }
    }

    pub fn absent() -> Self {
        WriteBufferValue {
            value: None,
            dirty: false,
        }
    }

    pub fn mark_dirty(mut self) -> Self {
        self.dirty = true;
        self
    }
}

enum Slot<T> {
    /// A load from the KV engine is underway; waiters park on `Notify`.
    InFlight(Arc<Notify>),
    Ready(WriteBufferValue<T>),
}

/// Outcome of [`WriteBuffer::begin_load`]: either someone else must do the
/// load and notify waiters (`Owner`), or a load is already in flight and the
/// caller should wait on the returned `Notify` and retry (`Wait`).
pub enum LoadToken {
    Owner,
    Wait(Arc<Notify>),
}

/// Generic single-flight staging map keyed by cache key (spec.md §4.1
/// `cache_key`), parameterized by the materialized object type it holds
/// (`RedisZSet`, `RedisHash`, `RedisSet`, or `Bytes` for strings).
pub struct WriteBuffer<T> {
    entries: DashMap<Bytes, Slot<T>>,
}

impl<T: Clone> Default for WriteBuffer<T> {
    fn default() -> Self {
        WriteBuffer {
            entries: DashMap::new(),
        }
    }
}

impl<T: Clone> WriteBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fast, non-blocking read: `Some` if the value is resident, `None` if
    /// it is absent from the buffer entirely (caller must fall through to
    /// the LRU/KV engine) or currently loading.
    pub fn peek(&self, cache_key: &Bytes) -> Option<WriteBufferValue<T>> {
        match self.entries.get(cache_key)?.value() {
            Slot::Ready(v) => Some(v.clone()),
            Slot::InFlight(_) => None,
        }
    }

    pub fn is_in_flight(&self, cache_key: &Bytes) -> bool {
        matches!(self.entries.get(cache_key).as_deref(), Some(Slot::InFlight(_)))
    }

    /// Claim responsibility for loading `cache_key`, or discover someone
    /// already has. Exactly one caller per concurrent miss gets `Owner`;
    /// every other caller gets `Wait` and must await the `Notify` then
    /// retry (spec.md §4.3 "exactly one load in flight").
    pub fn begin_load(&self, cache_key: &Bytes) -> LoadToken {
        match self.entries.entry(cache_key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(e) => match e.get() {
                Slot::InFlight(n) => LoadToken::Wait(n.clone()),
                Slot::Ready(_) => LoadToken::Owner,
            },
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(Slot::InFlight(Arc::new(Notify::new())));
                LoadToken::Owner
            }
        }
    }

    /// Complete a load claimed via [`Self::begin_load`], publishing the
    /// resolved value and waking every waiter parked on it.
    pub fn complete_load(&self, cache_key: &Bytes, value: WriteBufferValue<T>) {
        let waiters = match self.entries.get(cache_key).as_deref() {
            Some(Slot::InFlight(n)) => Some(n.clone()),
            _ => None,
        };
        self.entries.insert(cache_key.clone(), Slot::Ready(value));
        if let Some(n) = waiters {
            n.notify_waiters();
        }
    }

    /// Write-through: stage a value directly, no load round trip. Used by
    /// commanders that create/overwrite without needing the prior value
    /// (e.g. `SET`).
    pub fn put(&self, cache_key: Bytes, value: WriteBufferValue<T>) {
        if let Some(Slot::InFlight(n)) = self.entries.get(&cache_key).as_deref() {
            n.notify_waiters();
        }
        self.entries.insert(cache_key, Slot::Ready(value));
    }

    /// Remove a key from the buffer entirely, e.g. once the LRU cache has
    /// taken ownership of the resident value and the staging copy is no
    /// longer needed (spec.md §4.3/§4.4 promotion boundary).
    pub fn evict(&self, cache_key: &Bytes) -> Option<WriteBufferValue<T>> {
        match self.entries.remove(cache_key)?.1 {
            Slot::Ready(v) => Some(v),
            Slot::InFlight(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_one_owner_per_cache_key() {
        let wb: WriteBuffer<Bytes> = WriteBuffer::new();
        let key = Bytes::from_static(b"k1");

        assert!(matches!(wb.begin_load(&key), LoadToken::Owner));
        match wb.begin_load(&key) {
            LoadToken::Wait(_) => {}
            LoadToken::Owner => panic!("second caller should not also own the load"),
        }
    }

    #[tokio::test]
    async fn waiter_is_woken_on_complete() {
        let wb: Arc<WriteBuffer<Bytes>> = Arc::new(WriteBuffer::new());
        let key = Bytes::from_static(b"k1");
        assert!(matches!(wb.begin_load(&key), LoadToken::Owner));

        let notify = match wb.begin_load(&key) {
            LoadToken::Wait(n) => n,
            LoadToken::Owner => panic!("expected a waiter"),
        };

        let wb2 = wb.clone();
        let key2 = key.clone();
        let waiter = tokio::spawn(async move {
            notify.notified().await;
            wb2.peek(&key2)
        });

        wb.complete_load(&key, WriteBufferValue::present(Bytes::from_static(b"v1")));
        let got = waiter.await.unwrap();
        assert_eq!(got.unwrap().value, Some(Bytes::from_static(b"v1")));
    }

    #[test]
    fn put_overwrites_without_a_load() {
        let wb: WriteBuffer<Bytes> = WriteBuffer::new();
        let key = Bytes::from_static(b"k1");
        wb.put(key.clone(), WriteBufferValue::present(Bytes::from_static(b"v1")));
        assert_eq!(wb.peek(&key).unwrap().value, Some(Bytes::from_static(b"v1")));
    }

    #[test]
    fn evict_removes_ready_entry() {
        let wb: WriteBuffer<Bytes> = WriteBuffer::new();
        let key = Bytes::from_static(b"k1");
        wb.put(key.clone(), WriteBufferValue::present(Bytes::from_static(b"v1")));
        let evicted = wb.evict(&key).unwrap();
        assert_eq!(evicted.value, Some(Bytes::from_static(b"v1")));
        assert!(wb.peek(&key).is_none());
    }

    #[test]
    fn absent_sentinel_is_distinct_from_unknown() {
        let wb: WriteBuffer<Bytes> = WriteBuffer::new();
        let key = Bytes::from_static(b"missing");
        assert!(wb.peek(&key).is_none());
        wb.put(key.clone(), WriteBufferValue::absent());
        let v = wb.peek(&key).unwrap();
        assert_eq!(v.value, None);
    }
}
