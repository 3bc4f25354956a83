//! The materialized hash object (spec.md §3.1): an ordered field→value map.
//! Lighter sketch than [`super::zset`] since hash has no range-query
//! algorithms, only point and full-scan access.

use bytes::Bytes;
use indexmap::IndexMap;

#[derive(Debug, Clone, Default)]
pub struct RedisHash {
    fields: IndexMap<Bytes, Bytes>,
}

impl RedisHash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Bytes, Bytes)>) -> Self {
        Self {
            fields: pairs.into_iter().collect(),
        }
    }

    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns `true` if this field was newly created (`HSET`'s created
    /// count).
    pub fn set(&mut self, field: Bytes, value: Bytes) -> bool {
        self.fields.insert(field, value).is_none()
    }

    pub fn get(&self, field: &[u8]) -> Option<Bytes> {
        self.fields.get(field).cloned()
    }

    pub fn remove(&mut self, field: &[u8]) -> bool {
        self.fields.shift_remove(field).is_some()
    }

    pub fn contains(&self, field: &[u8]) -> bool {
        self.fields.contains_key(field)
    }

    pub fn all(&self) -> Vec<(Bytes, Bytes)> {
        self.fields
            .iter()
            .map(|(f, v)| (f.clone(), v.clone()))
            .collect()
    }

    pub fn keys(&self) -> Vec<Bytes> {
        self.fields.keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Bytes> {
        self.fields.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn set_reports_whether_field_is_new() {
        let mut h = RedisHash::new();
        assert!(h.set(b("f1"), b("v1")));
        assert!(!h.set(b("f1"), b("v2")));
        assert_eq!(h.get(b"f1"), Some(b("v2")));
    }

    #[test]
    fn preserves_insertion_order() {
        let mut h = RedisHash::new();
        h.set(b("z"), b("1"));
        h.set(b("a"), b("2"));
        assert_eq!(h.keys(), vec![b("z"), b("a")]);
    }

    #[test]
    fn duplicate_is_independent() {
        let mut h = RedisHash::new();
        h.set(b("f"), b("1"));
        let dup = h.duplicate();
        h.set(b("f"), b("2"));
        assert_eq!(dup.get(b"f"), Some(b("1")));
        assert_eq!(h.get(b"f"), Some(b("2")));
    }

    #[test]
    fn remove_reports_presence() {
        let mut h = RedisHash::new();
        h.set(b("f"), b("1"));
        assert!(h.remove(b"f"));
        assert!(!h.remove(b"f"));
        assert!(h.is_empty());
    }
}
