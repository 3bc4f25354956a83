//! The materialized set object (spec.md §3.1): an unordered collection of
//! unique members. Lightest of the three object types — no scoring, no
//! ordering guarantees to preserve.

use bytes::Bytes;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct RedisSet {
    members: HashSet<Bytes>,
}

impl RedisSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_members(members: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }

    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns `true` if the member was newly added (`SADD`'s added count).
    pub fn add(&mut self, member: Bytes) -> bool {
        self.members.insert(member)
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        self.members.remove(member)
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.members.contains(member)
    }

    pub fn members(&self) -> Vec<Bytes> {
        self.members.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn add_reports_whether_member_is_new() {
        let mut s = RedisSet::new();
        assert!(s.add(b("m1")));
        assert!(!s.add(b("m1")));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn remove_reports_presence() {
        let mut s = RedisSet::new();
        s.add(b("m1"));
        assert!(s.remove(b"m1"));
        assert!(!s.remove(b"m1"));
    }

    #[test]
    fn duplicate_is_independent() {
        let mut s = RedisSet::new();
        s.add(b("m1"));
        let dup = s.duplicate();
        s.add(b("m2"));
        assert_eq!(dup.len(), 1);
        assert_eq!(s.len(), 2);
    }
}
