//! Pure, stateless, collision-free encoding of logical Redis entities into
//! physical KV byte-string keys (spec.md §4.1). Nothing in this module does
//! I/O; every function is a deterministic byte transform.

pub mod score;

use crate::metadata::KeyMeta;
use crate::types::KeyType;
use bytes::{BufMut, Bytes, BytesMut};

/// Sub-key kind tag, placed right after the cache key so that prefix scans
/// over one kind never see another kind's sub-keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SubKeyKind {
    Member = 1,
    Score = 2,
    HashField = 3,
    SetMember = 4,
}

/// Pure encoder/decoder for a single tenant namespace. Two logical keys in
/// different slots/namespaces never collide because `slot` and `namespace`
/// are folded into the cache key (spec.md §4.1, `cache_key`).
#[derive(Debug, Clone)]
pub struct KeyDesign {
    namespace: u32,
}

impl Default for KeyDesign {
    fn default() -> Self {
        KeyDesign { namespace: 0 }
    }
}

impl KeyDesign {
    pub fn new(namespace: u32) -> Self {
        KeyDesign { namespace }
    }

    /// Stable handle for a logical key. All write-buffer, LRU, and sub-key
    /// references use this, never the raw logical key (spec.md invariant).
    pub fn cache_key(&self, slot: u16, logical_key: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(2 + 4 + logical_key.len());
        out.put_u16(slot);
        out.put_u32(self.namespace);
        out.put_slice(logical_key);
        out.freeze()
    }

    /// Common prefix of all sub-keys for one logical key: `cache_key` plus a
    /// length-prefixed framing so scan bounds never run past this key's
    /// sub-key space into an adjacent one.
    fn base_prefix(&self, slot: u16, logical_key: &[u8], kind: SubKeyKind) -> BytesMut {
        let ck = self.cache_key(slot, logical_key);
        let mut out = BytesMut::with_capacity(ck.len() + 1);
        out.put_slice(&ck);
        out.put_u8(kind as u8);
        out
    }

    /// Prefix shared by every sub-key of this logical key's member→score
    /// space (`SubKey1`), used as scan bounds by the lex family.
    pub fn sub_key_prefix(&self, _meta: &KeyMeta, slot: u16, logical_key: &[u8]) -> Bytes {
        self.base_prefix(slot, logical_key, SubKeyKind::Member).freeze()
    }

    /// Prefix shared by every sub-key of this logical key's score→member
    /// space (`SubKey2`), used as scan bounds by rank/range-by-score/reverse.
    pub fn score_key_prefix(&self, _meta: &KeyMeta, slot: u16, logical_key: &[u8]) -> Bytes {
        self.base_prefix(slot, logical_key, SubKeyKind::Score).freeze()
    }

    /// `SubKey1`: member → score. Value is [`score::encode_score`].
    pub fn zset_member_sub_key1(
        &self,
        meta: &KeyMeta,
        slot: u16,
        logical_key: &[u8],
        member: &[u8],
    ) -> Bytes {
        let mut out = self.base_prefix(slot, logical_key, SubKeyKind::Member);
        let _ = meta;
        out.put_slice(member);
        out.freeze()
    }

    /// `SubKey2`: (score, member) → ⟂. Byte order equals (score, member)
    /// order, matching Redis's tie-break on equal scores (spec.md §3.1).
    pub fn zset_member_sub_key2(
        &self,
        meta: &KeyMeta,
        slot: u16,
        logical_key: &[u8],
        member: &[u8],
        score_bytes: &[u8; 8],
    ) -> Bytes {
        let mut out = self.base_prefix(slot, logical_key, SubKeyKind::Score);
        let _ = meta;
        out.put_slice(score_bytes);
        out.put_slice(member);
        out.freeze()
    }

    /// Decode the member out of a `SubKey1`. Bijective within a cache key:
    /// every byte after the fixed prefix is the original member.
    pub fn decode_zset_member_by_sub_key1<'a>(
        &self,
        subkey: &'a [u8],
        slot: u16,
        logical_key: &[u8],
    ) -> Option<&'a [u8]> {
        let prefix = self.base_prefix(slot, logical_key, SubKeyKind::Member);
        subkey.strip_prefix(prefix.as_ref())
    }

    /// Decode the member out of a `SubKey2` (score occupies the first 8
    /// bytes after the prefix).
    pub fn decode_zset_member_by_sub_key2<'a>(
        &self,
        subkey: &'a [u8],
        slot: u16,
        logical_key: &[u8],
    ) -> Option<&'a [u8]> {
        let prefix = self.base_prefix(slot, logical_key, SubKeyKind::Score);
        let rest = subkey.strip_prefix(prefix.as_ref())?;
        rest.get(8..)
    }

    /// Decode the score out of a `SubKey2`.
    pub fn decode_zset_score_by_sub_key2(
        &self,
        subkey: &[u8],
        slot: u16,
        logical_key: &[u8],
    ) -> Option<f64> {
        let prefix = self.base_prefix(slot, logical_key, SubKeyKind::Score);
        let rest = subkey.strip_prefix(prefix.as_ref())?;
        score::decode_score(rest.get(..8)?)
    }

    /// `SubKey` for a hash field.
    pub fn hash_field_sub_key(&self, slot: u16, logical_key: &[u8], field: &[u8]) -> Bytes {
        let mut out = self.base_prefix(slot, logical_key, SubKeyKind::HashField);
        out.put_slice(field);
        out.freeze()
    }

    pub fn decode_hash_field<'a>(
        &self,
        subkey: &'a [u8],
        slot: u16,
        logical_key: &[u8],
    ) -> Option<&'a [u8]> {
        let prefix = self.base_prefix(slot, logical_key, SubKeyKind::HashField);
        subkey.strip_prefix(prefix.as_ref())
    }

    pub fn hash_field_prefix(&self, slot: u16, logical_key: &[u8]) -> Bytes {
        self.base_prefix(slot, logical_key, SubKeyKind::HashField).freeze()
    }

    /// `SubKey` for a set member.
    pub fn set_member_sub_key(&self, slot: u16, logical_key: &[u8], member: &[u8]) -> Bytes {
        let mut out = self.base_prefix(slot, logical_key, SubKeyKind::SetMember);
        out.put_slice(member);
        out.freeze()
    }

    pub fn decode_set_member<'a>(
        &self,
        subkey: &'a [u8],
        slot: u16,
        logical_key: &[u8],
    ) -> Option<&'a [u8]> {
        let prefix = self.base_prefix(slot, logical_key, SubKeyKind::SetMember);
        subkey.strip_prefix(prefix.as_ref())
    }

    pub fn set_member_prefix(&self, slot: u16, logical_key: &[u8]) -> Bytes {
        self.base_prefix(slot, logical_key, SubKeyKind::SetMember).freeze()
    }
}

/// The lexicographically-smallest byte string strictly greater than every
/// string with `prefix` as a prefix: `prefix` with its last byte incremented
/// (carrying as needed), or a prefix with an extra `0xFF` appended if every
/// byte is already `0xFF`. Used as an exclusive upper scan bound so a prefix
/// scan covers exactly the sub-keys under `prefix`.
pub fn next_bytes(prefix: &[u8]) -> Bytes {
    let mut out = prefix.to_vec();
    for i in (0..out.len()).rev() {
        if out[i] != 0xFF {
            out[i] += 1;
            out.truncate(i + 1);
            return Bytes::from(out);
        }
    }
    // all 0xFF (or empty): no byte string can follow textually other than
    // appending, so widen by one byte.
    out.push(0xFF);
    Bytes::from(out)
}

/// `KeyType` discriminator so sub-key spaces can never collide across type
/// even if the same namespace/slot/logical-key bytes are reused (defensive:
/// callers always also scope by `KeyMeta.key_type` before trusting a
/// decode).
pub fn type_tag(t: KeyType) -> u8 {
    t.as_u8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::KeyMeta;

    fn meta() -> KeyMeta {
        KeyMeta::new(KeyType::ZSet, crate::types::EncodingVersion::V0)
    }

    #[test]
    fn sub_key1_round_trips_member() {
        let kd = KeyDesign::new(7);
        let m = meta();
        for member in [&b""[..], b"a", b"hello world", b"\x00\x01\xff"] {
            let sk = kd.zset_member_sub_key1(&m, 3, b"mykey", member);
            let decoded = kd.decode_zset_member_by_sub_key1(&sk, 3, b"mykey").unwrap();
            assert_eq!(decoded, member);
        }
    }

    #[test]
    fn sub_key2_round_trips_score_and_member() {
        let kd = KeyDesign::new(7);
        let m = meta();
        for (score, member) in [(1.0, &b"a"[..]), (-5.5, b"b"), (0.0, b"")] {
            let enc = score::encode_score(score);
            let sk = kd.zset_member_sub_key2(&m, 3, b"mykey", member, &enc);
            let dm = kd.decode_zset_member_by_sub_key2(&sk, 3, b"mykey").unwrap();
            let ds = kd.decode_zset_score_by_sub_key2(&sk, 3, b"mykey").unwrap();
            assert_eq!(dm, member);
            assert_eq!(ds.to_bits(), score.to_bits());
        }
    }

    #[test]
    fn different_keys_do_not_collide() {
        let kd = KeyDesign::new(0);
        let m = meta();
        let sk1 = kd.zset_member_sub_key1(&m, 1, b"key1", b"member");
        let sk2 = kd.zset_member_sub_key1(&m, 1, b"key2", b"member");
        assert_ne!(sk1, sk2);
    }

    #[test]
    fn next_bytes_is_exclusive_upper_bound() {
        let p = next_bytes(b"abc");
        assert!(p.as_ref() > b"abc".as_ref());
        assert!(p.as_ref() > b"abcz".as_ref());
        assert_eq!(next_bytes(b"ab\xff").as_ref(), b"ac".as_ref());
        assert_eq!(next_bytes(b"\xff\xff").as_ref(), b"\xff\xff\xff".as_ref());
    }
}
