//! Sum types used in place of runtime class checks (design note in spec.md §9).

use bytes::Bytes;

/// The immutable type of a logical Redis key (spec.md §3.2: a key's type
/// never changes for its lifetime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    String,
    Hash,
    Set,
    ZSet,
}

impl KeyType {
    pub fn as_u8(self) -> u8 {
        match self {
            KeyType::String => 0,
            KeyType::Hash => 1,
            KeyType::Set => 2,
            KeyType::ZSet => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(KeyType::String),
            1 => Some(KeyType::Hash),
            2 => Some(KeyType::Set),
            3 => Some(KeyType::ZSet),
            _ => None,
        }
    }
}

/// A per-key choice, made once at creation and stable for the key's lifetime
/// (spec.md §3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingVersion {
    /// Native KV: members/fields/scores are sub-keys in the KV engine.
    V0,
    /// Mirrored Redis: the whole object also lives in a storage Redis.
    V1,
}

impl EncodingVersion {
    pub fn as_u8(self) -> u8 {
        match self {
            EncodingVersion::V0 => 0,
            EncodingVersion::V1 => 1,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(EncodingVersion::V0),
            1 => Some(EncodingVersion::V1),
            _ => None,
        }
    }
}

/// Scan / range direction, used by both the KV engine trait and the in-memory
/// materialized objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    Asc,
    Desc,
}

/// A lexicographic range boundary as accepted by `ZRANGEBYLEX` / friends.
/// `-`/`+` are the open ends; `[x`/`(x` are inclusive/exclusive member
/// boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexBound {
    Min,
    Max,
    Inclusive(Bytes),
    Exclusive(Bytes),
}

impl LexBound {
    pub fn is_min(&self) -> bool {
        matches!(self, LexBound::Min)
    }

    pub fn is_max(&self) -> bool {
        matches!(self, LexBound::Max)
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, LexBound::Exclusive(_))
    }

    /// Parse a single ZRANGEBYLEX-style argument: `-`, `+`, `[member` or
    /// `(member`. Any other leading byte is a syntax error (spec.md §4.6.1).
    pub fn parse(raw: &[u8]) -> Option<Self> {
        match raw.first() {
            Some(b'-') if raw.len() == 1 => Some(LexBound::Min),
            Some(b'+') if raw.len() == 1 => Some(LexBound::Max),
            Some(b'[') => Some(LexBound::Inclusive(Bytes::copy_from_slice(&raw[1..]))),
            Some(b'(') => Some(LexBound::Exclusive(Bytes::copy_from_slice(&raw[1..]))),
            _ => None,
        }
    }
}

/// Result of a `run_to_completion`-style fast path: `None` means "would
/// block, take the slow path"; `Some(None)` means "definitively absent";
/// `Some(Some(v))` means "here it is". Collapsing `None` and `Some(None)`
/// silently changes correctness (spec.md §9 open question) — keep both
/// states distinct everywhere this type is threaded through.
pub type ValueWrapper<T> = Option<Option<T>>;
