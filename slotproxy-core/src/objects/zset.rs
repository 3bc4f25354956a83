//! The materialized sorted-set object (spec.md §3.1). This is the central
//! mutable structure shared across tiers: it is exclusively owned by either
//! a write-buffer entry or an LRU entry at any moment, and moving it between
//! the two always goes through [`RedisZSet::duplicate`] — never aliased
//! (spec.md §9 design note).

use crate::types::{LexBound, Sort};
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};

/// Total-ordering wrapper over `f64` scores. NaN is rejected at the RESP
/// parse boundary (spec.md §4.1), so every score reaching this type is
/// totally ordered by the standard IEEE-754 order.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrdScore(f64);

impl Eq for OrdScore {}
impl PartialOrd for OrdScore {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrdScore {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// A materialized sorted set: member bytes → score, with an auxiliary
/// `(score, member)` ordered index for range queries. Score comparison is
/// IEEE-754 total order; ties break by byte-wise member order (spec.md
/// §3.1), matching Redis semantics.
#[derive(Debug, Clone, Default)]
pub struct RedisZSet {
    by_member: HashMap<Bytes, f64>,
    by_score: BTreeSet<(OrdScore, Bytes)>,
}

impl RedisZSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Bytes, f64)>) -> Self {
        let mut z = Self::new();
        for (member, score) in pairs {
            z.insert(member, score);
        }
        z
    }

    pub fn len(&self) -> usize {
        self.by_member.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_member.is_empty()
    }

    /// Deep copy for write-buffer mirroring (spec.md §3.1 `duplicate`). No
    /// tier is ever allowed to alias another tier's copy.
    pub fn duplicate(&self) -> Self {
        self.clone()
    }

    /// Insert or update a member's score. Returns `true` if this is a new
    /// member (used by `ZADD`'s "added count").
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        if let Some(&old) = self.by_member.get(&member) {
            if old == score {
                return false;
            }
            self.by_score.remove(&(OrdScore(old), member.clone()));
            self.by_score.insert((OrdScore(score), member.clone()));
            self.by_member.insert(member, score);
            false
        } else {
            self.by_score.insert((OrdScore(score), member.clone()));
            self.by_member.insert(member, score);
            true
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> Option<f64> {
        let score = self.by_member.remove(member)?;
        self.by_score.remove(&(OrdScore(score), Bytes::copy_from_slice(member)));
        Some(score)
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.by_member.get(member).copied()
    }

    pub fn zmscore(&self, members: &[Bytes]) -> Vec<Option<f64>> {
        members.iter().map(|m| self.score(m)).collect()
    }

    fn ordered_iter(&self) -> impl DoubleEndedIterator<Item = &(OrdScore, Bytes)> {
        self.by_score.iter()
    }

    /// Full ascending (member, score) sequence.
    fn ascending(&self) -> Vec<(Bytes, f64)> {
        self.ordered_iter().map(|(s, m)| (m.clone(), s.0)).collect()
    }

    /// `ZRANGE key start stop`. Negative indices count from the end.
    pub fn zrange(&self, start: i64, stop: i64) -> Vec<(Bytes, f64)> {
        let all = self.ascending();
        slice_by_rank(&all, start, stop)
    }

    /// `ZREVRANGE key start stop`: reverse of `zrange`.
    pub fn zrevrange(&self, start: i64, stop: i64) -> Vec<(Bytes, f64)> {
        let mut all = self.ascending();
        all.reverse();
        slice_by_rank(&all, start, stop)
    }

    /// `ZRANGEBYSCORE` / `ZREVRANGEBYSCORE` style query, `min`/`max`
    /// inclusive by default; `min_exclusive`/`max_exclusive` flip that per
    /// argument. `limit` is `(offset, count)`; `count < 0` means unbounded.
    pub fn zrange_by_score(
        &self,
        min: f64,
        min_exclusive: bool,
        max: f64,
        max_exclusive: bool,
        limit: Option<(i64, i64)>,
        sort: Sort,
    ) -> Vec<(Bytes, f64)> {
        let mut out: Vec<(Bytes, f64)> = self
            .ordered_iter()
            .filter(|(s, _)| {
                let v = s.0;
                let above_min = if min_exclusive { v > min } else { v >= min };
                let below_max = if max_exclusive { v < max } else { v <= max };
                above_min && below_max
            })
            .map(|(s, m)| (m.clone(), s.0))
            .collect();
        if sort == Sort::Desc {
            out.reverse();
        }
        apply_limit(out, limit)
    }

    pub fn zcount(&self, min: f64, min_exclusive: bool, max: f64, max_exclusive: bool) -> usize {
        self.zrange_by_score(min, min_exclusive, max, max_exclusive, None, Sort::Asc)
            .len()
    }

    /// `ZRANGEBYLEX` / `ZREVRANGEBYLEX` (spec.md §4.6.1/§4.6.4). Lex compare
    /// is only meaningful when used on an all-equal-score zset, same
    /// constraint Redis itself documents; this implementation just compares
    /// member bytes regardless of score, matching the in-memory contract
    /// used by the write-buffer/LRU tiers.
    pub fn zrange_by_lex(
        &self,
        min: &LexBound,
        max: &LexBound,
        limit: Option<(i64, i64)>,
        sort: Sort,
    ) -> Vec<Bytes> {
        if is_impossible_interval(min, max) {
            return Vec::new();
        }
        let mut members: Vec<Bytes> = self
            .ordered_iter()
            .map(|(_, m)| m.clone())
            .filter(|m| check_lex(m, min, max))
            .collect();
        members.sort();
        if sort == Sort::Desc {
            members.reverse();
        }
        apply_limit(
            members.into_iter().map(|m| (m, 0.0)).collect(),
            limit,
        )
        .into_iter()
        .map(|(m, _)| m)
        .collect()
    }

    /// `ZRANK` (ascending position) / `ZREVRANK` (descending position).
    pub fn rank(&self, member: &[u8], sort: Sort) -> Option<usize> {
        let score = self.score(member)?;
        let target = (OrdScore(score), Bytes::copy_from_slice(member));
        let idx = match sort {
            Sort::Asc => self.by_score.iter().position(|e| *e == target)?,
            Sort::Desc => {
                let from_front = self.by_score.iter().position(|e| *e == target)?;
                self.by_score.len() - 1 - from_front
            }
        };
        Some(idx)
    }

    pub fn zremrange_by_lex(&mut self, min: &LexBound, max: &LexBound) -> Vec<(Bytes, f64)> {
        let to_remove: Vec<Bytes> = self.zrange_by_lex(min, max, None, Sort::Asc);
        let mut removed = Vec::with_capacity(to_remove.len());
        for m in to_remove {
            if let Some(score) = self.remove(&m) {
                removed.push((m, score));
            }
        }
        removed
    }

    pub fn zremrange_by_score(
        &mut self,
        min: f64,
        min_exclusive: bool,
        max: f64,
        max_exclusive: bool,
    ) -> Vec<(Bytes, f64)> {
        let to_remove: Vec<Bytes> = self
            .zrange_by_score(min, min_exclusive, max, max_exclusive, None, Sort::Asc)
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        let mut removed = Vec::with_capacity(to_remove.len());
        for m in to_remove {
            if let Some(score) = self.remove(&m) {
                removed.push((m, score));
            }
        }
        removed
    }

    pub fn zremrange_by_rank(&mut self, start: i64, stop: i64) -> Vec<(Bytes, f64)> {
        let to_remove = self.zrange(start, stop);
        let mut removed = Vec::with_capacity(to_remove.len());
        for (m, _) in to_remove {
            if let Some(score) = self.remove(&m) {
                removed.push((m, score));
            }
        }
        removed
    }
}

/// Normalize `(start, stop)` Redis-style indices against `len` and slice.
/// An empty resulting interval returns an empty vec (spec.md §4.6.3).
fn slice_by_rank<T: Clone>(items: &[T], start: i64, stop: i64) -> Vec<T> {
    let len = items.len() as i64;
    if len == 0 {
        return Vec::new();
    }
    let norm = |i: i64| -> i64 {
        if i < 0 {
            (len + i).max(0)
        } else {
            i
        }
    };
    let start = norm(start).min(len);
    let stop = norm(stop).min(len - 1);
    if start > stop || start >= len {
        return Vec::new();
    }
    items[start as usize..=(stop as usize)].to_vec()
}

fn apply_limit(items: Vec<(Bytes, f64)>, limit: Option<(i64, i64)>) -> Vec<(Bytes, f64)> {
    match limit {
        None => items,
        Some((offset, count)) => {
            let offset = offset.max(0) as usize;
            if offset >= items.len() {
                return Vec::new();
            }
            let rest = &items[offset..];
            if count < 0 {
                rest.to_vec()
            } else {
                rest.iter().take(count as usize).cloned().collect()
            }
        }
    }
}

/// `min.isMax()` or `max.isMin()`: an interval that can never contain
/// anything (spec.md §4.6.1).
pub fn is_impossible_interval(min: &LexBound, max: &LexBound) -> bool {
    min.is_max() || max.is_min()
}

/// Filters a candidate member against a lex interval, honoring exclusive
/// boundaries (spec.md's `ZSetLexUtil.check_lex`).
pub fn check_lex(member: &[u8], min: &LexBound, max: &LexBound) -> bool {
    let above_min = match min {
        LexBound::Min => true,
        LexBound::Max => false,
        LexBound::Inclusive(b) => member >= b.as_ref(),
        LexBound::Exclusive(b) => member > b.as_ref(),
    };
    let below_max = match max {
        LexBound::Max => true,
        LexBound::Min => false,
        LexBound::Inclusive(b) => member <= b.as_ref(),
        LexBound::Exclusive(b) => member < b.as_ref(),
    };
    above_min && below_max
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zset(pairs: &[(&str, f64)]) -> RedisZSet {
        RedisZSet::from_pairs(pairs.iter().map(|(m, s)| (Bytes::copy_from_slice(m.as_bytes()), *s)))
    }

    #[test]
    fn zrange_is_sorted_by_score_then_member() {
        let z = zset(&[("c", 1.0), ("a", 1.0), ("b", 0.5)]);
        let all = z.zrange(0, -1);
        assert_eq!(
            all,
            vec![
                (Bytes::from_static(b"b"), 0.5),
                (Bytes::from_static(b"a"), 1.0),
                (Bytes::from_static(b"c"), 1.0),
            ]
        );
    }

    #[test]
    fn zrevrange_is_the_reverse() {
        let z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let fwd = z.zrange(0, -1);
        let mut rev = z.zrevrange(0, -1);
        rev.reverse();
        assert_eq!(fwd, rev);
    }

    #[test]
    fn zrevrange_last_two_of_three() {
        let z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let top2 = z.zrevrange(-2, -1);
        assert_eq!(
            top2,
            vec![(Bytes::from_static(b"b"), 2.0), (Bytes::from_static(b"a"), 1.0)]
        );
    }

    #[test]
    fn lex_range_all() {
        let z = zset(&[("a", 0.0), ("b", 0.0), ("c", 0.0)]);
        let all = z.zrange_by_lex(&LexBound::Min, &LexBound::Max, None, Sort::Asc);
        assert_eq!(all, vec!["a", "b", "c"].into_iter().map(Bytes::from_static).collect::<Vec<_>>());
    }

    #[test]
    fn lex_range_missing_key_is_empty() {
        let z = RedisZSet::new();
        let all = z.zrange_by_lex(&LexBound::Min, &LexBound::Max, None, Sort::Asc);
        assert!(all.is_empty());
    }

    #[test]
    fn lex_exact_match_inclusive() {
        let z = zset(&[("a", 0.0), ("b", 0.0)]);
        let r = z.zrange_by_lex(
            &LexBound::Inclusive(Bytes::from_static(b"a")),
            &LexBound::Inclusive(Bytes::from_static(b"a")),
            None,
            Sort::Asc,
        );
        assert_eq!(r, vec![Bytes::from_static(b"a")]);
    }

    #[test]
    fn lex_exclusive_vs_inclusive_same_bound_is_empty() {
        let z = zset(&[("a", 0.0)]);
        let r = z.zrange_by_lex(
            &LexBound::Exclusive(Bytes::from_static(b"a")),
            &LexBound::Inclusive(Bytes::from_static(b"a")),
            None,
            Sort::Asc,
        );
        assert!(r.is_empty());
    }

    #[test]
    fn zmscore_preserves_order_and_nils() {
        let z = zset(&[("present", 5.0)]);
        let got = z.zmscore(&[
            Bytes::from_static(b"absent1"),
            Bytes::from_static(b"present"),
            Bytes::from_static(b"absent2"),
        ]);
        assert_eq!(got, vec![None, Some(5.0), None]);
    }

    #[test]
    fn remove_range_by_lex_updates_len() {
        let mut z = zset(&[("a", 0.0), ("b", 0.0), ("c", 0.0)]);
        let removed = z.zremrange_by_lex(
            &LexBound::Inclusive(Bytes::from_static(b"a")),
            &LexBound::Exclusive(Bytes::from_static(b"c")),
        );
        assert_eq!(removed.len(), 2);
        assert_eq!(z.len(), 1);
        assert_eq!(z.zrange(0, -1), vec![(Bytes::from_static(b"c"), 0.0)]);
    }

    #[test]
    fn duplicate_is_a_deep_copy() {
        let mut z = zset(&[("a", 1.0)]);
        let dup = z.duplicate();
        z.insert(Bytes::from_static(b"b"), 2.0);
        assert_eq!(dup.len(), 1);
        assert_eq!(z.len(), 2);
    }

    #[test]
    fn rank_ascending_and_descending() {
        let z = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert_eq!(z.rank(b"a", Sort::Asc), Some(0));
        assert_eq!(z.rank(b"c", Sort::Asc), Some(2));
        assert_eq!(z.rank(b"a", Sort::Desc), Some(2));
        assert_eq!(z.rank(b"c", Sort::Desc), Some(0));
        assert_eq!(z.rank(b"missing", Sort::Asc), None);
    }
}
