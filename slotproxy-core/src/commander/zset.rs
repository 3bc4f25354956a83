//! The sorted-set commander family (spec.md §4.6), the most algorithmically
//! detailed part of the dispatcher. Every read command follows the same
//! canonical tiered fallthrough: write buffer, then LRU, then a KV-engine
//! scan (forward for v0's native sub-keys, or a forwarded round trip to the
//! storage Redis for v1 keys, spec.md §3.3); every write command mutates the
//! materialized object in place when it's LRU-resident, re-stages it, and
//! persists the touched sub-keys (or forwards to storage Redis for v1).

use super::{arg_f64, arg_i64, arg_str, require_arity, Commander, ProxyContext};
use crate::error::{ProxyError, ProxyResult};
use crate::keys::score;
use crate::metadata::KeyMeta;
use crate::objects::zset::{check_lex, is_impossible_interval};
use crate::objects::RedisZSet;
use crate::resp::{Command, Reply};
use crate::types::{EncodingVersion, KeyType, LexBound, Sort};
use crate::write_buffer::{LoadToken, WriteBufferValue};
use bytes::Bytes;

pub async fn handle(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    match cmd.name().as_str() {
        "zadd" => zadd(ctx, slot, cmd).await,
        "zrem" => zrem(ctx, slot, cmd).await,
        "zcard" => zcard(ctx, slot, cmd).await,
        "zscore" => zscore(ctx, slot, cmd).await,
        "zincrby" => zincrby(ctx, slot, cmd).await,
        "zcount" => zcount(ctx, slot, cmd).await,
        "zrange" => zrange(ctx, slot, cmd, Sort::Asc).await,
        "zrevrange" => zrange(ctx, slot, cmd, Sort::Desc).await,
        "zrangebyscore" => zrange_by_score(ctx, slot, cmd, Sort::Asc).await,
        "zrevrangebyscore" => zrange_by_score(ctx, slot, cmd, Sort::Desc).await,
        "zrangebylex" => zrange_by_lex(ctx, slot, cmd, Sort::Asc).await,
        "zrevrangebylex" => zrange_by_lex(ctx, slot, cmd, Sort::Desc).await,
        "zrank" => zrank(ctx, slot, cmd, Sort::Asc).await,
        "zrevrank" => zrank(ctx, slot, cmd, Sort::Desc).await,
        "zmscore" => zmscore(ctx, slot, cmd).await,
        "zremrangebylex" => zremrangebylex(ctx, slot, cmd).await,
        "zremrangebyscore" => zremrangebyscore(ctx, slot, cmd).await,
        "zremrangebyrank" => zremrangebyrank(ctx, slot, cmd).await,
        other => Err(ProxyError::Other(format!("not a zset command: {other}"))),
    }
}

/// `Commander` implementation for the zset family (spec.md §4.5/§9): the
/// fast path resolves purely from whatever's already staged in the write
/// buffer or LRU, never touching the KV engine or storage Redis.
pub struct ZsetCommander;

#[async_trait::async_trait]
impl Commander for ZsetCommander {
    fn run_to_completion(&self, ctx: &ProxyContext, slot: u16, cmd: &Command) -> Option<ProxyResult<Reply>> {
        match try_run_to_completion(ctx, slot, cmd) {
            Ok(Some(reply)) => Some(Ok(reply)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }

    async fn execute(&self, ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
        handle(ctx, slot, cmd).await
    }
}

/// Non-blocking read-only lookup: write buffer, then LRU, no I/O. Used by
/// both the `run_to_completion` fast path and the cold-path helpers below to
/// decide whether a command can skip a KV-engine round trip entirely.
fn tiered_peek(ctx: &ProxyContext, slot: u16, key: &[u8]) -> Option<RedisZSet> {
    let cache_key = ctx.keys.cache_key(slot, key);
    if let Some(wbv) = ctx.zsets.write_buffer.peek(&cache_key) {
        return Some(wbv.value.unwrap_or_default());
    }
    ctx.zsets.lru.get_for_read(&cache_key)
}

fn is_resident(ctx: &ProxyContext, slot: u16, key: &[u8]) -> bool {
    let cache_key = ctx.keys.cache_key(slot, key);
    ctx.zsets.write_buffer.peek(&cache_key).is_some() || ctx.zsets.lru.contains(&cache_key)
}

fn try_run_to_completion(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Option<Reply>> {
    let is_zset_read = matches!(
        cmd.name().as_str(),
        "zcard"
            | "zscore"
            | "zcount"
            | "zrange"
            | "zrevrange"
            | "zrangebyscore"
            | "zrevrangebyscore"
            | "zrangebylex"
            | "zrevrangebylex"
            | "zrank"
            | "zrevrank"
            | "zmscore"
    );
    if !is_zset_read {
        return Ok(None);
    }
    let Some(key) = cmd.arg(1).cloned() else {
        return Ok(None);
    };
    let Some(z) = tiered_peek(ctx, slot, &key) else {
        return Ok(None);
    };

    let reply = match cmd.name().as_str() {
        "zcard" => reply_zcard(&z),
        "zscore" => {
            require_arity(cmd, 3)?;
            let member = cmd.arg(2).ok_or(ProxyError::Syntax)?;
            reply_zscore(&z, member)
        }
        "zcount" => {
            require_arity(cmd, 4)?;
            let (min, min_excl) = parse_score_bound(arg_str(cmd, 2)?)?;
            let (max, max_excl) = parse_score_bound(arg_str(cmd, 3)?)?;
            reply_zcount(&z, min, min_excl, max, max_excl)
        }
        "zrange" => {
            let a = parse_zrange_args(cmd)?;
            reply_zrange(&z, a.start, a.stop, Sort::Asc, a.with_scores)
        }
        "zrevrange" => {
            let a = parse_zrange_args(cmd)?;
            reply_zrange(&z, a.start, a.stop, Sort::Desc, a.with_scores)
        }
        "zrangebyscore" => {
            let a = parse_zrange_by_score_args(cmd, Sort::Asc)?;
            reply_zrange_by_score(&z, a.min, a.min_excl, a.max, a.max_excl, a.limit, Sort::Asc, a.with_scores)
        }
        "zrevrangebyscore" => {
            let a = parse_zrange_by_score_args(cmd, Sort::Desc)?;
            reply_zrange_by_score(&z, a.min, a.min_excl, a.max, a.max_excl, a.limit, Sort::Desc, a.with_scores)
        }
        "zrangebylex" => {
            let a = parse_zrange_by_lex_args(cmd, Sort::Asc)?;
            reply_zrange_by_lex(&z, &a.min, &a.max, a.limit, Sort::Asc)
        }
        "zrevrangebylex" => {
            let a = parse_zrange_by_lex_args(cmd, Sort::Desc)?;
            reply_zrange_by_lex(&z, &a.min, &a.max, a.limit, Sort::Desc)
        }
        "zrank" => {
            require_arity(cmd, 3)?;
            let member = cmd.arg(2).ok_or(ProxyError::Syntax)?;
            reply_zrank(&z, member, Sort::Asc)
        }
        "zrevrank" => {
            require_arity(cmd, 3)?;
            let member = cmd.arg(2).ok_or(ProxyError::Syntax)?;
            reply_zrank(&z, member, Sort::Desc)
        }
        "zmscore" => {
            require_arity(cmd, 3)?;
            let members: Vec<Bytes> = cmd.args()[2..].to_vec();
            reply_zmscore(&z, &members)
        }
        _ => unreachable!("guarded by is_zset_read above"),
    };
    ctx.zsets.lru.record_access(&ctx.keys.cache_key(slot, &key));
    Ok(Some(reply))
}

// ---- tiered fallthrough -----------------------------------------------

/// Read-only materialization: write buffer, then LRU, then a KV/storage-Redis
/// load, with single-flight protection on the miss path (spec.md §4.3
/// "exactly one load in flight" applied to the zset tier).
async fn load_zset(ctx: &ProxyContext, slot: u16, key: &[u8]) -> ProxyResult<RedisZSet> {
    let cache_key = ctx.keys.cache_key(slot, key);

    if let Some(wbv) = ctx.zsets.write_buffer.peek(&cache_key) {
        return Ok(wbv.value.unwrap_or_default());
    }
    if let Some(z) = ctx.zsets.lru.get_for_read(&cache_key) {
        ctx.zsets
            .write_buffer
            .put(cache_key, WriteBufferValue::present(z.clone()));
        return Ok(z);
    }

    ctx.zsets.lru.record_access(&cache_key);
    let is_hot = ctx.zsets.lru.is_hot_key(&cache_key);

    match ctx.zsets.write_buffer.begin_load(&cache_key) {
        LoadToken::Owner => {
            let meta = ctx.meta.get_key_meta(slot, key).await?;
            let z = match meta {
                Some(m) if m.key_type == KeyType::ZSet => materialize_from_kv(ctx, slot, key, &m).await?,
                Some(_) => return Err(ProxyError::WrongType),
                None => RedisZSet::new(),
            };
            ctx.zsets
                .write_buffer
                .complete_load(&cache_key, WriteBufferValue::present(z.clone()));
            // Only a key observed often enough to be "hot" gets promoted
            // into the LRU tier (spec.md §4.6 step 5); a cold one-off read
            // stays staged in the write buffer only.
            if is_hot {
                ctx.zsets.lru.put_for_read(cache_key, z.clone());
            }
            Ok(z)
        }
        LoadToken::Wait(notify) => {
            notify.notified().await;
            Box::pin(load_zset(ctx, slot, key)).await
        }
    }
}

async fn materialize_from_kv(
    ctx: &ProxyContext,
    slot: u16,
    key: &[u8],
    meta: &KeyMeta,
) -> ProxyResult<RedisZSet> {
    match meta.encoding_version {
        EncodingVersion::V0 => materialize_from_kv_v0(ctx, slot, key, meta).await,
        EncodingVersion::V1 => materialize_from_storage_redis(ctx, slot, key).await,
    }
}

async fn materialize_from_kv_v0(
    ctx: &ProxyContext,
    slot: u16,
    key: &[u8],
    meta: &KeyMeta,
) -> ProxyResult<RedisZSet> {
    let prefix = ctx.keys.sub_key_prefix(meta, slot, key);
    let mut z = RedisZSet::new();
    let mut start = prefix.clone();
    loop {
        let batch = ctx
            .kv
            .scan_by_prefix(slot, &start, &prefix, 1000, Sort::Asc, true)
            .await?;
        if batch.is_empty() {
            break;
        }
        let last_key = batch.last().unwrap().key.clone();
        let exhausted = batch.len() < 1000;
        for kv in &batch {
            if let Some(member) = ctx.keys.decode_zset_member_by_sub_key1(&kv.key, slot, key) {
                if let Some(s) = score::decode_score(&kv.value) {
                    z.insert(Bytes::copy_from_slice(member), s);
                }
            }
        }
        if exhausted {
            break;
        }
        start = crate::keys::next_bytes(&last_key);
    }
    Ok(z)
}

/// Forwards a whole-object `ZRANGE cache_key 0 -1 WITHSCORES` to the storage
/// Redis and parses the reply back into a `RedisZSet` (spec.md §3.3 v1
/// materialization).
async fn materialize_from_storage_redis(ctx: &ProxyContext, slot: u16, key: &[u8]) -> ProxyResult<RedisZSet> {
    let Some(client) = ctx.storage_redis.as_ref() else {
        return Err(ProxyError::StorageRedis(
            "encoding v1 key but no storage redis configured".into(),
        ));
    };
    let cache_key = ctx.keys.cache_key(slot, key);
    let cmd = Command::new(vec![
        Bytes::from_static(b"ZRANGE"),
        cache_key,
        Bytes::from_static(b"0"),
        Bytes::from_static(b"-1"),
        Bytes::from_static(b"WITHSCORES"),
    ]);
    let reply = client.send_command(&cmd).await?;
    let items = match reply {
        Reply::Array(items) => items,
        Reply::Nil => return Ok(RedisZSet::new()),
        other => return Err(ProxyError::StorageRedis(format!("unexpected ZRANGE reply: {other:?}"))),
    };
    let mut z = RedisZSet::new();
    let mut iter = items.into_iter();
    while let (Some(member_reply), Some(score_reply)) = (iter.next(), iter.next()) {
        let member = match member_reply {
            Reply::Bulk(b) => b,
            other => return Err(ProxyError::StorageRedis(format!("expected bulk member, got {other:?}"))),
        };
        let score = reply_to_score(score_reply)?;
        z.insert(member, score);
    }
    Ok(z)
}

fn reply_to_score(reply: Reply) -> ProxyResult<f64> {
    match reply {
        Reply::Bulk(b) => std::str::from_utf8(&b)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| ProxyError::StorageRedis("bad score in storage redis reply".into())),
        Reply::Double(d) => Ok(d),
        Reply::Integer(n) => Ok(n as f64),
        other => Err(ProxyError::StorageRedis(format!("expected score, got {other:?}"))),
    }
}

fn save_materialized(ctx: &ProxyContext, cache_key: Bytes, z: &RedisZSet) {
    ctx.zsets
        .write_buffer
        .put(cache_key.clone(), WriteBufferValue::present(z.clone()).mark_dirty());
    ctx.zsets.lru.put_for_write(cache_key, z.clone());
}

/// Applies `f` to the zset at `cache_key`, mutating an LRU-resident copy in
/// place via `with_for_write` when one is already cached (spec.md §4.4's
/// in-place mutation path) instead of the clone-mutate-put-back cycle
/// `save_materialized` uses. Falls back to a full `load_zset` + re-stage
/// when the key isn't LRU-resident.
async fn mutate_in_place<R>(
    ctx: &ProxyContext,
    slot: u16,
    key: &[u8],
    cache_key: &Bytes,
    f: impl FnOnce(&mut RedisZSet) -> R,
) -> ProxyResult<R> {
    if let Some((result, updated)) = ctx.zsets.lru.with_for_write(cache_key, |z| {
        let r = f(z);
        (r, z.duplicate())
    }) {
        ctx.zsets
            .write_buffer
            .put(cache_key.clone(), WriteBufferValue::present(updated).mark_dirty());
        return Ok(result);
    }
    let mut z = load_zset(ctx, slot, key).await?;
    let r = f(&mut z);
    save_materialized(ctx, cache_key.clone(), &z);
    Ok(r)
}

async fn get_or_create_meta(ctx: &ProxyContext, slot: u16, key: &[u8]) -> ProxyResult<KeyMeta> {
    match ctx.meta.get_key_meta(slot, key).await? {
        Some(m) if m.key_type == KeyType::ZSet => Ok(m),
        Some(_) => Err(ProxyError::WrongType),
        None => Ok(KeyMeta::new(KeyType::ZSet, ctx.default_zset_encoding)),
    }
}

async fn persist_member(
    ctx: &ProxyContext,
    slot: u16,
    key: &[u8],
    meta: &KeyMeta,
    member: &[u8],
    new_score: f64,
) -> ProxyResult<()> {
    match meta.encoding_version {
        EncodingVersion::V0 => {
            let sub_key1 = ctx.keys.zset_member_sub_key1(meta, slot, key, member);
            let encoded = score::encode_score(new_score);
            ctx.kv.put(slot, &sub_key1, Bytes::copy_from_slice(&encoded)).await?;
            let sub_key2 = ctx.keys.zset_member_sub_key2(meta, slot, key, member, &encoded);
            ctx.kv.put(slot, &sub_key2, Bytes::new()).await?;
            Ok(())
        }
        EncodingVersion::V1 => {
            forward_to_storage_redis(ctx, slot, "zadd", key, &[member, format!("{new_score}").as_bytes()]).await
        }
    }
}

async fn remove_member_persist(
    ctx: &ProxyContext,
    slot: u16,
    key: &[u8],
    meta: &KeyMeta,
    member: &[u8],
    old_score: f64,
) -> ProxyResult<()> {
    match meta.encoding_version {
        EncodingVersion::V0 => {
            let sub_key1 = ctx.keys.zset_member_sub_key1(meta, slot, key, member);
            ctx.kv.delete(slot, &sub_key1).await?;
            let encoded = score::encode_score(old_score);
            let sub_key2 = ctx.keys.zset_member_sub_key2(meta, slot, key, member, &encoded);
            ctx.kv.delete(slot, &sub_key2).await?;
            Ok(())
        }
        EncodingVersion::V1 => forward_to_storage_redis(ctx, slot, "zrem", key, &[member]).await,
    }
}

/// Forwards a write to the storage Redis with `cache_key` substituted for
/// the logical key (spec.md §4.6.1 v1 path), since the storage Redis has no
/// notion of this proxy's slot/namespace framing.
async fn forward_to_storage_redis(
    ctx: &ProxyContext,
    slot: u16,
    verb: &str,
    key: &[u8],
    extra: &[&[u8]],
) -> ProxyResult<()> {
    let Some(client) = ctx.storage_redis.as_ref() else {
        return Err(ProxyError::StorageRedis("encoding v1 key but no storage redis configured".into()));
    };
    let cache_key = ctx.keys.cache_key(slot, key);
    let mut args = vec![Bytes::copy_from_slice(verb.as_bytes()), cache_key];
    args.extend(extra.iter().map(|b| Bytes::copy_from_slice(b)));
    client.send_command(&Command::new(args)).await?;
    Ok(())
}

/// Forwards a read (`ZRANK`/`ZREVRANK`/`ZMSCORE`) to the storage Redis for a
/// v1 key and returns its reply directly, without materializing the whole
/// object (spec.md §4.6.5/§4.6.6).
async fn forward_read_to_storage_redis(
    ctx: &ProxyContext,
    slot: u16,
    verb: &str,
    key: &[u8],
    extra: &[Bytes],
) -> ProxyResult<Reply> {
    let Some(client) = ctx.storage_redis.as_ref() else {
        return Err(ProxyError::StorageRedis("encoding v1 key but no storage redis configured".into()));
    };
    let cache_key = ctx.keys.cache_key(slot, key);
    let mut args = vec![Bytes::copy_from_slice(verb.as_bytes()), cache_key];
    args.extend(extra.iter().cloned());
    client.send_command(&Command::new(args)).await
}

/// Scans and deletes every `SubKey1`/`SubKey2` sub-key for `key` (used by
/// `DEL`); not part of the public command surface.
pub(crate) async fn delete_all_sub_keys(
    ctx: &ProxyContext,
    slot: u16,
    key: &[u8],
    meta: &KeyMeta,
) -> ProxyResult<()> {
    for prefix in [
        ctx.keys.sub_key_prefix(meta, slot, key),
        ctx.keys.score_key_prefix(meta, slot, key),
    ] {
        // Re-scanning from `prefix` every iteration is safe (not just an
        // optimization gap): each batch is deleted before the next scan, so
        // the next lowest remaining key is always the new starting point.
        loop {
            let batch = ctx
                .kv
                .scan_by_prefix(slot, &prefix, &prefix, 1000, Sort::Asc, true)
                .await?;
            if batch.is_empty() {
                break;
            }
            let exhausted = batch.len() < 1000;
            let keys: Vec<_> = batch.iter().map(|kv| kv.key.clone()).collect();
            ctx.kv.batch_delete(slot, &keys).await?;
            if exhausted {
                break;
            }
        }
    }
    Ok(())
}

// ---- cold-path real reverse KV scans (spec.md §4.6.1/§4.6.4/§4.6.6) -----

/// Real reverse scan over `SubKey2` (score, member) space for a cold
/// `ZREVRANGE`, batched and early-terminating once enough ranked elements
/// are collected, instead of a full forward materialization reversed in
/// memory.
async fn kv_zrevrange(
    ctx: &ProxyContext,
    slot: u16,
    key: &[u8],
    meta: &KeyMeta,
    start: i64,
    stop: i64,
) -> ProxyResult<Vec<(Bytes, f64)>> {
    let count = meta.zset_count() as i64;
    if count == 0 {
        return Ok(Vec::new());
    }
    let norm = |i: i64| -> i64 { if i < 0 { (count + i).max(0) } else { i } };
    let start_rank = norm(start).min(count);
    let stop_rank = norm(stop).min(count - 1);
    if start_rank > stop_rank || start_rank >= count {
        return Ok(Vec::new());
    }
    let skip = start_rank as usize;
    let take = (stop_rank - start_rank + 1) as usize;

    let prefix = ctx.keys.score_key_prefix(meta, slot, key);
    let mut out = Vec::with_capacity(take);
    let mut start_key = crate::keys::next_bytes(&prefix);
    let mut include_start = true;
    let mut seen = 0usize;
    loop {
        let batch = ctx
            .kv
            .scan_by_prefix(slot, &start_key, &prefix, 1000, Sort::Desc, include_start)
            .await?;
        if batch.is_empty() {
            break;
        }
        let exhausted = batch.len() < 1000;
        for kv in &batch {
            if seen >= skip && out.len() < take {
                if let (Some(member), Some(s)) = (
                    ctx.keys.decode_zset_member_by_sub_key2(&kv.key, slot, key),
                    ctx.keys.decode_zset_score_by_sub_key2(&kv.key, slot, key),
                ) {
                    out.push((Bytes::copy_from_slice(member), s));
                }
            }
            seen += 1;
            if out.len() >= take {
                return Ok(out);
            }
        }
        if exhausted {
            break;
        }
        start_key = batch.last().unwrap().key.clone();
        include_start = false;
    }
    Ok(out)
}

/// Real reverse scan over `SubKey1` (member) space for a cold
/// `ZREVRANGEBYLEX`, symmetric to the v0 forward lex scan (spec.md §4.6.1),
/// filtering with `check_lex` and honoring `LIMIT` with early termination.
async fn kv_zrevrangebylex(
    ctx: &ProxyContext,
    slot: u16,
    key: &[u8],
    meta: &KeyMeta,
    min: &LexBound,
    max: &LexBound,
    limit: Option<(i64, i64)>,
) -> ProxyResult<Vec<Bytes>> {
    if is_impossible_interval(min, max) {
        return Ok(Vec::new());
    }
    let (offset, count) = limit.unwrap_or((0, -1));
    let offset = offset.max(0) as usize;
    let take = if count < 0 { usize::MAX } else { count as usize };
    if take == 0 {
        return Ok(Vec::new());
    }

    let prefix = ctx.keys.sub_key_prefix(meta, slot, key);
    let mut out = Vec::new();
    let mut skipped = 0usize;
    let mut start_key = crate::keys::next_bytes(&prefix);
    let mut include_start = true;
    loop {
        let batch = ctx
            .kv
            .scan_by_prefix(slot, &start_key, &prefix, 1000, Sort::Desc, include_start)
            .await?;
        if batch.is_empty() {
            break;
        }
        let exhausted = batch.len() < 1000;
        for kv in &batch {
            if let Some(member) = ctx.keys.decode_zset_member_by_sub_key1(&kv.key, slot, key) {
                if check_lex(member, min, max) {
                    if skipped < offset {
                        skipped += 1;
                    } else if out.len() < take {
                        out.push(Bytes::copy_from_slice(member));
                    }
                }
            }
            if out.len() >= take {
                return Ok(out);
            }
        }
        if exhausted {
            break;
        }
        start_key = batch.last().unwrap().key.clone();
        include_start = false;
    }
    Ok(out)
}

/// Real reverse scan over `SubKey2` for a cold `ZREVRANK`: walks scores
/// descending, counting ranks until the target member's sub-key matches
/// byte-for-byte (spec.md §4.6.6).
async fn kv_zrevrank(
    ctx: &ProxyContext,
    slot: u16,
    key: &[u8],
    meta: &KeyMeta,
    member: &[u8],
) -> ProxyResult<Option<i64>> {
    let prefix = ctx.keys.score_key_prefix(meta, slot, key);
    let mut start_key = crate::keys::next_bytes(&prefix);
    let mut include_start = true;
    let mut rank = 0i64;
    loop {
        let batch = ctx
            .kv
            .scan_by_prefix(slot, &start_key, &prefix, 1000, Sort::Desc, include_start)
            .await?;
        if batch.is_empty() {
            break;
        }
        let exhausted = batch.len() < 1000;
        for kv in &batch {
            if let Some(m) = ctx.keys.decode_zset_member_by_sub_key2(&kv.key, slot, key) {
                if m == member {
                    return Ok(Some(rank));
                }
            }
            rank += 1;
        }
        if exhausted {
            break;
        }
        start_key = batch.last().unwrap().key.clone();
        include_start = false;
    }
    Ok(None)
}

// ---- commands -----------------------------------------------------------

async fn zadd(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 4)?;
    if (cmd.arity() - 2) % 2 != 0 {
        return Err(ProxyError::Syntax);
    }
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?.clone();
    let meta = get_or_create_meta(ctx, slot, &key).await?;
    let cache_key = ctx.keys.cache_key(slot, &key);

    let mut pairs = Vec::new();
    let mut idx = 2;
    while idx + 1 < cmd.arity() {
        let new_score = arg_f64(cmd, idx)?;
        if new_score.is_nan() {
            return Err(ProxyError::Other("value is not a valid float".into()));
        }
        let member = cmd.arg(idx + 1).ok_or(ProxyError::Syntax)?.clone();
        pairs.push((member, new_score));
        idx += 2;
    }

    let (added, new_len) = mutate_in_place(ctx, slot, &key, &cache_key, |z| {
        let mut added = 0i64;
        for (member, score) in &pairs {
            if z.insert(member.clone(), *score) {
                added += 1;
            }
        }
        (added, z.len())
    })
    .await?;

    for (member, score) in &pairs {
        persist_member(ctx, slot, &key, &meta, member, *score).await?;
    }

    let mut meta = meta;
    meta.set_zset_count(new_len as u32);
    ctx.meta.put_key_meta(slot, &key, &meta).await?;
    Ok(Reply::Integer(added))
}

async fn zrem(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 3)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?.clone();
    let Some(meta) = ctx.meta.get_key_meta(slot, &key).await? else {
        return Ok(Reply::Integer(0));
    };
    if meta.key_type != KeyType::ZSet {
        return Err(ProxyError::WrongType);
    }
    let cache_key = ctx.keys.cache_key(slot, &key);
    let members: Vec<Bytes> = cmd.args()[2..].to_vec();

    let (removed, new_len) = mutate_in_place(ctx, slot, &key, &cache_key, |z| {
        let mut removed = Vec::new();
        for member in &members {
            if let Some(old_score) = z.remove(member) {
                removed.push((member.clone(), old_score));
            }
        }
        (removed, z.len())
    })
    .await?;

    for (member, old_score) in &removed {
        remove_member_persist(ctx, slot, &key, &meta, member, *old_score).await?;
    }

    let mut meta = meta;
    meta.set_zset_count(new_len as u32);
    if new_len == 0 {
        ctx.meta.delete_key_meta(slot, &key).await?;
        ctx.zsets.write_buffer.evict(&cache_key);
        ctx.zsets.lru.remove(&cache_key);
    } else {
        ctx.meta.put_key_meta(slot, &key, &meta).await?;
    }
    Ok(Reply::Integer(removed.len() as i64))
}

async fn zcard(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 2)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    let z = load_zset(ctx, slot, key).await?;
    Ok(reply_zcard(&z))
}

async fn zscore(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 3)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    let member = cmd.arg(2).ok_or(ProxyError::Syntax)?;
    let z = load_zset(ctx, slot, key).await?;
    Ok(reply_zscore(&z, member))
}

async fn zincrby(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 4)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?.clone();
    let delta = arg_f64(cmd, 2)?;
    let member = cmd.arg(3).ok_or(ProxyError::Syntax)?.clone();

    let meta = get_or_create_meta(ctx, slot, &key).await?;
    let cache_key = ctx.keys.cache_key(slot, &key);

    let (new_score, new_len) = mutate_in_place(ctx, slot, &key, &cache_key, |z| {
        let new_score = z.score(&member).unwrap_or(0.0) + delta;
        if new_score.is_nan() {
            return Err(ProxyError::Other("resulting score is not a number (NaN)".into()));
        }
        z.insert(member.clone(), new_score);
        Ok((new_score, z.len()))
    })
    .await??;

    persist_member(ctx, slot, &key, &meta, &member, new_score).await?;

    let mut meta = meta;
    meta.set_zset_count(new_len as u32);
    ctx.meta.put_key_meta(slot, &key, &meta).await?;
    Ok(Reply::Double(new_score))
}

async fn zcount(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 4)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    let (min, min_excl) = parse_score_bound(arg_str(cmd, 2)?)?;
    let (max, max_excl) = parse_score_bound(arg_str(cmd, 3)?)?;
    let z = load_zset(ctx, slot, key).await?;
    Ok(reply_zcount(&z, min, min_excl, max, max_excl))
}

async fn zrange(ctx: &ProxyContext, slot: u16, cmd: &Command, sort: Sort) -> ProxyResult<Reply> {
    let a = parse_zrange_args(cmd)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;

    if sort == Sort::Desc && !is_resident(ctx, slot, key) {
        if let Some(meta) = ctx.meta.get_key_meta(slot, key).await? {
            if meta.key_type != KeyType::ZSet {
                return Err(ProxyError::WrongType);
            }
            if meta.encoding_version == EncodingVersion::V0 {
                let pairs = kv_zrevrange(ctx, slot, key, &meta, a.start, a.stop).await?;
                return Ok(pairs_to_reply(pairs, a.with_scores));
            }
        } else {
            return Ok(pairs_to_reply(Vec::new(), a.with_scores));
        }
    }

    let z = load_zset(ctx, slot, key).await?;
    Ok(reply_zrange(&z, a.start, a.stop, sort, a.with_scores))
}

async fn zrange_by_score(ctx: &ProxyContext, slot: u16, cmd: &Command, sort: Sort) -> ProxyResult<Reply> {
    let a = parse_zrange_by_score_args(cmd, sort)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    let z = load_zset(ctx, slot, key).await?;
    Ok(reply_zrange_by_score(&z, a.min, a.min_excl, a.max, a.max_excl, a.limit, sort, a.with_scores))
}

async fn zrange_by_lex(ctx: &ProxyContext, slot: u16, cmd: &Command, sort: Sort) -> ProxyResult<Reply> {
    let a = parse_zrange_by_lex_args(cmd, sort)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;

    if sort == Sort::Desc && !is_resident(ctx, slot, key) {
        if let Some(meta) = ctx.meta.get_key_meta(slot, key).await? {
            if meta.key_type != KeyType::ZSet {
                return Err(ProxyError::WrongType);
            }
            if meta.encoding_version == EncodingVersion::V0 {
                let members = kv_zrevrangebylex(ctx, slot, key, &meta, &a.min, &a.max, a.limit).await?;
                return Ok(Reply::array_of_bulks(members.into_iter().map(Some)));
            }
        } else {
            return Ok(Reply::Array(Vec::new()));
        }
    }

    let z = load_zset(ctx, slot, key).await?;
    Ok(reply_zrange_by_lex(&z, &a.min, &a.max, a.limit, sort))
}

async fn zrank(ctx: &ProxyContext, slot: u16, cmd: &Command, sort: Sort) -> ProxyResult<Reply> {
    require_arity(cmd, 3)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    let member = cmd.arg(2).ok_or(ProxyError::Syntax)?;

    if !is_resident(ctx, slot, key) {
        if let Some(meta) = ctx.meta.get_key_meta(slot, key).await? {
            if meta.key_type != KeyType::ZSet {
                return Err(ProxyError::WrongType);
            }
            match meta.encoding_version {
                EncodingVersion::V1 => {
                    let verb = if sort == Sort::Asc { "zrank" } else { "zrevrank" };
                    return forward_read_to_storage_redis(ctx, slot, verb, key, &[member.clone()]).await;
                }
                EncodingVersion::V0 if sort == Sort::Desc => {
                    let rank = kv_zrevrank(ctx, slot, key, &meta, member).await?;
                    return Ok(match rank {
                        Some(r) => Reply::Integer(r),
                        None => Reply::Nil,
                    });
                }
                EncodingVersion::V0 => {}
            }
        } else {
            return Ok(Reply::Nil);
        }
    }

    let z = load_zset(ctx, slot, key).await?;
    Ok(reply_zrank(&z, member, sort))
}

async fn zmscore(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 3)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    let members: Vec<Bytes> = cmd.args()[2..].to_vec();

    if !is_resident(ctx, slot, key) {
        if let Some(meta) = ctx.meta.get_key_meta(slot, key).await? {
            if meta.key_type != KeyType::ZSet {
                return Err(ProxyError::WrongType);
            }
            match meta.encoding_version {
                EncodingVersion::V1 => {
                    return forward_read_to_storage_redis(ctx, slot, "zmscore", key, &members).await;
                }
                EncodingVersion::V0 => {
                    let sub_keys: Vec<Bytes> = members
                        .iter()
                        .map(|m| ctx.keys.zset_member_sub_key1(&meta, slot, key, m))
                        .collect();
                    let raw = ctx.kv.batch_get(slot, &sub_keys).await?;
                    let scores: Vec<Reply> = raw
                        .into_iter()
                        .map(|v| match v.and_then(|b| score::decode_score(&b)) {
                            Some(s) => Reply::Double(s),
                            None => Reply::Nil,
                        })
                        .collect();
                    return Ok(Reply::Array(scores));
                }
            }
        } else {
            return Ok(Reply::Array(members.iter().map(|_| Reply::Nil).collect()));
        }
    }

    let z = load_zset(ctx, slot, key).await?;
    Ok(reply_zmscore(&z, &members))
}

async fn zremrangebylex(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 4)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?.clone();
    let min = LexBound::parse(cmd.arg(2).ok_or(ProxyError::Syntax)?).ok_or(ProxyError::Syntax)?;
    let max = LexBound::parse(cmd.arg(3).ok_or(ProxyError::Syntax)?).ok_or(ProxyError::Syntax)?;
    remove_range(ctx, slot, &key, |z| z.zremrange_by_lex(&min, &max)).await
}

async fn zremrangebyscore(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 4)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?.clone();
    let (min, min_excl) = parse_score_bound(arg_str(cmd, 2)?)?;
    let (max, max_excl) = parse_score_bound(arg_str(cmd, 3)?)?;
    remove_range(ctx, slot, &key, |z| z.zremrange_by_score(min, min_excl, max, max_excl)).await
}

async fn zremrangebyrank(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 4)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?.clone();
    let start = arg_i64(cmd, 2)?;
    let stop = arg_i64(cmd, 3)?;
    remove_range(ctx, slot, &key, |z| z.zremrange_by_rank(start, stop)).await
}

/// Shared body for the three `ZREMRANGEBY*` commands: mutate in place to
/// compute the removed `(member, score)` set, persist each removal, then
/// either delete the key (if now empty) or leave the re-staged survivor.
async fn remove_range(
    ctx: &ProxyContext,
    slot: u16,
    key: &[u8],
    f: impl FnOnce(&mut RedisZSet) -> Vec<(Bytes, f64)>,
) -> ProxyResult<Reply> {
    let Some(meta) = ctx.meta.get_key_meta(slot, key).await? else {
        return Ok(Reply::Integer(0));
    };
    if meta.key_type != KeyType::ZSet {
        return Err(ProxyError::WrongType);
    }
    let cache_key = ctx.keys.cache_key(slot, key);

    let (removed, new_len) = mutate_in_place(ctx, slot, key, &cache_key, |z| {
        let removed = f(z);
        (removed, z.len())
    })
    .await?;

    for (member, score) in &removed {
        remove_member_persist(ctx, slot, key, &meta, member, *score).await?;
    }

    let mut meta = meta;
    meta.set_zset_count(new_len as u32);
    if new_len == 0 {
        ctx.meta.delete_key_meta(slot, key).await?;
        ctx.zsets.write_buffer.evict(&cache_key);
        ctx.zsets.lru.remove(&cache_key);
    } else {
        ctx.meta.put_key_meta(slot, key, &meta).await?;
    }
    Ok(Reply::Integer(removed.len() as i64))
}

// ---- pure reply helpers (shared by the fast path and the tiered path) ---

fn reply_zcard(z: &RedisZSet) -> Reply {
    Reply::Integer(z.len() as i64)
}

fn reply_zscore(z: &RedisZSet, member: &[u8]) -> Reply {
    match z.score(member) {
        Some(s) => Reply::Double(s),
        None => Reply::Nil,
    }
}

fn reply_zcount(z: &RedisZSet, min: f64, min_excl: bool, max: f64, max_excl: bool) -> Reply {
    Reply::Integer(z.zcount(min, min_excl, max, max_excl) as i64)
}

fn reply_zrange(z: &RedisZSet, start: i64, stop: i64, sort: Sort, with_scores: bool) -> Reply {
    let pairs = match sort {
        Sort::Asc => z.zrange(start, stop),
        Sort::Desc => z.zrevrange(start, stop),
    };
    pairs_to_reply(pairs, with_scores)
}

#[allow(clippy::too_many_arguments)]
fn reply_zrange_by_score(
    z: &RedisZSet,
    min: f64,
    min_excl: bool,
    max: f64,
    max_excl: bool,
    limit: Option<(i64, i64)>,
    sort: Sort,
    with_scores: bool,
) -> Reply {
    let pairs = z.zrange_by_score(min, min_excl, max, max_excl, limit, sort);
    pairs_to_reply(pairs, with_scores)
}

fn reply_zrange_by_lex(z: &RedisZSet, min: &LexBound, max: &LexBound, limit: Option<(i64, i64)>, sort: Sort) -> Reply {
    let members = z.zrange_by_lex(min, max, limit, sort);
    Reply::array_of_bulks(members.into_iter().map(Some))
}

fn reply_zrank(z: &RedisZSet, member: &[u8], sort: Sort) -> Reply {
    match z.rank(member, sort) {
        Some(r) => Reply::Integer(r as i64),
        None => Reply::Nil,
    }
}

fn reply_zmscore(z: &RedisZSet, members: &[Bytes]) -> Reply {
    let scores = z.zmscore(members);
    Reply::Array(
        scores
            .into_iter()
            .map(|s| match s {
                Some(v) => Reply::Double(v),
                None => Reply::Nil,
            })
            .collect(),
    )
}

fn pairs_to_reply(pairs: Vec<(Bytes, f64)>, with_scores: bool) -> Reply {
    if with_scores {
        let mut out = Vec::with_capacity(pairs.len() * 2);
        for (m, s) in pairs {
            out.push(Reply::Bulk(m));
            out.push(Reply::Double(s));
        }
        Reply::Array(out)
    } else {
        Reply::Array(pairs.into_iter().map(|(m, _)| Reply::Bulk(m)).collect())
    }
}

// ---- pure argument parsing ------------------------------------------------

struct ZRangeArgs {
    start: i64,
    stop: i64,
    with_scores: bool,
}

/// `ZRANGE key start stop [WITHSCORES]`. Any 5th token other than
/// `WITHSCORES`, or anything past it, is a syntax error (spec.md §4.6.3) —
/// it must not be silently treated as "no WITHSCORES".
fn parse_zrange_args(cmd: &Command) -> ProxyResult<ZRangeArgs> {
    require_arity(cmd, 4)?;
    let start = arg_i64(cmd, 2)?;
    let stop = arg_i64(cmd, 3)?;
    let with_scores = match cmd.arity() {
        4 => false,
        5 => {
            if arg_str(cmd, 4)?.eq_ignore_ascii_case("withscores") {
                true
            } else {
                return Err(ProxyError::Syntax);
            }
        }
        _ => return Err(ProxyError::Syntax),
    };
    Ok(ZRangeArgs { start, stop, with_scores })
}

struct ZRangeByScoreArgs {
    min: f64,
    min_excl: bool,
    max: f64,
    max_excl: bool,
    with_scores: bool,
    limit: Option<(i64, i64)>,
}

fn parse_zrange_by_score_args(cmd: &Command, sort: Sort) -> ProxyResult<ZRangeByScoreArgs> {
    require_arity(cmd, 4)?;
    // ZRANGEBYSCORE key min max ; ZREVRANGEBYSCORE key max min (args swapped)
    let (min_arg, max_arg) = match sort {
        Sort::Asc => (2, 3),
        Sort::Desc => (3, 2),
    };
    let (min, min_excl) = parse_score_bound(arg_str(cmd, min_arg)?)?;
    let (max, max_excl) = parse_score_bound(arg_str(cmd, max_arg)?)?;
    let mut with_scores = false;
    let mut limit = None;
    let mut idx = 4;
    while idx < cmd.arity() {
        let tok = arg_str(cmd, idx)?;
        if tok.eq_ignore_ascii_case("withscores") {
            with_scores = true;
            idx += 1;
        } else if tok.eq_ignore_ascii_case("limit") {
            let offset = arg_i64(cmd, idx + 1)?;
            let count = arg_i64(cmd, idx + 2)?;
            limit = Some((offset, count));
            idx += 3;
        } else {
            return Err(ProxyError::Syntax);
        }
    }
    Ok(ZRangeByScoreArgs {
        min,
        min_excl,
        max,
        max_excl,
        with_scores,
        limit,
    })
}

struct ZRangeByLexArgs {
    min: LexBound,
    max: LexBound,
    limit: Option<(i64, i64)>,
}

fn parse_zrange_by_lex_args(cmd: &Command, sort: Sort) -> ProxyResult<ZRangeByLexArgs> {
    require_arity(cmd, 4)?;
    let (min_arg, max_arg) = match sort {
        Sort::Asc => (2, 3),
        Sort::Desc => (3, 2),
    };
    let min = LexBound::parse(cmd.arg(min_arg).ok_or(ProxyError::Syntax)?).ok_or(ProxyError::Syntax)?;
    let max = LexBound::parse(cmd.arg(max_arg).ok_or(ProxyError::Syntax)?).ok_or(ProxyError::Syntax)?;
    let mut limit = None;
    if cmd.arity() > 4 {
        if !arg_str(cmd, 4)?.eq_ignore_ascii_case("limit") || cmd.arity() < 7 {
            return Err(ProxyError::Syntax);
        }
        limit = Some((arg_i64(cmd, 5)?, arg_i64(cmd, 6)?));
    }
    Ok(ZRangeByLexArgs { min, max, limit })
}

/// Parses a `ZRANGEBYSCORE`-style bound: `-inf`/`+inf`/a bare float (
/// inclusive), or `(float` (exclusive), per spec.md §4.6.3.
fn parse_score_bound(raw: &str) -> ProxyResult<(f64, bool)> {
    if let Some(rest) = raw.strip_prefix('(') {
        let v: f64 = rest.parse().map_err(|_| ProxyError::Other("min or max is not a float".into()))?;
        Ok((v, true))
    } else {
        match raw {
            "-inf" => Ok((f64::NEG_INFINITY, false)),
            "+inf" | "inf" => Ok((f64::INFINITY, false)),
            _ => {
                let v: f64 = raw.parse().map_err(|_| ProxyError::Other("min or max is not a float".into()))?;
                Ok((v, false))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> Command {
        Command::new(parts.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect())
    }

    #[test]
    fn parses_inclusive_and_exclusive_score_bounds() {
        assert_eq!(parse_score_bound("5").unwrap(), (5.0, false));
        assert_eq!(parse_score_bound("(5").unwrap(), (5.0, true));
        assert_eq!(parse_score_bound("-inf").unwrap(), (f64::NEG_INFINITY, false));
        assert_eq!(parse_score_bound("+inf").unwrap(), (f64::INFINITY, false));
    }

    #[test]
    fn rejects_malformed_score_bound() {
        assert!(parse_score_bound("not-a-number").is_err());
    }

    #[test]
    fn zrange_rejects_unrecognized_fifth_token() {
        let c = cmd(&["zrange", "k", "0", "-1", "banana"]);
        assert!(parse_zrange_args(&c).is_err());
    }

    #[test]
    fn zrange_accepts_withscores() {
        let c = cmd(&["zrange", "k", "0", "-1", "withscores"]);
        let a = parse_zrange_args(&c).unwrap();
        assert!(a.with_scores);
    }

    #[test]
    fn zrange_rejects_trailing_garbage_after_withscores() {
        let c = cmd(&["zrange", "k", "0", "-1", "withscores", "extra"]);
        assert!(parse_zrange_args(&c).is_err());
    }

    #[test]
    fn zrange_without_withscores_defaults_false() {
        let c = cmd(&["zrange", "k", "0", "-1"]);
        let a = parse_zrange_args(&c).unwrap();
        assert!(!a.with_scores);
    }
}
