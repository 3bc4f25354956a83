//! `HSET`/`HGET`/`HDEL`/`HGETALL`/`HLEN` (spec.md supplemented minimal hash
//! family). Same tiered-fallthrough shape as [`super::zset`], simplified
//! since a hash has no score-ordered sub-key space to maintain.

use super::{require_arity, ProxyContext};
use crate::error::{ProxyError, ProxyResult};
use crate::metadata::KeyMeta;
use crate::objects::RedisHash;
use crate::resp::{Command, Reply};
use crate::types::{EncodingVersion, KeyType, Sort};
use crate::write_buffer::{LoadToken, WriteBufferValue};
use bytes::Bytes;

pub async fn handle(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    match cmd.name().as_str() {
        "hset" => hset(ctx, slot, cmd).await,
        "hget" => hget(ctx, slot, cmd).await,
        "hdel" => hdel(ctx, slot, cmd).await,
        "hgetall" => hgetall(ctx, slot, cmd).await,
        "hlen" => hlen(ctx, slot, cmd).await,
        other => Err(ProxyError::Other(format!("not a hash command: {other}"))),
    }
}

async fn load_hash(ctx: &ProxyContext, slot: u16, key: &[u8]) -> ProxyResult<RedisHash> {
    let cache_key = ctx.keys.cache_key(slot, key);

    if let Some(wbv) = ctx.hashes.write_buffer.peek(&cache_key) {
        return Ok(wbv.value.unwrap_or_default());
    }
    if let Some(h) = ctx.hashes.lru.get_for_read(&cache_key) {
        ctx.hashes
            .write_buffer
            .put(cache_key, WriteBufferValue::present(h.clone()));
        return Ok(h);
    }

    match ctx.hashes.write_buffer.begin_load(&cache_key) {
        LoadToken::Owner => {
            let meta = ctx.meta.get_key_meta(slot, key).await?;
            let h = match meta {
                Some(m) if m.key_type == KeyType::Hash => materialize_from_kv(ctx, slot, key).await?,
                Some(_) => return Err(ProxyError::WrongType),
                None => RedisHash::new(),
            };
            ctx.hashes
                .write_buffer
                .complete_load(&cache_key, WriteBufferValue::present(h.clone()));
            ctx.hashes.lru.put_for_read(cache_key, h.clone());
            Ok(h)
        }
        LoadToken::Wait(notify) => {
            notify.notified().await;
            Box::pin(load_hash(ctx, slot, key)).await
        }
    }
}

async fn materialize_from_kv(ctx: &ProxyContext, slot: u16, key: &[u8]) -> ProxyResult<RedisHash> {
    let prefix = ctx.keys.hash_field_prefix(slot, key);
    let mut h = RedisHash::new();
    loop {
        let batch = ctx
            .kv
            .scan_by_prefix(slot, &prefix, &prefix, 1000, Sort::Asc, true)
            .await?;
        if batch.is_empty() {
            break;
        }
        let exhausted = batch.len() < 1000;
        for kv in &batch {
            if let Some(field) = ctx.keys.decode_hash_field(&kv.key, slot, key) {
                h.set(Bytes::copy_from_slice(field), kv.value.clone());
            }
        }
        if exhausted {
            break;
        }
    }
    Ok(h)
}

fn save_materialized(ctx: &ProxyContext, cache_key: Bytes, h: &RedisHash) {
    ctx.hashes
        .write_buffer
        .put(cache_key.clone(), WriteBufferValue::present(h.clone()).mark_dirty());
    ctx.hashes.lru.put_for_write(cache_key, h.clone());
}

async fn hset(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 4)?;
    if (cmd.arity() - 2) % 2 != 0 {
        return Err(ProxyError::Syntax);
    }
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?.clone();
    if let Some(existing) = ctx.meta.get_key_meta(slot, &key).await? {
        if existing.key_type != KeyType::Hash {
            return Err(ProxyError::WrongType);
        }
    }
    let cache_key = ctx.keys.cache_key(slot, &key);
    let mut h = load_hash(ctx, slot, &key).await?;

    let mut created = 0i64;
    let mut idx = 2;
    while idx + 1 < cmd.arity() {
        let field = cmd.arg(idx).ok_or(ProxyError::Syntax)?.clone();
        let value = cmd.arg(idx + 1).ok_or(ProxyError::Syntax)?.clone();
        if h.set(field.clone(), value.clone()) {
            created += 1;
        }
        let sub_key = ctx.keys.hash_field_sub_key(slot, &key, &field);
        ctx.kv.put(slot, &sub_key, value).await?;
        idx += 2;
    }

    let meta = KeyMeta::new(KeyType::Hash, EncodingVersion::V0);
    ctx.meta.put_key_meta(slot, &key, &meta).await?;
    save_materialized(ctx, cache_key, &h);
    Ok(Reply::Integer(created))
}

async fn hget(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 3)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    let field = cmd.arg(2).ok_or(ProxyError::Syntax)?;
    let h = load_hash(ctx, slot, key).await?;
    Ok(match h.get(field) {
        Some(v) => Reply::Bulk(v),
        None => Reply::Nil,
    })
}

async fn hdel(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 3)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?.clone();
    let Some(meta) = ctx.meta.get_key_meta(slot, &key).await? else {
        return Ok(Reply::Integer(0));
    };
    if meta.key_type != KeyType::Hash {
        return Err(ProxyError::WrongType);
    }
    let cache_key = ctx.keys.cache_key(slot, &key);
    let mut h = load_hash(ctx, slot, &key).await?;

    let mut removed = 0i64;
    for field in &cmd.args()[2..] {
        if h.remove(field) {
            let sub_key = ctx.keys.hash_field_sub_key(slot, &key, field);
            ctx.kv.delete(slot, &sub_key).await?;
            removed += 1;
        }
    }

    if h.is_empty() {
        ctx.meta.delete_key_meta(slot, &key).await?;
        ctx.hashes.write_buffer.evict(&cache_key);
        ctx.hashes.lru.remove(&cache_key);
    } else {
        save_materialized(ctx, cache_key, &h);
    }
    Ok(Reply::Integer(removed))
}

async fn hgetall(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 2)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    let h = load_hash(ctx, slot, key).await?;
    let mut out = Vec::with_capacity(h.len() * 2);
    for (f, v) in h.all() {
        out.push(Reply::Bulk(f));
        out.push(Reply::Bulk(v));
    }
    Ok(Reply::Array(out))
}

async fn hlen(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 2)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    let h = load_hash(ctx, slot, key).await?;
    Ok(Reply::Integer(h.len() as i64))
}
