//! `SADD`/`SREM`/`SMEMBERS`/`SCARD`/`SISMEMBER` (spec.md supplemented
//! minimal set family). Same tiered-fallthrough shape as [`super::hash`].

use super::{require_arity, ProxyContext};
use crate::error::{ProxyError, ProxyResult};
use crate::metadata::KeyMeta;
use crate::objects::RedisSet;
use crate::resp::{Command, Reply};
use crate::types::{EncodingVersion, KeyType, Sort};
use crate::write_buffer::{LoadToken, WriteBufferValue};
use bytes::Bytes;

pub async fn handle(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    match cmd.name().as_str() {
        "sadd" => sadd(ctx, slot, cmd).await,
        "srem" => srem(ctx, slot, cmd).await,
        "smembers" => smembers(ctx, slot, cmd).await,
        "scard" => scard(ctx, slot, cmd).await,
        "sismember" => sismember(ctx, slot, cmd).await,
        other => Err(ProxyError::Other(format!("not a set command: {other}"))),
    }
}

async fn load_set(ctx: &ProxyContext, slot: u16, key: &[u8]) -> ProxyResult<RedisSet> {
    let cache_key = ctx.keys.cache_key(slot, key);

    if let Some(wbv) = ctx.sets.write_buffer.peek(&cache_key) {
        return Ok(wbv.value.unwrap_or_default());
    }
    if let Some(s) = ctx.sets.lru.get_for_read(&cache_key) {
        ctx.sets
            .write_buffer
            .put(cache_key, WriteBufferValue::present(s.clone()));
        return Ok(s);
    }

    match ctx.sets.write_buffer.begin_load(&cache_key) {
        LoadToken::Owner => {
            let meta = ctx.meta.get_key_meta(slot, key).await?;
            let s = match meta {
                Some(m) if m.key_type == KeyType::Set => materialize_from_kv(ctx, slot, key).await?,
                Some(_) => return Err(ProxyError::WrongType),
                None => RedisSet::new(),
            };
            ctx.sets
                .write_buffer
                .complete_load(&cache_key, WriteBufferValue::present(s.clone()));
            ctx.sets.lru.put_for_read(cache_key, s.clone());
            Ok(s)
        }
        LoadToken::Wait(notify) => {
            notify.notified().await;
            Box::pin(load_set(ctx, slot, key)).await
        }
    }
}

async fn materialize_from_kv(ctx: &ProxyContext, slot: u16, key: &[u8]) -> ProxyResult<RedisSet> {
    let prefix = ctx.keys.set_member_prefix(slot, key);
    let mut s = RedisSet::new();
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
            if let Some(member) = ctx.keys.decode_set_member(&kv.key, slot, key) {
                s.add(Bytes::copy_from_slice(member));
            }
        }
        if exhausted {
            break;
        }
    }
    Ok(s)
}

fn save_materialized(ctx: &ProxyContext, cache_key: Bytes, s: &RedisSet) {
    ctx.sets
        .write_buffer
        .put(cache_key.clone(), WriteBufferValue::present(s.clone()).mark_dirty());
    ctx.sets.lru.put_for_write(cache_key, s.clone());
}

async fn sadd(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 3)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?.clone();
    if let Some(existing) = ctx.meta.get_key_meta(slot, &key).await? {
        if existing.key_type != KeyType::Set {
            return Err(ProxyError::WrongType);
        }
    }
    let cache_key = ctx.keys.cache_key(slot, &key);
    let mut s = load_set(ctx, slot, &key).await?;

    let mut added = 0i64;
    for member in &cmd.args()[2..] {
        if s.add(member.clone()) {
            let sub_key = ctx.keys.set_member_sub_key(slot, &key, member);
            ctx.kv.put(slot, &sub_key, Bytes::new()).await?;
            added += 1;
        }
    }

    let meta = KeyMeta::new(KeyType::Set, EncodingVersion::V0);
    ctx.meta.put_key_meta(slot, &key, &meta).await?;
    save_materialized(ctx, cache_key, &s);
    Ok(Reply::Integer(added))
}

async fn srem(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 3)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?.clone();
    let Some(meta) = ctx.meta.get_key_meta(slot, &key).await? else {
        return Ok(Reply::Integer(0));
    };
    if meta.key_type != KeyType::Set {
        return Err(ProxyError::WrongType);
    }
    let cache_key = ctx.keys.cache_key(slot, &key);
    let mut s = load_set(ctx, slot, &key).await?;

    let mut removed = 0i64;
    for member in &cmd.args()[2..] {
        if s.remove(member) {
            let sub_key = ctx.keys.set_member_sub_key(slot, &key, member);
            ctx.kv.delete(slot, &sub_key).await?;
            removed += 1;
        }
    }

    if s.is_empty() {
        ctx.meta.delete_key_meta(slot, &key).await?;
        ctx.sets.write_buffer.evict(&cache_key);
        ctx.sets.lru.remove(&cache_key);
    } else {
        save_materialized(ctx, cache_key, &s);
    }
    Ok(Reply::Integer(removed))
}

async fn smembers(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 2)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    let s = load_set(ctx, slot, key).await?;
    Ok(Reply::array_of_bulks(s.members().into_iter().map(Some)))
}

async fn scard(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 2)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    let s = load_set(ctx, slot, key).await?;
    Ok(Reply::Integer(s.len() as i64))
}

async fn sismember(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 3)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    let member = cmd.arg(2).ok_or(ProxyError::Syntax)?;
    let s = load_set(ctx, slot, key).await?;
    Ok(Reply::Integer(if s.contains(member) { 1 } else { 0 }))
}
