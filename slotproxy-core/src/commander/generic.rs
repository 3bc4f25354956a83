//! Key-type-agnostic commands: `TTL`, `DEL`, `EXISTS`, `EXPIRE` (spec.md
//! §4.5, supplemented set). Adapted from the teacher's
//! `GenericCommands::handle_command`, generalized from Redis's native type
//! tags to this proxy's `KeyType`/`KeyMeta` pair and across all four tiers
//! instead of the teacher's string/list split.

use super::{arg_i64, require_arity, ProxyContext};
use crate::error::{ProxyError, ProxyResult};
use crate::resp::{Command, Reply};
use std::time::{SystemTime, UNIX_EPOCH};

pub async fn handle(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    match cmd.name().as_str() {
        "ttl" => ttl(ctx, slot, cmd).await,
        "del" => del(ctx, slot, cmd).await,
        "exists" => exists(ctx, slot, cmd).await,
        "expire" => expire(ctx, slot, cmd).await,
        other => Err(ProxyError::Other(format!("not a generic command: {other}"))),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

async fn ttl(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 2)?;
    let key = cmd.arg(1).ok_or(crate::error::ProxyError::Syntax)?;
    match ctx.meta.get_key_meta(slot, key).await? {
        None => Ok(Reply::Integer(-2)),
        Some(meta) => match meta.expire_at_ms {
            None => Ok(Reply::Integer(-1)),
            Some(t) => {
                let remaining_ms = t.saturating_sub(now_ms());
                Ok(Reply::Integer((remaining_ms / 1000) as i64))
            }
        },
    }
}

/// O(N) in the number of keys named, each deletion itself O(M) in the
/// number of sub-keys that key owns (teacher doc comment on `del`,
/// generalized from list-member count to sub-key count).
async fn del(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 2)?;
    let mut deleted = 0i64;
    for key in &cmd.args()[1..] {
        if delete_one(ctx, slot, key).await? {
            deleted += 1;
        }
    }
    Ok(Reply::Integer(deleted))
}

async fn delete_one(ctx: &ProxyContext, slot: u16, key: &[u8]) -> ProxyResult<bool> {
    use crate::types::KeyType;

    let Some(meta) = ctx.meta.get_key_meta(slot, key).await? else {
        return Ok(false);
    };
    let cache_key = ctx.keys.cache_key(slot, key);
    match meta.key_type {
        KeyType::ZSet => {
            ctx.zsets.write_buffer.evict(&cache_key);
            ctx.zsets.lru.remove(&cache_key);
            super::zset::delete_all_sub_keys(ctx, slot, key, &meta).await?;
        }
        KeyType::Hash => {
            ctx.hashes.write_buffer.evict(&cache_key);
            ctx.hashes.lru.remove(&cache_key);
            let prefix = ctx.keys.hash_field_prefix(slot, key);
            delete_by_prefix(ctx, slot, &prefix).await?;
        }
        KeyType::Set => {
            ctx.sets.write_buffer.evict(&cache_key);
            ctx.sets.lru.remove(&cache_key);
            let prefix = ctx.keys.set_member_prefix(slot, key);
            delete_by_prefix(ctx, slot, &prefix).await?;
        }
        KeyType::String => {
            ctx.strings.write_buffer.evict(&cache_key);
            ctx.strings.lru.remove(&cache_key);
        }
    }
    ctx.meta.delete_key_meta(slot, key).await?;
    Ok(true)
}

async fn delete_by_prefix(ctx: &ProxyContext, slot: u16, prefix: &bytes::Bytes) -> ProxyResult<()> {
    loop {
        let batch = ctx
            .kv
            .scan_by_prefix(slot, prefix, prefix, 1000, crate::types::Sort::Asc, true)
            .await?;
        if batch.is_empty() {
            return Ok(());
        }
        let keys: Vec<_> = batch.iter().map(|kv| kv.key.clone()).collect();
        let done = keys.len() < 1000;
        ctx.kv.batch_delete(slot, &keys).await?;
        if done {
            return Ok(());
        }
    }
}

async fn exists(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 2)?;
    let mut count = 0i64;
    for key in &cmd.args()[1..] {
        if ctx.meta.get_key_meta(slot, key).await?.is_some() {
            count += 1;
        }
    }
    Ok(Reply::Integer(count))
}

async fn expire(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 3)?;
    let key = cmd.arg(1).ok_or(crate::error::ProxyError::Syntax)?.clone();
    let seconds = arg_i64(cmd, 2)?;
    let Some(mut meta) = ctx.meta.get_key_meta(slot, &key).await? else {
        return Ok(Reply::Integer(0));
    };
    meta.expire_at_ms = Some(now_ms().saturating_add((seconds.max(0) as u64).saturating_mul(1000)));
    ctx.meta.put_key_meta(slot, &key, &meta).await?;
    Ok(Reply::Integer(1))
}
