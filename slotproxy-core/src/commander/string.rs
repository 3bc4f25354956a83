//! `GET`/`SET` (spec.md supplemented minimal string family). The string
//! tier's materialized object is just `Bytes`, so there is no range-scan
//! materialization step: the whole value is one write-buffer/LRU entry.

use super::{require_arity, ProxyContext};
use crate::error::{ProxyError, ProxyResult};
use crate::metadata::KeyMeta;
use crate::resp::{Command, Reply};
use crate::types::{EncodingVersion, KeyType};
use crate::write_buffer::{LoadToken, WriteBufferValue};
use bytes::Bytes;

pub async fn handle(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    match cmd.name().as_str() {
        "get" => get(ctx, slot, cmd).await,
        "set" => set(ctx, slot, cmd).await,
        other => Err(ProxyError::Other(format!("not a string command: {other}"))),
    }
}

async fn load_string(ctx: &ProxyContext, slot: u16, key: &[u8]) -> ProxyResult<Option<Bytes>> {
    let cache_key = ctx.keys.cache_key(slot, key);

    if let Some(wbv) = ctx.strings.write_buffer.peek(&cache_key) {
        return Ok(wbv.value);
    }
    if let Some(v) = ctx.strings.lru.get_for_read(&cache_key) {
        ctx.strings
            .write_buffer
            .put(cache_key, WriteBufferValue::present(v.clone()));
        return Ok(Some(v));
    }

    match ctx.strings.write_buffer.begin_load(&cache_key) {
        LoadToken::Owner => {
            let meta = ctx.meta.get_key_meta(slot, key).await?;
            let value = match meta {
                Some(m) if m.key_type == KeyType::String => ctx.kv.get(slot, key).await?,
                Some(_) => return Err(ProxyError::WrongType),
                None => None,
            };
            let wbv = match &value {
                Some(v) => WriteBufferValue::present(v.clone()),
                None => WriteBufferValue::absent(),
            };
            ctx.strings.write_buffer.complete_load(&cache_key, wbv);
            if let Some(v) = &value {
                ctx.strings.lru.put_for_read(cache_key, v.clone());
            }
            Ok(value)
        }
        LoadToken::Wait(notify) => {
            notify.notified().await;
            Box::pin(load_string(ctx, slot, key)).await
        }
    }
}

async fn get(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 2)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?;
    Ok(match load_string(ctx, slot, key).await? {
        Some(v) => Reply::Bulk(v),
        None => Reply::Nil,
    })
}

async fn set(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    require_arity(cmd, 3)?;
    let key = cmd.arg(1).ok_or(ProxyError::Syntax)?.clone();
    let value = cmd.arg(2).ok_or(ProxyError::Syntax)?.clone();

    if let Some(existing) = ctx.meta.get_key_meta(slot, &key).await? {
        if existing.key_type != KeyType::String {
            return Err(ProxyError::WrongType);
        }
    }

    ctx.kv.put(slot, &key, value.clone()).await?;
    let meta = KeyMeta::new(KeyType::String, EncodingVersion::V0);
    ctx.meta.put_key_meta(slot, &key, &meta).await?;

    let cache_key = ctx.keys.cache_key(slot, &key);
    ctx.strings
        .write_buffer
        .put(cache_key.clone(), WriteBufferValue::present(value.clone()).mark_dirty());
    ctx.strings.lru.put_for_write(cache_key, value);
    Ok(Reply::Ok)
}
