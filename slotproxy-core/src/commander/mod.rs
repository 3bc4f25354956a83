//! Command dispatch (spec.md §4.5): parse RESP arguments into a typed
//! request, try a non-blocking fast path, and fall through to the full
//! tiered path when the fast path can't resolve (spec.md §9 design note:
//! `run_to_completion` returning "would block" must never be conflated with
//! "definitively absent", see [`crate::types::ValueWrapper`]).
//!
//! The dispatch shape mirrors the teacher's `GenericCommands::handle_command`
//! (match on command name, build the RESP reply into a buffer) generalized
//! to return a [`Reply`] value instead of writing directly into a
//! connection's output buffer, and to hold `Arc`-shared state instead of
//! the teacher's per-connection `Rc<ClientState>` since this proxy's
//! tiers are shared across every concurrent client.

pub mod generic;
pub mod hash;
pub mod set;
pub mod string;
pub mod zset;

use crate::error::{ProxyError, ProxyResult};
use crate::keys::KeyDesign;
use crate::kv::KvEngine;
use crate::lru_cache::LruTier;
use crate::metadata::MetadataStore;
use crate::objects::{RedisHash, RedisSet, RedisZSet};
use crate::resp::{Command, Reply};
use crate::storage_redis::StorageRedisClient;
use crate::types::EncodingVersion;
use crate::write_buffer::WriteBuffer;
use bytes::Bytes;
use std::sync::Arc;

/// A command family's non-blocking fast path plus its full tiered path
/// (spec.md §4.5/§9). `run_to_completion` may only consult metadata, the
/// write buffer and the LRU tier — never the KV engine or storage Redis —
/// so `None` ("would block, take the slow path") is never conflated with
/// `Some(Ok(Reply::Nil))` ("definitively absent"), mirroring the
/// `ValueWrapper` discipline in [`crate::types`].
#[async_trait::async_trait]
pub trait Commander {
    fn run_to_completion(&self, ctx: &ProxyContext, slot: u16, cmd: &Command) -> Option<ProxyResult<Reply>>;

    async fn execute(&self, ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply>;
}

/// The write-buffer/LRU pair for one materialized object type (spec.md
/// §4.3/§4.4): every command family owns exactly one of these.
pub struct Tiers<T: Clone> {
    pub write_buffer: WriteBuffer<T>,
    pub lru: LruTier<T>,
}

impl<T: Clone> Tiers<T> {
    pub fn new(lru_capacity: usize, hot_key_threshold: u32) -> Self {
        Tiers {
            write_buffer: WriteBuffer::new(),
            lru: LruTier::new(lru_capacity, hot_key_threshold),
        }
    }
}

/// Everything a commander needs, shared by every connection (spec.md §4).
/// Trait objects (`dyn KvEngine`, `dyn MetadataStore`) rather than a generic
/// parameter keep the dispatcher and the per-command modules free of a
/// backend type parameter threading through every signature.
pub struct ProxyContext {
    pub kv: Arc<dyn KvEngine>,
    pub meta: Arc<dyn MetadataStore>,
    pub keys: Arc<KeyDesign>,
    pub zsets: Tiers<RedisZSet>,
    pub hashes: Tiers<RedisHash>,
    pub sets: Tiers<RedisSet>,
    pub strings: Tiers<Bytes>,
    pub storage_redis: Option<Arc<dyn StorageRedisClient>>,
    /// Encoding version given to a zset key the first time it's created
    /// (spec.md §4.1/§4.6: the choice is made once, at creation, and is
    /// immutable after that).
    pub default_zset_encoding: EncodingVersion,
}

impl ProxyContext {
    pub fn new(
        kv: Arc<dyn KvEngine>,
        meta: Arc<dyn MetadataStore>,
        keys: Arc<KeyDesign>,
        lru_capacity: usize,
        hot_key_threshold: u32,
    ) -> Self {
        ProxyContext {
            kv,
            meta,
            keys,
            zsets: Tiers::new(lru_capacity, hot_key_threshold),
            hashes: Tiers::new(lru_capacity, hot_key_threshold),
            sets: Tiers::new(lru_capacity, hot_key_threshold),
            strings: Tiers::new(lru_capacity, hot_key_threshold),
            storage_redis: None,
            default_zset_encoding: EncodingVersion::V0,
        }
    }

    pub fn with_storage_redis(mut self, client: Arc<dyn StorageRedisClient>) -> Self {
        self.storage_redis = Some(client);
        self
    }

    pub fn with_default_zset_encoding(mut self, version: EncodingVersion) -> Self {
        self.default_zset_encoding = version;
        self
    }
}

/// Dispatches one parsed RESP command against `ctx`, returning the reply to
/// send back. Unknown commands get the standard Redis "unknown command"
/// shape (spec.md §7).
pub async fn dispatch(ctx: &ProxyContext, slot: u16, cmd: &Command) -> Reply {
    match execute(ctx, slot, cmd).await {
        Ok(reply) => reply,
        Err(err) => Reply::Error(err.to_resp_message()),
    }
}

async fn execute(ctx: &ProxyContext, slot: u16, cmd: &Command) -> ProxyResult<Reply> {
    match cmd.name().as_str() {
        "ttl" | "del" | "exists" | "expire" => generic::handle(ctx, slot, cmd).await,
        "get" | "set" => string::handle(ctx, slot, cmd).await,
        "hset" | "hget" | "hdel" | "hgetall" | "hlen" => hash::handle(ctx, slot, cmd).await,
        "sadd" | "srem" | "smembers" | "scard" | "sismember" => set::handle(ctx, slot, cmd).await,
        "zadd" | "zrem" | "zcard" | "zscore" | "zincrby" | "zcount" | "zrange" | "zrevrange"
        | "zrangebyscore" | "zrevrangebyscore" | "zrangebylex" | "zrevrangebylex" | "zrank"
        | "zrevrank" | "zmscore" | "zremrangebylex" | "zremrangebyscore" | "zremrangebyrank" => {
            let commander = zset::ZsetCommander;
            match commander.run_to_completion(ctx, slot, cmd) {
                Some(result) => result,
                None => commander.execute(ctx, slot, cmd).await,
            }
        }
        other => Err(ProxyError::Other(format!(
            "unknown command '{other}'"
        ))),
    }
}

/// Shared arg-count guard, mirroring the teacher's `check_args_count!`
/// macro but as a plain function since our commands return `Result`
/// instead of writing directly into a response buffer.
pub(crate) fn require_arity(cmd: &Command, min: usize) -> ProxyResult<()> {
    if cmd.arity() < min {
        return Err(ProxyError::SyntaxMsg(format!(
            "wrong number of arguments for '{}' command",
            cmd.name()
        )));
    }
    Ok(())
}

pub(crate) fn arg_str(cmd: &Command, idx: usize) -> ProxyResult<&str> {
    let raw = cmd.arg(idx).ok_or(ProxyError::Syntax)?;
    std::str::from_utf8(raw).map_err(|_| ProxyError::Syntax)
}

pub(crate) fn arg_f64(cmd: &Command, idx: usize) -> ProxyResult<f64> {
    let s = arg_str(cmd, idx)?;
    s.parse::<f64>().map_err(|_| ProxyError::Other("value is not a valid float".into()))
}

pub(crate) fn arg_i64(cmd: &Command, idx: usize) -> ProxyResult<i64> {
    let s = arg_str(cmd, idx)?;
    s.parse::<i64>().map_err(|_| ProxyError::Other("value is not an integer or out of range".into()))
}
