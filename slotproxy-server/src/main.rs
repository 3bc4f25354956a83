//! Server binary: wires configuration, the KV engine, the optional storage
//! Redis, and both listeners (the Redis-protocol front door and the
//! sentinel cport) into one running process.

use clap::Parser;
use slotproxy_core::commander::ProxyContext;
use slotproxy_core::config::ProxyConfig;
use slotproxy_core::kv::{KvEngine, RocksDbKvEngine};
use slotproxy_core::metadata::{KvMetadataStore, MetadataStore};
use slotproxy_core::sentinel::{ProxyNode, SentinelDispatcher, StaticNodeProvider};
use slotproxy_core::server::{run_redis_listener, run_sentinel_listener};
use slotproxy_core::storage_redis::TcpStorageRedisClient;
use slotproxy_core::types::EncodingVersion;
use slotproxy_core::KeyDesign;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "slotproxy-server")]
struct Args {
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = ProxyConfig::load(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&cfg.log_level))
        .init();

    tracing::info!(?cfg.listen_addr, ?cfg.sentinel_listen_addr, "starting slotproxy-server");

    let kv_engine = Arc::new(RocksDbKvEngine::open(&cfg.data_dir)?);
    let meta: Arc<dyn MetadataStore> = Arc::new(KvMetadataStore::new(kv_engine.clone()));
    let kv: Arc<dyn KvEngine> = kv_engine;
    let keys = Arc::new(KeyDesign::new(cfg.namespace));

    let mut ctx = ProxyContext::new(kv, meta, keys, cfg.lru.capacity, cfg.lru.hot_key_threshold);
    if let Some(addr) = &cfg.storage_redis_addr {
        let client = TcpStorageRedisClient::connect(addr).await?;
        ctx = ctx.with_storage_redis(Arc::new(client));
    }
    let default_zset_encoding = if cfg.zset_storage_redis_encoding {
        EncodingVersion::V1
    } else {
        EncodingVersion::V0
    };
    let ctx = Arc::new(ctx.with_default_zset_encoding(default_zset_encoding));

    let self_node = ProxyNode {
        id: cfg.listen_addr.to_string(),
        host: cfg.listen_addr.ip().to_string(),
        port: cfg.listen_addr.port(),
    };
    let provider = Arc::new(StaticNodeProvider::new(vec![self_node.clone()]));
    let dispatcher = SentinelDispatcher::new(
        cfg.master_name.clone(),
        provider,
        cfg.heartbeat_interval(),
        cfg.heartbeat_timeout(),
        cfg.sentinel_username.clone(),
        cfg.sentinel_password.clone(),
    );
    dispatcher.record_heartbeat(&self_node.id);

    let redis_addr = cfg.listen_addr;
    let sentinel_addr = cfg.sentinel_listen_addr;
    tokio::try_join!(
        async { run_redis_listener(redis_addr, ctx).await.map_err(anyhow::Error::from) },
        async {
            run_sentinel_listener(sentinel_addr, dispatcher)
                .await
                .map_err(anyhow::Error::from)
        },
    )?;
    Ok(())
}
