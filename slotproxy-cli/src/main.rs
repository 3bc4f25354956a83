//! Small operational CLI, mirroring the teacher's companion `sb` binary:
//! point it at a data directory or a running proxy and ask a narrow,
//! specific question instead of running the full server.

use clap::{Parser, Subcommand};
use slotproxy_core::kv::RocksDbKvEngine;
use slotproxy_core::metadata::{KvMetadataStore, MetadataStore};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(name = "slotproxy-cli")]
struct Args {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Dump a key's metadata record straight from the KV engine's data
    /// directory (no running server needed).
    MetaGet {
        #[arg(long)]
        data_dir: String,
        #[arg(long)]
        slot: u16,
        key: String,
    },
    /// Ask a running proxy's sentinel cport who the current pseudo-master
    /// is (spec.md §5.1 `SENTINEL get-master-addr-by-name`).
    SentinelMaster {
        #[arg(long)]
        addr: String,
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    match args.command {
        CliCommand::MetaGet { data_dir, slot, key } => meta_get(&data_dir, slot, &key).await,
        CliCommand::SentinelMaster { addr, name } => sentinel_master(&addr, &name).await,
    }
}

async fn meta_get(data_dir: &str, slot: u16, key: &str) -> anyhow::Result<()> {
    let kv = Arc::new(RocksDbKvEngine::open(data_dir)?);
    let store = KvMetadataStore::new(kv);
    match store.get_key_meta(slot, key.as_bytes()).await? {
        Some(meta) => {
            println!("type={:?}", meta.key_type);
            println!("encoding_version={:?}", meta.encoding_version);
            println!("expire_at_ms={:?}", meta.expire_at_ms);
            if meta.key_type == slotproxy_core::types::KeyType::ZSet {
                println!("zset_count={}", meta.zset_count());
            }
        }
        None => println!("(key not found)"),
    }
    Ok(())
}

async fn sentinel_master(addr: &str, name: &str) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    let mut request = Vec::new();
    let parts = ["SENTINEL", "get-master-addr-by-name", name];
    request.extend_from_slice(format!("*{}\r\n", parts.len()).as_bytes());
    for part in parts {
        request.extend_from_slice(format!("${}\r\n{}\r\n", part.len(), part).as_bytes());
    }
    stream.write_all(&request).await?;

    let mut buf = vec![0u8; 4096];
    let n = stream.read(&mut buf).await?;
    println!("{}", String::from_utf8_lossy(&buf[..n]));
    Ok(())
}
