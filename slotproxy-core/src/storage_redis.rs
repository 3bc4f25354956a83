//! The optional secondary Redis instance used by encoding v1 keys (spec.md
//! §3.3): the proxy mirrors the whole object there instead of fanning it
//! out into KV-engine sub-keys, and this module is the only thing that
//! knows how to talk to it.

use crate::error::{ProxyError, ProxyResult};
use crate::resp::{Command, Reply};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Forwarding contract to a storage Redis. Kept as a trait so commanders
/// and tests can swap in an in-memory double without a real Redis socket.
#[async_trait]
pub trait StorageRedisClient: Send + Sync {
    async fn send_command(&self, cmd: &Command) -> ProxyResult<Reply>;
}

/// A single persistent connection to the storage Redis, request/response
/// serialized behind a mutex (spec.md explicitly treats this as a
/// best-effort single-connection forwarder, not a pool — Non-goals exclude
/// connection pooling for v1 storage).
pub struct TcpStorageRedisClient {
    conn: Mutex<BufReader<TcpStream>>,
}

impl TcpStorageRedisClient {
    pub async fn connect(addr: &str) -> ProxyResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(TcpStorageRedisClient {
            conn: Mutex::new(BufReader::new(stream)),
        })
    }
}

fn encode_command(cmd: &Command, out: &mut BytesMut) {
    let builder = crate::resp::RespBuilder;
    builder.add_array_len(out, cmd.arity());
    for arg in cmd.args() {
        builder.add_bulk_string(out, arg);
    }
}

async fn read_reply(stream: &mut BufReader<TcpStream>) -> ProxyResult<Reply> {
    let mut line = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).await?;
        line.push(byte[0]);
        if line.len() >= 2 && line[line.len() - 2] == b'\r' && line[line.len() - 1] == b'\n' {
            line.truncate(line.len() - 2);
            break;
        }
    }
    if line.is_empty() {
        return Err(ProxyError::StorageRedis("empty reply".into()));
    }
    match line[0] {
        b'+' => Ok(Reply::Status(String::from_utf8_lossy(&line[1..]).into_owned())),
        b'-' => Ok(Reply::Error(String::from_utf8_lossy(&line[1..]).into_owned())),
        b':' => {
            let n: i64 = std::str::from_utf8(&line[1..])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ProxyError::StorageRedis("bad integer reply".into()))?;
            Ok(Reply::Integer(n))
        }
        b'$' => {
            let len: i64 = std::str::from_utf8(&line[1..])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ProxyError::StorageRedis("bad bulk length".into()))?;
            if len < 0 {
                return Ok(Reply::Nil);
            }
            let mut buf = vec![0u8; len as usize + 2];
            stream.read_exact(&mut buf).await?;
            buf.truncate(len as usize);
            Ok(Reply::Bulk(Bytes::from(buf)))
        }
        b'*' => {
            let len: i64 = std::str::from_utf8(&line[1..])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ProxyError::StorageRedis("bad array length".into()))?;
            if len < 0 {
                return Ok(Reply::Nil);
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(Box::pin(read_reply(stream)).await?);
            }
            Ok(Reply::Array(items))
        }
        other => Err(ProxyError::StorageRedis(format!(
            "unrecognized reply type byte {other}"
        ))),
    }
}

#[async_trait]
impl StorageRedisClient for TcpStorageRedisClient {
    async fn send_command(&self, cmd: &Command) -> ProxyResult<Reply> {
        let mut buf = BytesMut::new();
        encode_command(cmd, &mut buf);
        let mut guard = self.conn.lock().await;
        guard.get_mut().write_all(&buf).await?;
        read_reply(&mut guard).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoStorageRedis;

    #[async_trait]
    impl StorageRedisClient for EchoStorageRedis {
        async fn send_command(&self, cmd: &Command) -> ProxyResult<Reply> {
            Ok(Reply::Status(cmd.name()))
        }
    }

    #[tokio::test]
    async fn fake_client_round_trips_through_the_trait() {
        let client = EchoStorageRedis;
        let cmd = Command::new(vec![Bytes::from_static(b"GET"), Bytes::from_static(b"k")]);
        let reply = client.send_command(&cmd).await.unwrap();
        assert_eq!(reply, Reply::Status("get".into()));
    }
}
