//! Connection accept loops (spec.md §4.5/§5.1), adapted from the teacher's
//! `Server`/`ServerState` shape: one `tokio` accept loop per listener,
//! handing each connection its own `ClientState` and a shared
//! `Arc<ProxyContext>` / `Arc<SentinelDispatcher>`.

use crate::client::ClientState;
use crate::commander::{dispatch, ProxyContext};
use crate::resp::{parse_command, RespBuilder};
use crate::sentinel::{protocol as sentinel_protocol, ProxyNode, SentinelDispatcher, SentinelEvent};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Accepts Redis client connections and dispatches every parsed command
/// through `ctx` until the socket closes.
pub async fn run_redis_listener(addr: std::net::SocketAddr, ctx: Arc<ProxyContext>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "redis listener bound");
    loop {
        let (socket, peer) = listener.accept().await?;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tracing::debug!(%peer, "client connected");
            if let Err(e) = serve_redis_connection(socket, ctx).await {
                tracing::debug!(%peer, error = %e, "client connection ended");
            }
        });
    }
}

async fn serve_redis_connection(mut socket: TcpStream, ctx: Arc<ProxyContext>) -> std::io::Result<()> {
    let client = ClientState::new(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed), false);
    let builder = RespBuilder;
    let mut inbound = BytesMut::with_capacity(4096);
    let mut outbound = BytesMut::with_capacity(4096);
    let mut read_buf = [0u8; 4096];

    loop {
        let n = socket.read(&mut read_buf).await?;
        if n == 0 {
            return Ok(());
        }
        inbound.extend_from_slice(&read_buf[..n]);

        while let Ok(Some(cmd)) = parse_command(&mut inbound) {
            let slot = client.slot();
            let reply = dispatch(&ctx, slot, &cmd).await;
            builder.encode(&reply, &mut outbound);
        }
        if !outbound.is_empty() {
            socket.write_all(&outbound).await?;
            outbound.clear();
        }
    }
}

/// Accepts sentinel cport connections (spec.md §5.1), runs the heartbeat
/// loop for `dispatcher`, and serves the small sentinel command surface.
pub async fn run_sentinel_listener(
    addr: std::net::SocketAddr,
    dispatcher: Arc<SentinelDispatcher>,
) -> std::io::Result<()> {
    dispatcher.spawn_heartbeat_loop();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "sentinel cport listener bound");
    loop {
        let (socket, peer) = listener.accept().await?;
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            tracing::debug!(%peer, "sentinel client connected");
            if let Err(e) = serve_sentinel_connection(socket, dispatcher, peer).await {
                tracing::debug!(%peer, error = %e, "sentinel connection ended");
            }
        });
    }
}

/// Serves one cport connection: reads and dispatches sentinel commands, and
/// concurrently relays `+switch-master` to this connection once it has
/// `SUBSCRIBE`d and the dispatcher reports a membership change that moves
/// *this client's* deterministic master pick (spec.md §5.3/§5.4). `peer` is
/// this connection's selection key, not just a logging label.
async fn serve_sentinel_connection(
    socket: TcpStream,
    dispatcher: Arc<SentinelDispatcher>,
    peer: SocketAddr,
) -> std::io::Result<()> {
    let client_id = peer.to_string();
    let client = ClientState::new(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed), dispatcher.requires_auth());
    let builder = RespBuilder;
    let (mut rd, mut wr) = tokio::io::split(socket);
    let mut inbound = BytesMut::with_capacity(4096);
    let mut outbound = BytesMut::with_capacity(4096);
    let mut read_buf = [0u8; 4096];
    let mut events = dispatcher.subscribe();
    let mut subscribed = false;
    let mut last_master: Option<ProxyNode> = None;

    loop {
        tokio::select! {
            result = rd.read(&mut read_buf) => {
                let n = result?;
                if n == 0 {
                    return Ok(());
                }
                inbound.extend_from_slice(&read_buf[..n]);

                while let Ok(Some(cmd)) = parse_command(&mut inbound) {
                    if cmd.name().as_str() == "subscribe" {
                        subscribed = true;
                        last_master = dispatcher.master_for(&client_id);
                    }
                    let reply = match sentinel_protocol::handle(&dispatcher, &cmd, &client_id, &client).await {
                        Ok(r) => r,
                        Err(e) => crate::resp::Reply::Error(e.to_resp_message()),
                    };
                    builder.encode(&reply, &mut outbound);
                }
                if !outbound.is_empty() {
                    wr.write_all(&outbound).await?;
                    outbound.clear();
                }
            }
            event = events.recv() => {
                if !subscribed {
                    continue;
                }
                if let Ok(SentinelEvent::MembershipChanged { .. }) = event {
                    let new_master = dispatcher.master_for(&client_id);
                    if new_master != last_master {
                        if let Some(ref node) = new_master {
                            let msg = sentinel_protocol::format_switch_master_message(
                                dispatcher.master_name(),
                                &node.host,
                                node.port,
                            );
                            builder.encode(&msg, &mut outbound);
                            wr.write_all(&outbound).await?;
                            outbound.clear();
                        }
                        last_master = new_master;
                    }
                }
            }
        }
    }
}
