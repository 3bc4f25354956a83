//! The sentinel cport command surface (spec.md §5.1): a small slice of the
//! real Sentinel protocol, just enough for an unmodified Redis client's
//! sentinel-aware connection logic to resolve the pseudo-master and follow
//! `+switch-master` notifications.

use super::SentinelDispatcher;
use crate::client::ClientState;
use crate::error::{ProxyError, ProxyResult};
use crate::resp::{Command, Reply};
use std::sync::Arc;

/// `client.id()` fed through `to_string()` (via the listener's peer address,
/// see `server.rs`) is the identity `master_for` hashes on (spec.md §5.3),
/// so two connections from the same address always resolve to the same
/// node; `client` also carries this connection's auth state.
pub async fn handle(
    dispatcher: &Arc<SentinelDispatcher>,
    cmd: &Command,
    client_id: &str,
    client: &ClientState,
) -> ProxyResult<Reply> {
    match cmd.name().as_str() {
        "ping" => Ok(Reply::Status("PONG".into())),
        "quit" => Ok(Reply::Ok),
        "auth" => auth(dispatcher, cmd, client),
        "hello" => hello(cmd),
        "sentinel" => {
            require_auth(dispatcher, client)?;
            sentinel(dispatcher, cmd, client_id)
        }
        "subscribe" => {
            require_auth(dispatcher, client)?;
            subscribe(cmd)
        }
        other => Err(ProxyError::Other(format!(
            "unknown sentinel command '{other}'"
        ))),
    }
}

fn require_auth(dispatcher: &Arc<SentinelDispatcher>, client: &ClientState) -> ProxyResult<()> {
    if dispatcher.requires_auth() && !client.is_authenticated() {
        return Err(ProxyError::NoAuth);
    }
    Ok(())
}

/// `AUTH password` / `AUTH username password` against the configured cport
/// credentials (spec.md §6). With no credentials configured, every `AUTH`
/// fails with `BadAuth` instead of silently succeeding.
fn auth(dispatcher: &Arc<SentinelDispatcher>, cmd: &Command, client: &ClientState) -> ProxyResult<Reply> {
    let (username, password) = match cmd.arity() {
        2 => (None, crate::commander::arg_str(cmd, 1)?),
        3 => (Some(crate::commander::arg_str(cmd, 1)?), crate::commander::arg_str(cmd, 2)?),
        _ => return Err(ProxyError::Syntax),
    };
    if dispatcher.check_auth(username, password) {
        client.set_authenticated(true);
        Ok(Reply::Ok)
    } else {
        Err(ProxyError::BadAuth)
    }
}

fn hello(cmd: &Command) -> ProxyResult<Reply> {
    if cmd.arity() < 2 {
        return Err(ProxyError::Syntax);
    }
    Ok(Reply::Array(vec![
        Reply::Bulk("server".into()),
        Reply::Bulk("sentinel".into()),
    ]))
}

/// `SENTINEL <sub-command> ...`. Only the two sub-commands clients actually
/// need to resolve and track a pseudo-master are implemented: Non-goals
/// (spec.md) exclude the rest of Sentinel's admin surface (`SENTINEL
/// FAILOVER`, `SENTINEL RESET`, etc).
fn sentinel(dispatcher: &Arc<SentinelDispatcher>, cmd: &Command, client_id: &str) -> ProxyResult<Reply> {
    if cmd.arity() < 2 {
        return Err(ProxyError::Syntax);
    }
    let sub = crate::commander::arg_str(cmd, 1)?.to_ascii_lowercase();
    match sub.as_str() {
        "get-master-addr-by-name" => {
            if cmd.arity() < 3 {
                return Err(ProxyError::Syntax);
            }
            let requested = crate::commander::arg_str(cmd, 2)?;
            if requested != dispatcher.master_name() {
                return Err(ProxyError::SentinelNotAvailable);
            }
            match dispatcher.master_for(client_id) {
                Some(node) => Ok(Reply::Array(vec![
                    Reply::Bulk(node.host.clone().into_bytes().into()),
                    Reply::Bulk(node.port.to_string().into_bytes().into()),
                ])),
                None => Err(ProxyError::SentinelNotOnline),
            }
        }
        "masters" => {
            let nodes = dispatcher.online_nodes();
            Ok(Reply::Array(
                nodes
                    .into_iter()
                    .map(|n| {
                        Reply::Array(vec![
                            Reply::Bulk("name".into()),
                            Reply::Bulk(dispatcher.master_name().to_string().into_bytes().into()),
                            Reply::Bulk("ip".into()),
                            Reply::Bulk(n.host.into_bytes().into()),
                            Reply::Bulk("port".into()),
                            Reply::Bulk(n.port.to_string().into_bytes().into()),
                        ])
                    })
                    .collect(),
            ))
        }
        other => Err(ProxyError::Other(format!("unsupported SENTINEL sub-command '{other}'"))),
    }
}

/// `SUBSCRIBE __sentinel__:hello` and friends. A full pub/sub loop lives at
/// the connection layer (`server.rs`'s `tokio::select!` over
/// `SentinelDispatcher::subscribe`); this only validates the request shape
/// and returns the RESP2 subscribe confirmation, matching how a real
/// Sentinel acknowledges before streaming `+switch-master` messages.
fn subscribe(cmd: &Command) -> ProxyResult<Reply> {
    if cmd.arity() < 2 {
        return Err(ProxyError::Syntax);
    }
    let channel = cmd.arg(1).cloned().unwrap_or_default();
    Ok(Reply::Array(vec![
        Reply::Bulk("subscribe".into()),
        Reply::Bulk(channel),
        Reply::Integer(1),
    ]))
}

/// Formats a `+switch-master` pub/sub payload (spec.md §5.3): `<master
/// name> <old ip> <old port> <new ip> <new port>`. The old address is
/// optional context this dispatcher doesn't track per-switch, so it is
/// emitted as `?` the way Sentinel does when unknown.
pub fn format_switch_master_message(master_name: &str, new_host: &str, new_port: u16) -> Reply {
    Reply::Array(vec![
        Reply::Bulk("message".into()),
        Reply::Bulk("+switch-master".into()),
        Reply::Bulk(format!("{master_name} ? ? {new_host} {new_port}").into_bytes().into()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentinel::{NodeProvider, ProxyNode, StaticNodeProvider};
    use bytes::Bytes;
    use std::time::Duration;

    fn cmd(parts: &[&str]) -> Command {
        Command::new(parts.iter().map(|s| Bytes::copy_from_slice(s.as_bytes())).collect())
    }

    fn dispatcher(provider: Arc<dyn NodeProvider>) -> Arc<SentinelDispatcher> {
        SentinelDispatcher::new(
            "proxy_sentinel".into(),
            provider,
            Duration::from_secs(5),
            Duration::from_secs(20),
            None,
            None,
        )
    }

    #[test]
    fn get_master_addr_rejects_unknown_name() {
        let d = dispatcher(Arc::new(StaticNodeProvider::new(vec![])));
        let err = sentinel(&d, &cmd(&["sentinel", "get-master-addr-by-name", "other"]), "client-1").unwrap_err();
        assert!(matches!(err, ProxyError::SentinelNotAvailable));
    }

    #[test]
    fn get_master_addr_returns_host_port_once_elected() {
        let d = dispatcher(Arc::new(StaticNodeProvider::new(vec![ProxyNode {
            id: "a".into(),
            host: "10.0.0.1".into(),
            port: 7001,
        }])));
        d.record_heartbeat("a");
        d.tick();
        let reply = sentinel(&d, &cmd(&["sentinel", "get-master-addr-by-name", "proxy_sentinel"]), "client-1").unwrap();
        assert_eq!(
            reply,
            Reply::Array(vec![
                Reply::Bulk(Bytes::from_static(b"10.0.0.1")),
                Reply::Bulk(Bytes::from_static(b"7001")),
            ])
        );
    }

    #[test]
    fn get_master_addr_errors_when_nothing_is_online() {
        let d = dispatcher(Arc::new(StaticNodeProvider::new(vec![ProxyNode {
            id: "a".into(),
            host: "10.0.0.1".into(),
            port: 7001,
        }])));
        // never heartbeat'd, so nothing is online.
        let err = sentinel(&d, &cmd(&["sentinel", "get-master-addr-by-name", "proxy_sentinel"]), "client-1").unwrap_err();
        assert!(matches!(err, ProxyError::SentinelNotOnline));
    }

    #[test]
    fn subscribe_acknowledges_requested_channel() {
        let reply = subscribe(&cmd(&["subscribe", "__sentinel__:hello"])).unwrap();
        assert_eq!(
            reply,
            Reply::Array(vec![
                Reply::Bulk(Bytes::from_static(b"subscribe")),
                Reply::Bulk(Bytes::from_static(b"__sentinel__:hello")),
                Reply::Integer(1),
            ])
        );
    }

    #[tokio::test]
    async fn auth_fails_when_no_credentials_configured() {
        let d = dispatcher(Arc::new(StaticNodeProvider::new(vec![])));
        let client = ClientState::new(1, d.requires_auth());
        let err = handle(&d, &cmd(&["auth", "hunter2"]), "client-1", &client).await.unwrap_err();
        assert!(matches!(err, ProxyError::BadAuth));
    }

    #[tokio::test]
    async fn auth_succeeds_with_matching_password_and_unlocks_sentinel_commands() {
        let d = SentinelDispatcher::new(
            "proxy_sentinel".into(),
            Arc::new(StaticNodeProvider::new(vec![])),
            Duration::from_secs(5),
            Duration::from_secs(20),
            None,
            Some("hunter2".into()),
        );
        let client = ClientState::new(1, d.requires_auth());
        let reply = handle(&d, &cmd(&["auth", "hunter2"]), "client-1", &client).await.unwrap();
        assert_eq!(reply, Reply::Ok);
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn sentinel_command_requires_auth_when_configured() {
        let d = SentinelDispatcher::new(
            "proxy_sentinel".into(),
            Arc::new(StaticNodeProvider::new(vec![])),
            Duration::from_secs(5),
            Duration::from_secs(20),
            None,
            Some("hunter2".into()),
        );
        let client = ClientState::new(1, d.requires_auth());
        let err = handle(&d, &cmd(&["sentinel", "masters"]), "client-1", &client).await.unwrap_err();
        assert!(matches!(err, ProxyError::NoAuth));
    }
}
