//! The sentinel dispatcher (spec.md §5): the proxy cluster answers a
//! standard Redis Sentinel quorum's cport protocol so unmodified Redis
//! clients can discover "the master" the same way they'd discover a real
//! Sentinel-managed primary, except the pseudo-master here is whichever
//! proxy node a deterministic hash currently names, not a replicated
//! primary. Grounded on the teacher's `ServerState`'s `DashMap`-backed
//! membership/broadcast shape in `server.rs`, generalized from worker
//! threads to cluster peers.

pub mod protocol;

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// One proxy node as seen by the sentinel dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyNode {
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl ProxyNode {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Supplies the fixed cluster membership the sentinel dispatcher heartbeats
/// against. A trait so tests can swap in a static list instead of a real
/// discovery mechanism (spec.md Non-goals exclude dynamic membership
/// changes while the dispatcher is running).
pub trait NodeProvider: Send + Sync {
    fn nodes(&self) -> Vec<ProxyNode>;
}

pub struct StaticNodeProvider {
    nodes: Vec<ProxyNode>,
}

impl StaticNodeProvider {
    pub fn new(nodes: Vec<ProxyNode>) -> Self {
        StaticNodeProvider { nodes }
    }
}

impl NodeProvider for StaticNodeProvider {
    fn nodes(&self) -> Vec<ProxyNode> {
        self.nodes.clone()
    }
}

/// `+switch-master` and friends (spec.md §5.3): the dispatcher publishes on
/// this channel whenever the online node set changes, i.e. whenever any
/// client's per-client master pick could have changed. Each subscribed
/// connection recomputes its own pick from [`SentinelDispatcher::master_for`]
/// and only relays `+switch-master` to its client if that client's own
/// answer actually moved.
#[derive(Debug, Clone)]
pub enum SentinelEvent {
    MembershipChanged { epoch: u64 },
}

struct NodeHealth {
    last_heartbeat: std::sync::Mutex<Instant>,
}

/// Tracks cluster membership health and drives the heartbeat loop (spec.md
/// §5.2/§5.4). There is no single cluster-wide pseudo-master: each client
/// gets its own deterministic pick via `master_for`, keyed by client
/// identity, so load spreads across online nodes instead of funnelling
/// every client onto one (spec.md §5.3).
pub struct SentinelDispatcher {
    master_name: String,
    provider: Arc<dyn NodeProvider>,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    health: DashMap<String, NodeHealth>,
    last_online: std::sync::Mutex<Vec<ProxyNode>>,
    epoch: AtomicU64,
    events: broadcast::Sender<SentinelEvent>,
    username: Option<String>,
    password: Option<String>,
}

impl SentinelDispatcher {
    pub fn new(
        master_name: String,
        provider: Arc<dyn NodeProvider>,
        heartbeat_interval: Duration,
        heartbeat_timeout: Duration,
        username: Option<String>,
        password: Option<String>,
    ) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(64);
        let dispatcher = Arc::new(SentinelDispatcher {
            master_name,
            provider,
            heartbeat_interval,
            heartbeat_timeout,
            health: DashMap::new(),
            last_online: std::sync::Mutex::new(Vec::new()),
            epoch: AtomicU64::new(0),
            events: tx,
            username,
            password,
        });
        for node in dispatcher.provider.nodes() {
            dispatcher.health.insert(
                node.id.clone(),
                NodeHealth {
                    last_heartbeat: std::sync::Mutex::new(Instant::now()),
                },
            );
        }
        dispatcher
    }

    /// Whether this dispatcher has credentials configured at all (spec.md
    /// §6 `sentinel_username`/`sentinel_password`); if not, `AUTH` is
    /// rejected the same way a real Sentinel without `requirepass` rejects
    /// it, rather than silently succeeding.
    pub fn requires_auth(&self) -> bool {
        self.password.is_some()
    }

    /// Checks cport credentials the way Redis's `AUTH [username] password`
    /// does: a bare password compares against the configured password; a
    /// username is only accepted if it matches the configured one (default
    /// user has no name to match against, so any `AUTH user pass` without a
    /// configured username fails).
    pub fn check_auth(&self, username: Option<&str>, password: &str) -> bool {
        let Some(expected_password) = self.password.as_deref() else {
            return false;
        };
        if expected_password != password {
            return false;
        }
        match (username, self.username.as_deref()) {
            (None, _) => true,
            (Some(given), Some(expected)) => given == expected,
            (Some(_), None) => false,
        }
    }

    pub fn master_name(&self) -> &str {
        &self.master_name
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SentinelEvent> {
        self.events.subscribe()
    }

    pub fn record_heartbeat(&self, node_id: &str) {
        if let Some(entry) = self.health.get(node_id) {
            *entry.last_heartbeat.lock().unwrap() = Instant::now();
        } else {
            self.health.insert(
                node_id.to_string(),
                NodeHealth {
                    last_heartbeat: std::sync::Mutex::new(Instant::now()),
                },
            );
        }
    }

    /// Nodes seen within `heartbeat_timeout` of now (spec.md §5.2).
    pub fn online_nodes(&self) -> Vec<ProxyNode> {
        let now = Instant::now();
        self.provider
            .nodes()
            .into_iter()
            .filter(|n| {
                self.health
                    .get(&n.id)
                    .map(|h| now.duration_since(*h.last_heartbeat.lock().unwrap()) <= self.heartbeat_timeout)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Per-client deterministic master pick (spec.md §5.3): `index =
    /// abs(hash(client_id)) % |online_nodes|`. Online nodes are sorted by
    /// ID first so the index means the same thing on every dispatcher
    /// instance observing the same online set, regardless of the node
    /// provider's own ordering.
    pub fn master_for(&self, client_id: &str) -> Option<ProxyNode> {
        let mut online = self.online_nodes();
        if online.is_empty() {
            return None;
        }
        online.sort_by(|a, b| a.id.cmp(&b.id));
        let hash = deterministic_hash(client_id) as i64;
        let index = (hash.unsigned_abs() as usize) % online.len();
        Some(online[index].clone())
    }

    /// One heartbeat tick: recompute the online set, and if it changed,
    /// publish `MembershipChanged` so subscribed connections re-run their
    /// own `master_for` and relay `+switch-master` if their pick moved
    /// (spec.md §5.2/§5.4).
    pub fn tick(&self) {
        let mut online = self.online_nodes();
        online.sort_by(|a, b| a.id.cmp(&b.id));
        let mut last = self.last_online.lock().unwrap();
        if *last != online {
            let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            *last = online;
            let _ = self.events.send(SentinelEvent::MembershipChanged { epoch });
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Spawns the periodic tick loop (spec.md §5.2 heartbeat loop). Runs
    /// until the returned handle is dropped or aborted.
    pub fn spawn_heartbeat_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.clone();
        let interval = self.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                dispatcher.tick();
            }
        })
    }
}

fn deterministic_hash(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> ProxyNode {
        ProxyNode {
            id: id.to_string(),
            host: "127.0.0.1".into(),
            port: 7000,
        }
    }

    fn dispatcher(provider: Arc<dyn NodeProvider>, heartbeat_timeout: Duration) -> Arc<SentinelDispatcher> {
        SentinelDispatcher::new(
            "proxy_sentinel".into(),
            provider,
            Duration::from_secs(5),
            heartbeat_timeout,
            None,
            None,
        )
    }

    #[test]
    fn same_client_id_picks_same_master_regardless_of_instance() {
        let provider = Arc::new(StaticNodeProvider::new(vec![node("a"), node("b"), node("c")]));
        let d1 = dispatcher(provider.clone(), Duration::from_secs(20));
        let d2 = dispatcher(provider, Duration::from_secs(20));
        for id in ["a", "b", "c"] {
            d1.record_heartbeat(id);
            d2.record_heartbeat(id);
        }
        d1.tick();
        d2.tick();
        assert_eq!(d1.master_for("client-42"), d2.master_for("client-42"));
    }

    #[test]
    fn different_clients_can_get_different_masters() {
        let provider = Arc::new(StaticNodeProvider::new(vec![node("a"), node("b"), node("c")]));
        let d = dispatcher(provider, Duration::from_secs(20));
        for id in ["a", "b", "c"] {
            d.record_heartbeat(id);
        }
        d.tick();
        let picks: std::collections::HashSet<_> = (0..20)
            .map(|i| d.master_for(&format!("client-{i}")).unwrap().id)
            .collect();
        assert!(picks.len() > 1, "expected selection to spread across online nodes");
    }

    #[test]
    fn offline_node_is_excluded_from_master_selection() {
        let provider = Arc::new(StaticNodeProvider::new(vec![node("a"), node("b")]));
        let d = dispatcher(provider, Duration::from_millis(0));
        // heartbeat_timeout of 0 means nothing stays "online" after tick.
        d.tick();
        assert!(d.master_for("client-1").is_none());
    }

    #[tokio::test]
    async fn membership_changed_event_fires_on_change() {
        let provider = Arc::new(StaticNodeProvider::new(vec![node("a")]));
        let d = dispatcher(provider, Duration::from_secs(20));
        let mut rx = d.subscribe();
        d.record_heartbeat("a");
        d.tick();
        let event = rx.recv().await.unwrap();
        match event {
            SentinelEvent::MembershipChanged { epoch } => assert_eq!(epoch, 1),
        }
    }

    #[test]
    fn check_auth_requires_matching_password() {
        let provider = Arc::new(StaticNodeProvider::new(vec![]));
        let d = SentinelDispatcher::new(
            "proxy_sentinel".into(),
            provider,
            Duration::from_secs(5),
            Duration::from_secs(20),
            Some("admin".into()),
            Some("hunter2".into()),
        );
        assert!(d.requires_auth());
        assert!(d.check_auth(None, "hunter2"));
        assert!(d.check_auth(Some("admin"), "hunter2"));
        assert!(!d.check_auth(Some("other"), "hunter2"));
        assert!(!d.check_auth(None, "wrong"));
    }

    #[test]
    fn no_credentials_configured_means_auth_always_fails() {
        let provider = Arc::new(StaticNodeProvider::new(vec![]));
        let d = dispatcher(provider, Duration::from_secs(20));
        assert!(!d.requires_auth());
        assert!(!d.check_auth(None, "anything"));
    }
}
