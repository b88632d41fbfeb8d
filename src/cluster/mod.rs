use crate::actor::context::ActorContext;
use crate::actor::message::Envelope;
use crate::actor::pid::Pid;
use crate::actor::props::Props;
use crate::actor::system::ActorSystem;
use crate::actor::{Actor, ActorError, SpawnErr};
use crate::cluster::gossip::{Gossip, GossipKeyValue, MemberState, SharedGossip};
use crate::cluster::gossiper::{
    run_gossiper, GossipAck, GossipDelivery, GossipDeltaMessage, RemoteGossipDelivery,
    GOSSIP_ACK_TAG, GOSSIP_DELTA_TAG,
};
use crate::cluster::seed::SeedNodeDiscovery;
use crate::remote::Remote;

use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod gossip;
pub mod gossiper;
pub mod seed;

/// Labels and annotations published for Kubernetes-style discovery.
pub mod labels {
    pub const LABEL_CLUSTER: &str = "cluster.proto.actor/cluster";
    pub const LABEL_MEMBER_ID: &str = "cluster.proto.actor/member-id";
    pub const LABEL_PORT: &str = "cluster.proto.actor/port";
    pub const LABEL_HOST: &str = "cluster.proto.actor/host";
    pub const LABEL_HOST_PREFIX: &str = "cluster.proto.actor/host-prefix";
    pub const ANNOTATION_KINDS: &str = "cluster.proto.actor/kinds";
}

pub type MemberId = String;

/// One participant in the cluster: a stable member id, a dialable address
/// and the actor kinds it advertises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub host: String,
    pub port: u16,
    pub kinds: Vec<String>,
}

impl Member {
    pub fn new(id: impl Into<MemberId>, host: impl Into<String>, port: u16) -> Member {
        Member {
            id: id.into(),
            host: host.into(),
            port,
            kinds: Vec::new(),
        }
    }

    pub fn with_kinds(mut self, kinds: Vec<String>) -> Member {
        self.kinds = kinds;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Published on the event stream when a member appears in the topology.
#[derive(Debug, Clone)]
pub struct MemberJoined(pub Member);

/// Published on the event stream when a member disappears from the
/// topology.
#[derive(Debug, Clone)]
pub struct MemberLeft(pub Member);

/// The current member set, fed by full topology snapshots and diffed into
/// `MemberJoined` / `MemberLeft` events.
#[derive(Clone)]
pub struct ClusterMembership {
    inner: Arc<MembershipInner>,
}

struct MembershipInner {
    system: ActorSystem,
    members: SyncMutex<HashMap<MemberId, Member>>,
}

impl ClusterMembership {
    pub fn new(system: ActorSystem) -> ClusterMembership {
        ClusterMembership {
            inner: Arc::new(MembershipInner {
                system,
                members: SyncMutex::new(HashMap::new()),
            }),
        }
    }

    pub fn members(&self) -> Vec<Member> {
        self.inner.members.lock().values().cloned().collect()
    }

    pub fn member_count(&self) -> usize {
        self.inner.members.lock().len()
    }

    pub fn member(&self, id: &str) -> Option<Member> {
        self.inner.members.lock().get(id).cloned()
    }

    /// Replaces the member set with a full snapshot, publishing one event
    /// per difference.
    pub fn apply_snapshot(&self, snapshot: Vec<Member>) {
        let next: HashMap<MemberId, Member> =
            snapshot.into_iter().map(|m| (m.id.clone(), m)).collect();

        let (joined, left) = {
            let mut members = self.inner.members.lock();

            let joined: Vec<Member> = next
                .values()
                .filter(|m| !members.contains_key(&m.id))
                .cloned()
                .collect();
            let left: Vec<Member> = members
                .values()
                .filter(|m| !next.contains_key(&m.id))
                .cloned()
                .collect();

            *members = next;
            (joined, left)
        };

        for member in joined {
            info!(member_id = %member.id, address = %member.address(), "member joined");
            self.inner.system.event_stream().publish(MemberJoined(member));
        }

        for member in left {
            info!(member_id = %member.id, address = %member.address(), "member left");
            self.inner.system.event_stream().publish(MemberLeft(member));
        }
    }
}

pub struct ClusterConfig {
    pub(crate) member_id: Option<MemberId>,
    pub(crate) discovery: Arc<dyn SeedNodeDiscovery>,
    pub(crate) refresh_interval: Duration,
    pub(crate) gossip_interval: Duration,
    pub(crate) gossip_fanout: usize,
    pub(crate) gossip_request_timeout: Duration,
}

impl ClusterConfig {
    pub fn new(discovery: Arc<dyn SeedNodeDiscovery>) -> ClusterConfig {
        ClusterConfig {
            member_id: None,
            discovery,
            refresh_interval: Duration::from_secs(5),
            gossip_interval: Duration::from_millis(500),
            gossip_fanout: 3,
            gossip_request_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_member_id(mut self, member_id: impl Into<MemberId>) -> Self {
        self.member_id = Some(member_id.into());
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_gossip_interval(mut self, interval: Duration) -> Self {
        self.gossip_interval = interval;
        self
    }

    pub fn with_gossip_fanout(mut self, fanout: usize) -> Self {
        self.gossip_fanout = fanout.max(1);
        self
    }
}

/// Cluster overlay for one system: seed discovery feeding the membership
/// view, and the gossip exchange keeping per-member state converged.
/// Endpoints stay addressable by logical member identity because sends go
/// to `member.address()` pids resolved through the remote layer.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

struct ClusterInner {
    system: ActorSystem,
    member_id: MemberId,
    gossip: SharedGossip,
    membership: ClusterMembership,
    gossip_actor: Pid,
    shutdown: CancellationToken,
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
}

impl Cluster {
    pub async fn start(
        system: &ActorSystem,
        remote: &Remote,
        config: ClusterConfig,
    ) -> Result<Cluster, SpawnErr> {
        remote.codec().register::<GossipDeltaMessage>(GOSSIP_DELTA_TAG);
        remote.codec().register::<GossipAck>(GOSSIP_ACK_TAG);

        let member_id = config
            .member_id
            .clone()
            .unwrap_or_else(|| system.system_id().simple().to_string());

        let gossip: SharedGossip = Arc::new(SyncMutex::new(Gossip::new(member_id.clone())));
        let membership = ClusterMembership::new(system.clone());

        let gossip_actor = {
            let gossip = gossip.clone();
            let member_id = member_id.clone();
            system.spawn_named(
                Props::from_producer(move || GossipReceiver {
                    gossip: gossip.clone(),
                    member_id: member_id.clone(),
                }),
                gossiper::GOSSIP_ACTOR_ID,
            )?
        };

        let shutdown = system.shutdown_token().child_token();
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(run_discovery(
            config.discovery.clone(),
            membership.clone(),
            config.refresh_interval,
            shutdown.clone(),
        )));

        let delivery: Arc<dyn GossipDelivery> = Arc::new(RemoteGossipDelivery::new(
            system.clone(),
            member_id.clone(),
            config.gossip_request_timeout,
        ));
        tasks.push(tokio::spawn(run_gossiper(
            gossip.clone(),
            membership.clone(),
            delivery,
            member_id.clone(),
            config.gossip_interval,
            config.gossip_fanout,
            shutdown.clone(),
        )));

        info!(member_id = %member_id, "cluster started");

        Ok(Cluster {
            inner: Arc::new(ClusterInner {
                system: system.clone(),
                member_id,
                gossip,
                membership,
                gossip_actor,
                shutdown,
                tasks: SyncMutex::new(tasks),
            }),
        })
    }

    pub fn member_id(&self) -> &MemberId {
        &self.inner.member_id
    }

    pub fn membership(&self) -> &ClusterMembership {
        &self.inner.membership
    }

    pub fn members(&self) -> Vec<Member> {
        self.inner.membership.members()
    }

    /// Updates one key of this member's gossip state; the new value reaches
    /// every peer through anti-entropy exchange.
    pub fn set_state(&self, key: &str, value: serde_json::Value) -> u64 {
        self.inner.gossip.lock().set_state(key, value)
    }

    /// This system's current view of `member_id`'s state for `key`.
    pub fn get_state(&self, member_id: &str, key: &str) -> Option<GossipKeyValue> {
        self.inner.gossip.lock().get_state(member_id, key).cloned()
    }

    pub fn gossip_snapshot(&self) -> HashMap<MemberId, MemberState> {
        self.inner.gossip.lock().snapshot()
    }

    pub async fn stop(&self) {
        self.inner.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        self.inner
            .system
            .stop_and_wait(&self.inner.gossip_actor)
            .await;

        info!(member_id = %self.inner.member_id, "cluster stopped");
    }
}

/// Polls the discovery capability and feeds full snapshots into the
/// membership view.
async fn run_discovery(
    discovery: Arc<dyn SeedNodeDiscovery>,
    membership: ClusterMembership,
    refresh_interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        match discovery.discover().await {
            Ok(snapshot) => membership.apply_snapshot(snapshot),
            Err(e) => warn!(error = %e, "seed node discovery failed"),
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(refresh_interval) => {}
        }
    }

    trace!("discovery loop stopped");
}

/// Actor behind `$gossip`: merges incoming deltas and acknowledges them.
struct GossipReceiver {
    gossip: SharedGossip,
    member_id: MemberId,
}

#[async_trait]
impl Actor for GossipReceiver {
    async fn receive(
        &mut self,
        ctx: &mut ActorContext,
        envelope: Envelope,
    ) -> Result<(), ActorError> {
        if let Some(delta) = envelope.message.downcast_ref::<GossipDeltaMessage>() {
            let updated = self.gossip.lock().merge(&delta.entries);
            trace!(
                from = %delta.from,
                updated_keys = updated.len(),
                "gossip delta merged"
            );

            ctx.respond(GossipAck {
                from: self.member_id.clone(),
            });
        }

        Ok(())
    }
}
