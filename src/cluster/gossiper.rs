use crate::actor::pid::Pid;
use crate::actor::system::ActorSystem;
use crate::cluster::gossip::{MemberState, MemberStateDelta, SharedGossip};
use crate::cluster::{ClusterMembership, Member, MemberId};

use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Id of the system actor receiving gossip exchanges on every member.
pub const GOSSIP_ACTOR_ID: &str = "$gossip";

pub const GOSSIP_DELTA_TAG: &str = "cluster.gossip-delta";
pub const GOSSIP_ACK_TAG: &str = "cluster.gossip-ack";

/// Wire form of one anti-entropy exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipDeltaMessage {
    pub from: MemberId,
    pub entries: HashMap<MemberId, MemberState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipAck {
    pub from: MemberId,
}

#[derive(Debug)]
pub enum GossipSendErr {
    NoAck,
    Timeout,
}

impl Display for GossipSendErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GossipSendErr::NoAck => write!(f, "peer did not acknowledge the delta"),
            GossipSendErr::Timeout => write!(f, "gossip exchange timed out"),
        }
    }
}

impl std::error::Error for GossipSendErr {}

/// How deltas reach a peer. The default goes through the remote layer;
/// tests swap in an in-process delivery.
#[async_trait]
pub trait GossipDelivery: Send + Sync {
    async fn send_delta(
        &self,
        peer: &Member,
        delta: &MemberStateDelta,
    ) -> Result<(), GossipSendErr>;
}

/// Sends deltas to the peer's `$gossip` actor and treats the reply as the
/// acknowledgement.
pub struct RemoteGossipDelivery {
    system: ActorSystem,
    local_member_id: MemberId,
    timeout: Duration,
}

impl RemoteGossipDelivery {
    pub fn new(
        system: ActorSystem,
        local_member_id: MemberId,
        timeout: Duration,
    ) -> RemoteGossipDelivery {
        RemoteGossipDelivery {
            system,
            local_member_id,
            timeout,
        }
    }
}

#[async_trait]
impl GossipDelivery for RemoteGossipDelivery {
    async fn send_delta(
        &self,
        peer: &Member,
        delta: &MemberStateDelta,
    ) -> Result<(), GossipSendErr> {
        let target = Pid::new(peer.address(), GOSSIP_ACTOR_ID);
        let message = GossipDeltaMessage {
            from: self.local_member_id.clone(),
            entries: delta.entries.clone(),
        };

        match self.system.request(&target, message, self.timeout).await {
            Ok(reply) if reply.is::<GossipAck>() => Ok(()),
            Ok(_) => Err(GossipSendErr::NoAck),
            Err(_) => Err(GossipSendErr::Timeout),
        }
    }
}

/// Periodic anti-entropy loop: each tick picks a random subset of peers,
/// sends each the entries it has not committed yet and advances offsets on
/// acknowledgement.
pub(crate) async fn run_gossiper(
    gossip: SharedGossip,
    membership: ClusterMembership,
    delivery: Arc<dyn GossipDelivery>,
    local_member_id: MemberId,
    interval: Duration,
    fanout: usize,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let peers: Vec<Member> = membership
            .members()
            .into_iter()
            .filter(|member| member.id != local_member_id)
            .collect();

        if peers.is_empty() {
            continue;
        }

        let chosen: Vec<Member> = peers
            .choose_multiple(&mut rand::thread_rng(), fanout)
            .cloned()
            .collect();

        for peer in chosen {
            let delta = gossip.lock().delta_for_peer(&peer.id);
            if !delta.has_state() {
                continue;
            }

            match delivery.send_delta(&peer, &delta).await {
                Ok(()) => delta.commit(&mut gossip.lock()),
                Err(e) => {
                    debug!(
                        peer = %peer.id,
                        error = %e,
                        "gossip exchange failed, will retry next round"
                    );
                }
            }
        }
    }

    trace!("gossiper stopped");
}
