use crate::cluster::MemberId;
use crate::diagnostics::{DiagnosticEntry, Diagnostics};

use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type SharedGossip = Arc<SyncMutex<Gossip>>;

/// One versioned value in a member's state map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipKeyValue {
    pub sequence: u64,
    pub value: serde_json::Value,
}

/// The key/value state one member publishes about itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberState {
    pub entries: HashMap<String, GossipKeyValue>,
}

/// Eventually consistent per-member state, exchanged through anti-entropy
/// deltas.
///
/// Sequence numbers increase strictly per (member, key): local writes bump
/// a single local counter, and merges never move a key backwards. Conflict
/// resolution is last-writer-wins by sequence with ties broken by member
/// id, so every member converges on the same map under fair exchange.
pub struct Gossip {
    local_member_id: MemberId,
    members: HashMap<MemberId, MemberState>,
    local_sequence: u64,
    /// Highest sequence per origin member already sent to (and committed
    /// by) each peer.
    sent_offsets: HashMap<MemberId, HashMap<MemberId, u64>>,
}

impl Gossip {
    pub fn new(local_member_id: MemberId) -> Gossip {
        Gossip {
            local_member_id,
            members: HashMap::new(),
            local_sequence: 0,
            sent_offsets: HashMap::new(),
        }
    }

    pub fn local_member_id(&self) -> &MemberId {
        &self.local_member_id
    }

    /// Sets one key of the local member's state, returning the sequence
    /// number assigned to the write.
    pub fn set_state(&mut self, key: &str, value: serde_json::Value) -> u64 {
        self.local_sequence += 1;
        let sequence = self.local_sequence;

        self.members
            .entry(self.local_member_id.clone())
            .or_default()
            .entries
            .insert(key.to_string(), GossipKeyValue { sequence, value });

        sequence
    }

    pub fn get_state(&self, member_id: &str, key: &str) -> Option<&GossipKeyValue> {
        self.members
            .get(member_id)
            .and_then(|state| state.entries.get(key))
    }

    pub fn member_state(&self, member_id: &str) -> Option<&MemberState> {
        self.members.get(member_id)
    }

    pub fn known_members(&self) -> Vec<MemberId> {
        self.members.keys().cloned().collect()
    }

    pub fn snapshot(&self) -> HashMap<MemberId, MemberState> {
        self.members.clone()
    }

    /// Merges a remote view into the local one. Returns the (member, key)
    /// pairs that changed.
    pub fn merge(&mut self, incoming: &HashMap<MemberId, MemberState>) -> Vec<(MemberId, String)> {
        let mut updated = Vec::new();

        for (member_id, incoming_state) in incoming {
            let current = self.members.entry(member_id.clone()).or_default();

            for (key, incoming_value) in &incoming_state.entries {
                // Last-writer-wins by sequence. Each member is the only
                // writer of its own keys, so an equal sequence carries an
                // equal value and the existing entry stands.
                let supersedes = match current.entries.get(key) {
                    None => true,
                    Some(existing) => incoming_value.sequence > existing.sequence,
                };

                if supersedes {
                    current
                        .entries
                        .insert(key.clone(), incoming_value.clone());
                    updated.push((member_id.clone(), key.clone()));
                }
            }

            // Keep the local counter ahead of anything merged for this
            // member, so a rejoining member never reuses sequence numbers.
            if member_id == &self.local_member_id {
                let max_merged = incoming_state
                    .entries
                    .values()
                    .map(|v| v.sequence)
                    .max()
                    .unwrap_or(0);
                self.local_sequence = self.local_sequence.max(max_merged);
            }
        }

        updated
    }

    /// Builds the delta of everything `peer` has not committed yet. The
    /// offsets advance only when the delta is committed.
    pub fn delta_for_peer(&self, peer: &MemberId) -> MemberStateDelta {
        let peer_offsets = self.sent_offsets.get(peer);
        let mut entries: HashMap<MemberId, MemberState> = HashMap::new();
        let mut offsets: Vec<(MemberId, u64)> = Vec::new();

        for (member_id, state) in &self.members {
            if member_id == peer {
                continue;
            }

            let offset = peer_offsets
                .and_then(|offsets| offsets.get(member_id))
                .copied()
                .unwrap_or(0);

            let fresh: HashMap<String, GossipKeyValue> = state
                .entries
                .iter()
                .filter(|(_, value)| value.sequence > offset)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();

            if !fresh.is_empty() {
                let highest = fresh.values().map(|v| v.sequence).max().unwrap_or(offset);
                offsets.push((member_id.clone(), highest));
                entries.insert(member_id.clone(), MemberState { entries: fresh });
            }
        }

        MemberStateDelta {
            target: peer.clone(),
            entries,
            offsets,
            committed: AtomicBool::new(false),
        }
    }

    /// Advances the sent-to-peer offsets covered by a committed delta.
    /// Monotonic, so repeated commits are harmless.
    fn advance_offsets(&mut self, peer: &MemberId, offsets: &[(MemberId, u64)]) {
        let peer_offsets = self.sent_offsets.entry(peer.clone()).or_default();
        for (member_id, sequence) in offsets {
            let entry = peer_offsets.entry(member_id.clone()).or_insert(0);
            *entry = (*entry).max(*sequence);
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// The subset of state a specific peer has not seen, captured against the
/// offsets at build time. `commit` acknowledges receipt: it advances the
/// sender's offsets for that peer, exactly once per delta.
pub struct MemberStateDelta {
    pub target: MemberId,
    pub entries: HashMap<MemberId, MemberState>,
    offsets: Vec<(MemberId, u64)>,
    committed: AtomicBool,
}

impl MemberStateDelta {
    pub fn has_state(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Idempotent: the first call advances offsets, later calls do nothing.
    pub fn commit(&self, gossip: &mut Gossip) {
        if !self.committed.swap(true, Ordering::AcqRel) {
            gossip.advance_offsets(&self.target, &self.offsets);
        }
    }
}

impl Diagnostics for Gossip {
    fn diagnostics(&self) -> Vec<DiagnosticEntry> {
        vec![
            DiagnosticEntry::new("gossip", "local_member_id", self.local_member_id.clone()),
            DiagnosticEntry::new("gossip", "known_members", self.members.len().to_string()),
            DiagnosticEntry::new("gossip", "local_sequence", self.local_sequence.to_string()),
        ]
    }
}
