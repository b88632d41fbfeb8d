use plexus::cluster::gossip::Gossip;

use serde_json::json;
use std::collections::HashMap;

pub mod util;

#[test]
pub fn test_local_writes_use_strictly_increasing_sequences() {
    let mut gossip = Gossip::new("member-a".to_string());

    let first = gossip.set_state("heartbeat", json!(1));
    let second = gossip.set_state("heartbeat", json!(2));
    let third = gossip.set_state("load", json!(0.5));

    assert!(first < second);
    assert!(second < third);
    assert_eq!(
        gossip.get_state("member-a", "heartbeat").map(|v| v.sequence),
        Some(second)
    );
}

#[test]
pub fn test_delta_shrinks_after_commit() {
    let mut gossip = Gossip::new("member-a".to_string());
    gossip.set_state("status", json!("up"));
    gossip.set_state("load", json!(0.1));

    let delta = gossip.delta_for_peer(&"member-b".to_string());
    assert!(delta.has_state());
    assert_eq!(delta.entries["member-a"].entries.len(), 2);

    // Without a commit the same entries are offered again.
    let repeat = gossip.delta_for_peer(&"member-b".to_string());
    assert!(repeat.has_state());
    assert_eq!(repeat.entries["member-a"].entries.len(), 2);

    delta.commit(&mut gossip);
    let after_commit = gossip.delta_for_peer(&"member-b".to_string());
    assert!(!after_commit.has_state());

    // New writes surface in the next delta; commits are idempotent.
    delta.commit(&mut gossip);
    gossip.set_state("status", json!("down"));
    let next = gossip.delta_for_peer(&"member-b".to_string());
    assert_eq!(next.entries["member-a"].entries.len(), 1);
}

#[test]
pub fn test_merge_never_moves_a_key_backwards() {
    let mut a = Gossip::new("member-a".to_string());
    let mut b = Gossip::new("member-b".to_string());

    a.set_state("status", json!("v1"));
    a.set_state("status", json!("v2"));

    let fresh = a.delta_for_peer(&"member-b".to_string());
    b.merge(&fresh.entries);
    let seen = b.get_state("member-a", "status").cloned().expect("merged");

    // Replaying an older view of the same key changes nothing.
    let mut stale = Gossip::new("member-a".to_string());
    stale.set_state("status", json!("v1"));
    let stale_entries = stale.snapshot();
    let updated = b.merge(&stale_entries);

    assert!(updated.is_empty());
    assert_eq!(b.get_state("member-a", "status"), Some(&seen));
}

#[test]
pub fn test_three_members_converge() {
    let ids = ["member-a", "member-b", "member-c"];
    let mut members: HashMap<&str, Gossip> = ids
        .iter()
        .map(|id| (*id, Gossip::new(id.to_string())))
        .collect();

    for id in ids {
        members
            .get_mut(id)
            .unwrap()
            .set_state("status", json!(format!("ready-{}", id)));
    }

    // Every exchange advances offsets only on commit; a handful of full
    // rounds is plenty for three members.
    let mut observed: HashMap<(String, String, String), u64> = HashMap::new();
    for _round in 0..4 {
        for src_id in ids {
            for dst_id in ids {
                if src_id == dst_id {
                    continue;
                }

                let delta = members[src_id].delta_for_peer(&dst_id.to_string());
                if !delta.has_state() {
                    continue;
                }

                let dst = members.get_mut(dst_id).unwrap();
                dst.merge(&delta.entries);

                // Sequence numbers observed at any member only grow.
                for (member_id, state) in dst.snapshot() {
                    for (key, value) in state.entries {
                        let slot = (dst_id.to_string(), member_id.clone(), key);
                        let previous = observed.get(&slot).copied().unwrap_or(0);
                        assert!(value.sequence >= previous);
                        observed.insert(slot, value.sequence);
                    }
                }

                delta.commit(members.get_mut(src_id).unwrap());
            }
        }
    }

    let reference = members["member-a"].snapshot();
    assert_eq!(reference.len(), 3);
    for id in ids {
        assert_eq!(
            members[id].snapshot(),
            reference,
            "member {} diverged",
            id
        );
    }
}
