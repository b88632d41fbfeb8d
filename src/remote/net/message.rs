use crate::actor::message::StopReason;
use crate::actor::pid::Pid;

use std::collections::HashMap;

/// Everything that travels between two systems, as one self-describing
/// frame. Encoded with the serde façade; the framing layer below only sees
/// opaque bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireFrame {
    /// First frame on every connection, identifying the dialing system.
    Hello(Hello),
    /// A user message for a process hosted by the receiving system.
    Envelope(WireEnvelope),
    /// A system-level notification crossing the process boundary.
    System(WireSystem),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub system_id: String,
    pub address: String,
    pub is_client: bool,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub target: Pid,
    pub sender: Option<Pid>,
    pub type_tag: String,
    pub payload: Vec<u8>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireSystem {
    Stop {
        target: Pid,
    },
    Watch {
        target: Pid,
        watcher: Pid,
    },
    Unwatch {
        target: Pid,
        watcher: Pid,
    },
    Terminated {
        watcher: Pid,
        who: Pid,
        reason: StopReason,
    },
}

impl WireFrame {
    pub fn write_to_bytes(&self) -> Option<Vec<u8>> {
        serde_json::to_vec(self).ok()
    }

    pub fn read_from_bytes(bytes: &[u8]) -> Option<WireFrame> {
        serde_json::from_slice(bytes).ok()
    }
}
