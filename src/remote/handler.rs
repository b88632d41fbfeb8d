use crate::actor::message::{Envelope, SystemMessage};
use crate::actor::process::Process;
use crate::actor::system::ActorSystem;
use crate::remote::codec::MessageCodec;
use crate::remote::net::message::{WireFrame, WireSystem};

use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Inbound dispatch shared by every connection: decodes wire frames and
/// routes them to the local target's mailbox.
///
/// A malformed envelope is an error for the *caller* to count against the
/// per-connection threshold - it never affects other traffic on the
/// endpoint.
#[derive(Clone)]
pub struct RemoteMessageHandler {
    system: ActorSystem,
    codec: Arc<MessageCodec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolErr {
    UnknownTypeTag(String),
    MalformedPayload(String),
    MalformedFrame,
}

impl Display for ProtocolErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolErr::UnknownTypeTag(tag) => write!(f, "unknown type tag {}", tag),
            ProtocolErr::MalformedPayload(e) => write!(f, "malformed payload: {}", e),
            ProtocolErr::MalformedFrame => write!(f, "malformed frame"),
        }
    }
}

impl std::error::Error for ProtocolErr {}

impl RemoteMessageHandler {
    pub fn new(system: ActorSystem, codec: Arc<MessageCodec>) -> RemoteMessageHandler {
        RemoteMessageHandler { system, codec }
    }

    /// Decodes raw frame bytes and dispatches. Returns `Err` for frames the
    /// peer built wrongly; undeliverable but well-formed messages go to the
    /// dead-letter sink and are not an error.
    pub fn handle_bytes(&self, bytes: &[u8]) -> Result<(), ProtocolErr> {
        match WireFrame::read_from_bytes(bytes) {
            Some(frame) => self.handle_frame(frame),
            None => Err(ProtocolErr::MalformedFrame),
        }
    }

    pub fn handle_frame(&self, frame: WireFrame) -> Result<(), ProtocolErr> {
        match frame {
            WireFrame::Hello(hello) => {
                // Connection identity is consumed during session setup; a
                // repeated hello is harmless.
                trace!(
                    peer_address = %hello.address,
                    peer_system_id = %hello.system_id,
                    "hello frame"
                );
                Ok(())
            }
            WireFrame::Envelope(envelope) => {
                let message = self
                    .codec
                    .decode(&envelope.type_tag, &envelope.payload)
                    .map_err(|e| match e {
                        crate::remote::codec::CodecErr::UnknownTypeTag(tag) => {
                            ProtocolErr::UnknownTypeTag(tag)
                        }
                        e => ProtocolErr::MalformedPayload(e.to_string()),
                    })?;

                let target = envelope.target;
                let delivery = Envelope {
                    target: Some(target.clone()),
                    sender: envelope.sender,
                    message,
                    headers: envelope.headers.into(),
                };

                match self.system.registry().get_local(&target.id) {
                    Some(process) => process.send_user(delivery),
                    None => self.system.dead_letter().send_user(delivery),
                }

                Ok(())
            }
            WireFrame::System(system) => {
                self.handle_system(system);
                Ok(())
            }
        }
    }

    fn handle_system(&self, message: WireSystem) {
        let (target, system_message) = match message {
            WireSystem::Stop { target } => (target, SystemMessage::Stop),
            WireSystem::Watch { target, watcher } => (target, SystemMessage::Watch(watcher)),
            WireSystem::Unwatch { target, watcher } => (target, SystemMessage::Unwatch(watcher)),
            WireSystem::Terminated {
                watcher,
                who,
                reason,
            } => (watcher, SystemMessage::Terminated { who, reason }),
        };

        match self.system.registry().get_local(&target.id) {
            Some(process) => process.send_system(system_message),
            None => trace!(
                target_pid = %target,
                message = system_message.name(),
                "system message for unknown process dropped"
            ),
        }
    }
}
