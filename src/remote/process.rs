use crate::actor::message::{Envelope, SystemMessage};
use crate::actor::pid::Pid;
use crate::actor::process::Process;
use crate::actor::system::ActorSystem;
use crate::remote::codec::MessageCodec;
use crate::remote::endpoint::manager::EndpointManager;
use crate::remote::endpoint::Endpoint;
use crate::remote::net::message::{WireEnvelope, WireFrame, WireSystem};

use std::sync::Arc;

/// Sink for a pid hosted by another system. Resolves its endpoint on every
/// send, so a terminated-and-blocked destination degrades to dead letters
/// without the registry noticing.
pub(crate) struct RemoteProcess {
    pid: Pid,
    manager: EndpointManager,
    codec: Arc<MessageCodec>,
    system: ActorSystem,
}

impl RemoteProcess {
    pub fn new(
        pid: Pid,
        manager: EndpointManager,
        codec: Arc<MessageCodec>,
        system: ActorSystem,
    ) -> RemoteProcess {
        RemoteProcess {
            pid,
            manager,
            codec,
            system,
        }
    }

    fn endpoint(&self) -> Endpoint {
        match self.pid.client_system_id() {
            Some(system_id) => self.manager.get_or_add_client(system_id),
            None => self.manager.get_or_add_server(Some(&self.pid.address)),
        }
    }
}

impl Process for RemoteProcess {
    fn send_user(&self, envelope: Envelope) {
        match self.codec.encode(&envelope.message) {
            Ok((payload, type_tag)) => {
                self.endpoint().send(WireFrame::Envelope(WireEnvelope {
                    target: self.pid.clone(),
                    sender: envelope.sender,
                    type_tag,
                    payload,
                    headers: envelope.headers.into(),
                }));
            }
            Err(e) => {
                warn!(
                    target_pid = %self.pid,
                    message_type = envelope.message.type_name(),
                    error = %e,
                    "message is not transmittable, dead-lettered"
                );
                self.system.dead_letter().send_user(envelope);
            }
        }
    }

    fn send_system(&self, message: SystemMessage) {
        let frame = match message {
            SystemMessage::Stop => WireSystem::Stop {
                target: self.pid.clone(),
            },
            SystemMessage::Watch(watcher) => WireSystem::Watch {
                target: self.pid.clone(),
                watcher,
            },
            SystemMessage::Unwatch(watcher) => WireSystem::Unwatch {
                target: self.pid.clone(),
                watcher,
            },
            SystemMessage::Terminated { who, reason } => WireSystem::Terminated {
                watcher: self.pid.clone(),
                who,
                reason,
            },
            message => {
                trace!(
                    target_pid = %self.pid,
                    message = message.name(),
                    "system message does not cross process boundaries, dropped"
                );
                return;
            }
        };

        self.endpoint().send(WireFrame::System(frame));
    }

    fn stop(&self) {
        self.send_system(SystemMessage::Stop);
    }
}
