use crate::actor::event_stream::EventStream;
use crate::actor::mailbox::Mailbox;
use crate::actor::message::{AnyMessage, Envelope, SystemMessage};
use crate::actor::pid::Pid;

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Message sink for one process. Implementations include local mailboxes,
/// the dead-letter sink and remote proxies.
pub trait Process: Send + Sync {
    fn send_user(&self, envelope: Envelope);

    fn send_system(&self, message: SystemMessage);

    fn stop(&self);
}

pub type ProcessRef = Arc<dyn Process>;

/// The sink backing a local actor: pushes straight into its mailbox.
pub(crate) struct ActorProcess {
    mailbox: Mailbox,
}

impl ActorProcess {
    pub fn new(mailbox: Mailbox) -> ActorProcess {
        ActorProcess { mailbox }
    }
}

impl Process for ActorProcess {
    fn send_user(&self, envelope: Envelope) {
        self.mailbox.push_user(envelope);
    }

    fn send_system(&self, message: SystemMessage) {
        self.mailbox.push_system(message);
    }

    fn stop(&self) {
        self.mailbox.push_system(SystemMessage::Stop);
    }
}

/// Published on the event stream for every message that could not be
/// delivered: unknown target, blocked endpoint, stopped actor.
#[derive(Debug, Clone)]
pub struct DeadLetterEvent {
    pub target: Option<Pid>,
    pub sender: Option<Pid>,
    pub message_type: String,
}

/// Terminal sink for undeliverable messages. Logs and publishes a
/// [`DeadLetterEvent`]; never fails, never blocks.
pub struct DeadLetterProcess {
    event_stream: EventStream,
}

impl DeadLetterProcess {
    pub fn new(event_stream: EventStream) -> DeadLetterProcess {
        DeadLetterProcess { event_stream }
    }
}

impl Process for DeadLetterProcess {
    fn send_user(&self, envelope: Envelope) {
        debug!(
            target_pid = envelope.target.as_ref().map(|t| t.to_string()),
            message_type = envelope.message.type_name(),
            "dead letter"
        );

        self.event_stream.publish(DeadLetterEvent {
            target: envelope.target,
            sender: envelope.sender,
            message_type: envelope.message.type_name().to_string(),
        });
    }

    fn send_system(&self, message: SystemMessage) {
        trace!(message = message.name(), "system message dead-lettered");
    }

    fn stop(&self) {}
}

/// One-shot reply sink used for request/response correlation. Registered in
/// the process registry under a fresh request id; the first user message it
/// receives resolves the caller's future.
pub struct FutureProcess {
    reply: Mutex<Option<oneshot::Sender<AnyMessage>>>,
}

impl FutureProcess {
    pub fn new() -> (Arc<FutureProcess>, oneshot::Receiver<AnyMessage>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(FutureProcess {
                reply: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }
}

impl Process for FutureProcess {
    fn send_user(&self, envelope: Envelope) {
        if let Some(tx) = self.reply.lock().take() {
            let _ = tx.send(envelope.message);
        }
    }

    fn send_system(&self, message: SystemMessage) {
        // A Terminated notification resolves the future too, so callers can
        // watch-and-wait on another process through this sink.
        if let SystemMessage::Terminated { who, reason } = message {
            if let Some(tx) = self.reply.lock().take() {
                let _ = tx.send(AnyMessage::new(crate::actor::message::Terminated {
                    who,
                    reason,
                }));
            }
        }
    }

    fn stop(&self) {
        self.reply.lock().take();
    }
}
