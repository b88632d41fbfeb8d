use crate::actor::pid::Pid;
use crate::actor::supervision::RestartStatistics;
use crate::actor::ActorError;

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A cheaply clonable, dynamically typed message payload.
///
/// Everything that travels through a mailbox is boxed into one of these;
/// receivers downcast back to the concrete type they understand.
#[derive(Clone)]
pub struct AnyMessage {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl AnyMessage {
    pub fn new<M: Any + Send + Sync>(message: M) -> AnyMessage {
        AnyMessage {
            inner: Arc::new(message),
            type_name: std::any::type_name::<M>(),
        }
    }

    pub fn is<M: Any>(&self) -> bool {
        self.inner.is::<M>()
    }

    pub fn downcast_ref<M: Any>(&self) -> Option<&M> {
        self.inner.downcast_ref::<M>()
    }

    pub fn downcast_arc<M: Any + Send + Sync>(&self) -> Option<Arc<M>> {
        self.inner.clone().downcast::<M>().ok()
    }

    /// Concrete type name of the payload, for logs and dead letters.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// `TypeId` of the concrete payload type.
    pub fn message_type_id(&self) -> std::any::TypeId {
        self.inner.as_ref().type_id()
    }
}

impl Debug for AnyMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AnyMessage({})", self.type_name)
    }
}

/// String key/value pairs carried alongside a message, used for context
/// propagation such as trace identifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageHeaders {
    entries: HashMap<String, String>,
}

impl MessageHeaders {
    pub fn new() -> MessageHeaders {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<HashMap<String, String>> for MessageHeaders {
    fn from(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }
}

impl From<MessageHeaders> for HashMap<String, String> {
    fn from(headers: MessageHeaders) -> Self {
        headers.entries
    }
}

/// A user message in flight: the payload plus routing and context data.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub target: Option<Pid>,
    pub sender: Option<Pid>,
    pub message: AnyMessage,
    pub headers: MessageHeaders,
}

impl Envelope {
    pub fn new<M: Any + Send + Sync>(message: M) -> Envelope {
        Envelope {
            target: None,
            sender: None,
            message: AnyMessage::new(message),
            headers: MessageHeaders::default(),
        }
    }

    pub fn from_message(message: AnyMessage) -> Envelope {
        Envelope {
            target: None,
            sender: None,
            message,
            headers: MessageHeaders::default(),
        }
    }

    pub fn with_target(mut self, target: Pid) -> Envelope {
        self.target = Some(target);
        self
    }

    pub fn with_sender(mut self, sender: Pid) -> Envelope {
        self.sender = Some(sender);
        self
    }

    pub fn with_headers(mut self, headers: MessageHeaders) -> Envelope {
        self.headers = headers;
        self
    }
}

/// Why an actor reached `Stopped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The actor stopped normally, either on request or at system shutdown.
    Stopped,
    /// The actor was stopped by its supervisor after a failure.
    Failed(String),
}

/// Messages the runtime itself exchanges with a mailbox. They take priority
/// over user messages and their relative order is preserved.
#[derive(Debug, Clone)]
pub enum SystemMessage {
    /// First message every actor instance receives.
    Started,
    /// Begin the stop procedure: children first, then the actor itself.
    Stop,
    /// Supervisor directive: replace the actor instance, keeping the mailbox
    /// and any queued user messages.
    Restart(ActorError),
    /// Pause user-message processing. Handled by the mailbox itself.
    Suspend,
    /// Resume user-message processing. Handled by the mailbox itself.
    Resume,
    /// Register `watcher` for a termination notification.
    Watch(Pid),
    /// Remove `watcher` from the watch set.
    Unwatch(Pid),
    /// A watched actor reached `Stopped`.
    Terminated { who: Pid, reason: StopReason },
    /// A child failed while processing a user message.
    Failure(Failure),
}

impl SystemMessage {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            SystemMessage::Started => "Started",
            SystemMessage::Stop => "Stop",
            SystemMessage::Restart(_) => "Restart",
            SystemMessage::Suspend => "Suspend",
            SystemMessage::Resume => "Resume",
            SystemMessage::Watch(_) => "Watch",
            SystemMessage::Unwatch(_) => "Unwatch",
            SystemMessage::Terminated { .. } => "Terminated",
            SystemMessage::Failure(_) => "Failure",
        }
    }
}

/// Failure report delivered to the parent's mailbox. Carries the child's
/// restart statistics so the supervisor strategy can account for the retry
/// window across restarts.
#[derive(Clone)]
pub struct Failure {
    pub who: Pid,
    pub reason: ActorError,
    pub stats: Arc<Mutex<RestartStatistics>>,
}

impl Debug for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Failure")
            .field("who", &self.who)
            .field("reason", &self.reason)
            .finish()
    }
}

/// Termination notification surfaced to watching actors through their
/// regular `receive`.
#[derive(Debug, Clone)]
pub struct Terminated {
    pub who: Pid,
    pub reason: StopReason,
}
