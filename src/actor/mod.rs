use std::fmt::{Display, Formatter};

pub mod context;
pub mod event_stream;
pub mod lifecycle;
pub mod mailbox;
pub mod message;
pub mod pid;
pub mod process;
pub mod props;
pub mod registry;
pub mod supervision;
pub mod system;

pub use context::{ActorContext, ActorStatus};
pub use message::{AnyMessage, Envelope, MessageHeaders, StopReason, SystemMessage, Terminated};
pub use pid::Pid;
pub use process::{DeadLetterEvent, Process, ProcessRef};
pub use props::Props;
pub use system::{ActorSystem, ActorSystemConfig};

/// A message-driven entity with private state. One message is processed at
/// a time; all interaction with the rest of the system goes through the
/// [`ActorContext`].
///
/// An `Err` from `started` or `receive` is captured by the dispatcher and
/// reported to the supervisor as a failure; it never tears down the
/// runtime.
#[async_trait]
pub trait Actor: 'static + Send {
    async fn started(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    async fn receive(
        &mut self,
        ctx: &mut ActorContext,
        envelope: Envelope,
    ) -> Result<(), ActorError>;

    /// Runs on the old instance before a supervisor-directed restart
    /// replaces it.
    async fn restarting(&mut self, _ctx: &mut ActorContext) {}

    /// Runs when the stop procedure begins, before children are stopped.
    async fn stopping(&mut self, _ctx: &mut ActorContext) {}

    /// Runs once the actor and all of its children have stopped.
    async fn stopped(&mut self, _ctx: &mut ActorContext) {}
}

/// An application-level failure raised by an actor, reported to its
/// supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorError {
    message: String,
}

impl ActorError {
    pub fn new(message: impl Into<String>) -> ActorError {
        ActorError {
            message: message.into(),
        }
    }
}

impl Display for ActorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActorError {}

impl From<&str> for ActorError {
    fn from(message: &str) -> Self {
        ActorError::new(message)
    }
}

impl From<String> for ActorError {
    fn from(message: String) -> Self {
        ActorError::new(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnErr {
    AlreadyExists(Pid),
}

impl Display for SpawnErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SpawnErr::AlreadyExists(pid) => {
                write!(f, "a process with id {} already exists", pid)
            }
        }
    }
}

impl std::error::Error for SpawnErr {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErr {
    /// No reply arrived within the deadline.
    Timeout,
    /// The reply channel closed before a reply was produced.
    Terminated,
}

impl Display for RequestErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestErr::Timeout => write!(f, "request timed out"),
            RequestErr::Terminated => write!(f, "request reply channel closed"),
        }
    }
}

impl std::error::Error for RequestErr {}
