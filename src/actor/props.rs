use crate::actor::supervision::{default_strategy, SupervisorStrategy};
use crate::actor::Actor;

use std::sync::Arc;

pub type ActorProducer = Arc<dyn Fn() -> Box<dyn Actor> + Send + Sync>;

/// Recipe for spawning an actor: how to build an instance, how to supervise
/// it and how its mailbox behaves. Restart relies on the producer to build a
/// fresh instance into the existing mailbox.
#[derive(Clone)]
pub struct Props {
    producer: ActorProducer,
    supervisor: Arc<dyn SupervisorStrategy>,
    throughput: Option<usize>,
}

impl Props {
    pub fn from_producer<F, A>(producer: F) -> Props
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        Props {
            producer: Arc::new(move || Box::new(producer())),
            supervisor: default_strategy(),
            throughput: None,
        }
    }

    pub fn with_supervisor(mut self, strategy: Arc<dyn SupervisorStrategy>) -> Props {
        self.supervisor = strategy;
        self
    }

    /// Messages processed per dispatch batch before the mailbox yields.
    /// Defaults to the system-wide setting.
    pub fn with_throughput(mut self, throughput: usize) -> Props {
        self.throughput = Some(throughput);
        self
    }

    pub(crate) fn produce(&self) -> Box<dyn Actor> {
        (self.producer)()
    }

    pub(crate) fn supervisor(&self) -> &Arc<dyn SupervisorStrategy> {
        &self.supervisor
    }

    pub(crate) fn throughput(&self) -> Option<usize> {
        self.throughput
    }
}
