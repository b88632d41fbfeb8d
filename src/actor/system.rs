use crate::actor::event_stream::EventStream;
use crate::actor::message::{AnyMessage, Envelope, SystemMessage};
use crate::actor::pid::Pid;
use crate::actor::process::{DeadLetterProcess, FutureProcess, Process, ProcessRef};
use crate::actor::props::Props;
use crate::actor::registry::ProcessRegistry;
use crate::actor::{lifecycle, RequestErr, SpawnErr};

use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const SHUTDOWN_STOP_CHUNK: usize = 20;
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ActorSystemConfig {
    /// Messages a mailbox processes per dispatch batch before yielding.
    pub throughput: usize,
    /// Default deadline for `request` when the caller does not pass one.
    pub request_timeout: Duration,
}

impl Default for ActorSystemConfig {
    fn default() -> Self {
        ActorSystemConfig {
            throughput: 300,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// The root value of one actor runtime: process registry, event stream,
/// configuration and the process-wide shutdown signal. Cheap to clone;
/// threaded explicitly through construction rather than held as an ambient
/// singleton.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<ActorSystemInner>,
}

struct ActorSystemInner {
    system_id: Uuid,
    config: ActorSystemConfig,
    registry: ProcessRegistry,
    event_stream: EventStream,
    shutdown: CancellationToken,
    request_sequence: AtomicU32,
}

impl ActorSystem {
    pub fn new() -> ActorSystem {
        Self::new_with_config(ActorSystemConfig::default())
    }

    pub fn new_with_config(config: ActorSystemConfig) -> ActorSystem {
        let event_stream = EventStream::new();
        let dead_letter = Arc::new(DeadLetterProcess::new(event_stream.clone()));
        let registry = ProcessRegistry::new(dead_letter);

        ActorSystem {
            inner: Arc::new(ActorSystemInner {
                system_id: Uuid::new_v4(),
                config,
                registry,
                event_stream,
                shutdown: CancellationToken::new(),
                request_sequence: AtomicU32::new(1),
            }),
        }
    }

    pub fn system_id(&self) -> Uuid {
        self.inner.system_id
    }

    /// The local host address: `host:port` once a remote listener is bound,
    /// `nonhost` otherwise.
    pub fn address(&self) -> Arc<str> {
        self.inner.registry.address()
    }

    pub fn config(&self) -> &ActorSystemConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.inner.registry
    }

    pub fn event_stream(&self) -> &EventStream {
        &self.inner.event_stream
    }

    pub fn dead_letter(&self) -> ProcessRef {
        self.inner.registry.dead_letter()
    }

    /// Spawns a top-level actor under a generated id.
    pub fn spawn(&self, props: Props) -> Result<Pid, SpawnErr> {
        let id = self.inner.registry.next_id();
        self.spawn_with_parent(props, &id, None)
    }

    /// Spawns a top-level actor under an explicit id. Fails if the id is
    /// taken.
    pub fn spawn_named(&self, props: Props, id: &str) -> Result<Pid, SpawnErr> {
        self.spawn_with_parent(props, id, None)
    }

    pub(crate) fn spawn_with_parent(
        &self,
        props: Props,
        id: &str,
        parent: Option<Pid>,
    ) -> Result<Pid, SpawnErr> {
        lifecycle::spawn(self, id, props, parent)
    }

    /// Fire-and-forget send. Undeliverable messages are dead-lettered.
    pub fn send<M: Any + Send + Sync>(&self, target: &Pid, message: M) {
        self.deliver(Envelope::new(message).with_target(target.clone()));
    }

    /// Routes an envelope to its target's sink, local or remote.
    pub fn deliver(&self, envelope: Envelope) {
        match &envelope.target {
            Some(target) => self.inner.registry.get(target).send_user(envelope),
            None => self.dead_letter().send_user(envelope),
        }
    }

    /// Sends `message` and awaits a reply addressed to a one-shot reply
    /// process, with `timeout` as the deadline.
    pub async fn request<M: Any + Send + Sync>(
        &self,
        target: &Pid,
        message: M,
        timeout: Duration,
    ) -> Result<AnyMessage, RequestErr> {
        let (process, reply) = FutureProcess::new();
        let id = self.inner.registry.next_id();
        let reply_pid = self
            .inner
            .registry
            .add(&id, process)
            .map_err(|_| RequestErr::Terminated)?
            .with_request_id(self.inner.request_sequence.fetch_add(1, Ordering::Relaxed));

        self.deliver(
            Envelope::new(message)
                .with_target(target.clone())
                .with_sender(reply_pid.clone()),
        );

        let result = tokio::time::timeout(timeout, reply).await;
        self.inner.registry.remove(&reply_pid);

        match result {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(RequestErr::Terminated),
            Err(_) => Err(RequestErr::Timeout),
        }
    }

    /// Asks `pid` to stop, without waiting.
    pub fn stop(&self, pid: &Pid) {
        self.inner.registry.get(pid).stop();
    }

    /// Asks `pid` to stop and waits for its termination notification.
    pub async fn stop_and_wait(&self, pid: &Pid) {
        let (process, reply) = FutureProcess::new();
        let id = self.inner.registry.next_id();
        let Ok(watcher_pid) = self.inner.registry.add(&id, process) else {
            self.stop(pid);
            return;
        };

        let target = self.inner.registry.get(pid);
        target.send_system(SystemMessage::Watch(watcher_pid.clone()));
        target.stop();

        // A pid that is already gone resolved to the dead-letter sink and
        // will never answer; the deadline keeps this call total.
        let _ = tokio::time::timeout(SHUTDOWN_DEADLINE, reply).await;
        self.inner.registry.remove(&watcher_pid);
    }

    /// Cancellation signal raised once for the lifetime of the system.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stops every local process and drains the event stream. Stop requests
    /// go out in chunks under one cooperative deadline so shutdown cannot
    /// hang on a stuck actor.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }

        info!(address = %self.address(), "actor system shutting down");
        self.inner.shutdown.cancel();

        let deadline = Instant::now() + SHUTDOWN_DEADLINE;
        let ids = self.inner.registry.local_ids();

        for chunk in ids.chunks(SHUTDOWN_STOP_CHUNK) {
            let pending: Vec<_> = chunk
                .iter()
                .filter_map(|id| self.inner.registry.get_local(id).map(|p| (id.clone(), p)))
                .collect();

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("shutdown deadline reached, abandoning graceful stop");
                break;
            }

            let stops = pending.iter().map(|(id, process)| {
                let pid = Pid::new(self.address(), id.clone());
                process.stop();
                self.await_removed(pid)
            });

            if tokio::time::timeout(remaining, futures::future::join_all(stops))
                .await
                .is_err()
            {
                warn!("shutdown deadline reached, abandoning graceful stop");
                break;
            }
        }

        self.inner.event_stream.drain().await;

        info!(address = %self.address(), "actor system stopped");
    }

    async fn await_removed(&self, pid: Pid) {
        while self.inner.registry.get_local(&pid.id).is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}
