use crate::actor::process::DeadLetterEvent;
use crate::actor::system::ActorSystem;
use crate::remote::config::RemoteConfig;
use crate::remote::handler::RemoteMessageHandler;
use crate::remote::net::message::{Hello, WireFrame};
use crate::remote::net::{Channel, ChannelProvider, FrameSink, FrameSource};

use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod manager;

/// Published once per established connection.
#[derive(Debug, Clone)]
pub struct EndpointConnectedEvent {
    pub address: String,
}

/// Published when an endpoint's link is gone for good. `should_block`
/// asks the endpoint manager to keep the key blocklisted for the
/// configured grace period.
#[derive(Debug, Clone)]
pub struct EndpointTerminatedEvent {
    pub should_block: bool,
    pub address: Option<String>,
    pub system_id: Option<String>,
}

/// Connector lifecycle, observable for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Connecting,
    Connected,
    Terminating,
    Terminated,
}

impl ConnectorState {
    fn from_u8(value: u8) -> ConnectorState {
        match value {
            0 => ConnectorState::Connecting,
            1 => ConnectorState::Connected,
            2 => ConnectorState::Terminating,
            _ => ConnectorState::Terminated,
        }
    }
}

/// What one endpoint is a link to.
#[derive(Debug, Clone)]
pub enum EndpointKind {
    /// Sentinel: all traffic is dead-lettered. Returned for blocklisted or
    /// unknown destinations and during shutdown.
    Blocked,
    /// Outbound link from a listening system to a peer's `host:port`.
    ServerSide { address: Arc<str> },
    /// Outbound link from a client-mode system to a peer's `host:port`.
    ClientSide { address: Arc<str> },
    /// Link to a client-mode peer, reachable only over the connection that
    /// peer opened towards us.
    ServerSideClient { system_id: Arc<str> },
}

/// Everything an endpoint needs from the remote layer.
#[derive(Clone)]
pub(crate) struct EndpointRuntime {
    pub system: ActorSystem,
    pub config: Arc<RemoteConfig>,
    pub provider: Arc<dyn ChannelProvider>,
    pub handler: RemoteMessageHandler,
}

/// One logical link to a peer: a bounded outbound queue plus a connector
/// driving `Connecting -> Connected -> Terminating -> Terminated`.
///
/// Sends never block: a full queue or terminated link dead-letters the
/// message (at-most-once delivery). Construction is synchronous and cheap -
/// the connector is scheduled, never awaited - so endpoints can be created
/// while holding the manager's coordination lock.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

struct EndpointInner {
    kind: EndpointKind,
    system: ActorSystem,
    outbound: Option<mpsc::Sender<WireFrame>>,
    /// Receiver parked until a conduit attaches; `ServerSideClient` only.
    pending_source: SyncMutex<Option<mpsc::Receiver<WireFrame>>>,
    cancellation: CancellationToken,
    state: AtomicU8,
    task: SyncMutex<Option<JoinHandle<()>>>,
}

impl EndpointInner {
    fn set_state(&self, state: ConnectorState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Endpoint {
    pub(crate) fn server_side(address: Arc<str>, runtime: EndpointRuntime) -> Endpoint {
        Self::dialing(EndpointKind::ServerSide { address }, runtime)
    }

    pub(crate) fn client_side(address: Arc<str>, runtime: EndpointRuntime) -> Endpoint {
        Self::dialing(EndpointKind::ClientSide { address }, runtime)
    }

    fn dialing(kind: EndpointKind, runtime: EndpointRuntime) -> Endpoint {
        let (tx, rx) = mpsc::channel(runtime.config.outbound_queue_capacity);
        let inner = Arc::new(EndpointInner {
            kind,
            system: runtime.system.clone(),
            outbound: Some(tx),
            pending_source: SyncMutex::new(None),
            cancellation: CancellationToken::new(),
            state: AtomicU8::new(ConnectorState::Connecting as u8),
            task: SyncMutex::new(None),
        });

        let task = tokio::spawn(run_connector(inner.clone(), rx, runtime));
        *inner.task.lock() = Some(task);

        Endpoint { inner }
    }

    /// Endpoint for a client-mode peer. Outbound messages buffer until the
    /// peer's inbound connection attaches a conduit.
    pub(crate) fn server_side_client(system_id: Arc<str>, runtime: &EndpointRuntime) -> Endpoint {
        let (tx, rx) = mpsc::channel(runtime.config.outbound_queue_capacity);
        Endpoint {
            inner: Arc::new(EndpointInner {
                kind: EndpointKind::ServerSideClient { system_id },
                system: runtime.system.clone(),
                outbound: Some(tx),
                pending_source: SyncMutex::new(Some(rx)),
                cancellation: CancellationToken::new(),
                state: AtomicU8::new(ConnectorState::Connecting as u8),
                task: SyncMutex::new(None),
            }),
        }
    }

    /// The sentinel that drops everything.
    pub(crate) fn blocked(system: ActorSystem) -> Endpoint {
        Endpoint {
            inner: Arc::new(EndpointInner {
                kind: EndpointKind::Blocked,
                system,
                outbound: None,
                pending_source: SyncMutex::new(None),
                cancellation: CancellationToken::new(),
                state: AtomicU8::new(ConnectorState::Terminated as u8),
                task: SyncMutex::new(None),
            }),
        }
    }

    pub fn kind(&self) -> &EndpointKind {
        &self.inner.kind
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.inner.kind, EndpointKind::Blocked)
    }

    pub fn address(&self) -> Option<&str> {
        match &self.inner.kind {
            EndpointKind::ServerSide { address } | EndpointKind::ClientSide { address } => {
                Some(address)
            }
            _ => None,
        }
    }

    pub fn system_id(&self) -> Option<&str> {
        match &self.inner.kind {
            EndpointKind::ServerSideClient { system_id } => Some(system_id),
            _ => None,
        }
    }

    pub fn state(&self) -> ConnectorState {
        ConnectorState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Queues a frame for transmission. Never blocks; overflow and
    /// terminated links dead-letter.
    pub(crate) fn send(&self, frame: WireFrame) {
        let Some(outbound) = &self.inner.outbound else {
            dead_letter_frame(&self.inner.system, frame);
            return;
        };

        match outbound.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                warn!(
                    endpoint = ?self.inner.kind,
                    "outbound queue full, message dropped"
                );
                dead_letter_frame(&self.inner.system, frame);
            }
            Err(TrySendError::Closed(frame)) => dead_letter_frame(&self.inner.system, frame),
        }
    }

    /// Wires a client-mode peer's connection as the transmit path of this
    /// endpoint. One conduit per endpoint lifetime.
    pub(crate) fn attach_conduit(&self, mut sink: Box<dyn FrameSink>, runtime: &EndpointRuntime) {
        let Some(mut source) = self.inner.pending_source.lock().take() else {
            warn!(endpoint = ?self.inner.kind, "conduit already attached, ignoring");
            return;
        };

        let inner = self.inner.clone();
        let batch_size = runtime.config.outbound_batch_size;
        let system = runtime.system.clone();

        let task = tokio::spawn(async move {
            inner.set_state(ConnectorState::Connected);
            let mut batch: Vec<WireFrame> = Vec::with_capacity(batch_size);

            'pump: loop {
                tokio::select! {
                    _ = inner.cancellation.cancelled() => break 'pump,
                    received = source.recv_many(&mut batch, batch_size) => {
                        if received == 0 {
                            break 'pump;
                        }
                        if write_batch(&mut batch, sink.as_mut(), &system).await.is_err() {
                            break 'pump;
                        }
                    }
                }
            }

            inner.set_state(ConnectorState::Terminating);
            source.close();
            while let Ok(frame) = source.try_recv() {
                dead_letter_frame(&system, frame);
            }
            inner.set_state(ConnectorState::Terminated);
        });

        *self.inner.task.lock() = Some(task);
    }

    /// Tears the endpoint down and waits for its connector to finish. May
    /// take network-shutdown time; callers must not hold any shared lock.
    pub(crate) async fn dispose(&self) {
        self.inner.cancellation.cancel();

        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "endpoint connector task failed during disposal");
                }
            }
        }

        self.inner.set_state(ConnectorState::Terminated);
    }
}

fn dead_letter_frame(system: &ActorSystem, frame: WireFrame) {
    match frame {
        WireFrame::Envelope(envelope) => {
            system.event_stream().publish(DeadLetterEvent {
                target: Some(envelope.target),
                sender: envelope.sender,
                message_type: envelope.type_tag,
            });
        }
        frame => trace!(frame = ?frame, "non-envelope frame dropped"),
    }
}

/// Writes one drained batch, flushing once at the end. On a transport error
/// the unsent remainder is dead-lettered and `Err` is returned.
async fn write_batch(
    batch: &mut Vec<WireFrame>,
    sink: &mut dyn FrameSink,
    system: &ActorSystem,
) -> Result<(), ()> {
    let mut failed = false;

    for frame in batch.drain(..) {
        if failed {
            dead_letter_frame(system, frame);
            continue;
        }

        match frame.write_to_bytes() {
            Some(bytes) => {
                if sink.send(bytes).await.is_err() {
                    failed = true;
                }
            }
            None => dead_letter_frame(system, frame),
        }
    }

    if failed || sink.flush().await.is_err() {
        return Err(());
    }

    Ok(())
}

enum PumpExit {
    Cancelled,
    PeerClosed,
    Failed,
}

async fn run_connector(
    inner: Arc<EndpointInner>,
    mut outbound: mpsc::Receiver<WireFrame>,
    runtime: EndpointRuntime,
) {
    let address: Arc<str> = match &inner.kind {
        EndpointKind::ServerSide { address } | EndpointKind::ClientSide { address } => {
            address.clone()
        }
        _ => return,
    };

    let mut attempts: u32 = 0;
    let mut backoff = runtime.config.connect_backoff_initial;

    'connector: loop {
        inner.set_state(ConnectorState::Connecting);

        let connect = tokio::select! {
            _ = inner.cancellation.cancelled() => break 'connector,
            result = runtime.provider.connect(&address) => result,
        };

        match connect {
            Ok(channel) => {
                attempts = 0;
                backoff = runtime.config.connect_backoff_initial;
                inner.set_state(ConnectorState::Connected);

                debug!(address = %address, "endpoint connected");
                runtime.system.event_stream().publish(EndpointConnectedEvent {
                    address: address.to_string(),
                });

                match pump_connection(&inner, &mut outbound, channel, &runtime).await {
                    PumpExit::Cancelled => break 'connector,
                    PumpExit::PeerClosed | PumpExit::Failed => {
                        if inner.cancellation.is_cancelled() {
                            break 'connector;
                        }
                        info!(address = %address, "endpoint connection lost, reconnecting");
                    }
                }
            }
            Err(e) => {
                attempts += 1;
                debug!(
                    address = %address,
                    error = %e,
                    attempt = attempts,
                    "endpoint connect failed"
                );

                if let Some(max) = runtime.config.max_connect_attempts {
                    if attempts >= max {
                        warn!(
                            address = %address,
                            attempts,
                            "endpoint giving up after repeated connect failures"
                        );
                        break 'connector;
                    }
                }

                tokio::select! {
                    _ = inner.cancellation.cancelled() => break 'connector,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = std::cmp::min(backoff * 2, runtime.config.connect_backoff_max);
            }
        }
    }

    inner.set_state(ConnectorState::Terminating);
    outbound.close();
    while let Ok(frame) = outbound.try_recv() {
        dead_letter_frame(&runtime.system, frame);
    }
    inner.set_state(ConnectorState::Terminated);

    if !inner.cancellation.is_cancelled() {
        // The endpoint gave up on its own; the manager buries the address.
        runtime.system.event_stream().publish(EndpointTerminatedEvent {
            should_block: true,
            address: Some(address.to_string()),
            system_id: None,
        });
    }
}

async fn pump_connection(
    inner: &Arc<EndpointInner>,
    outbound: &mut mpsc::Receiver<WireFrame>,
    channel: Channel,
    runtime: &EndpointRuntime,
) -> PumpExit {
    let Channel {
        mut sink,
        mut source,
    } = channel;

    let hello = WireFrame::Hello(Hello {
        system_id: runtime.system.system_id().simple().to_string(),
        address: runtime.system.address().to_string(),
        is_client: matches!(inner.kind, EndpointKind::ClientSide { .. }),
        version: crate::CARGO_PKG_VERSION.to_string(),
    });

    let Some(hello_bytes) = hello.write_to_bytes() else {
        return PumpExit::Failed;
    };
    if sink.send(hello_bytes).await.is_err() || sink.flush().await.is_err() {
        return PumpExit::Failed;
    }

    let batch_size = runtime.config.outbound_batch_size;
    let mut batch: Vec<WireFrame> = Vec::with_capacity(batch_size);
    let mut malformed = 0usize;

    loop {
        tokio::select! {
            _ = inner.cancellation.cancelled() => return PumpExit::Cancelled,

            received = outbound.recv_many(&mut batch, batch_size) => {
                if received == 0 {
                    return PumpExit::Cancelled;
                }
                if write_batch(&mut batch, sink.as_mut(), &runtime.system).await.is_err() {
                    return PumpExit::Failed;
                }
            }

            frame = source.next() => match frame {
                Some(Ok(bytes)) => {
                    if let Err(e) = runtime.handler.handle_bytes(&bytes) {
                        malformed += 1;
                        warn!(
                            error = %e,
                            count = malformed,
                            "malformed inbound frame dropped"
                        );
                        if malformed > runtime.config.malformed_frame_threshold {
                            warn!("malformed frame threshold exceeded, closing connection");
                            return PumpExit::Failed;
                        }
                    }
                }
                Some(Err(e)) => {
                    debug!(error = %e, "endpoint stream error");
                    return PumpExit::Failed;
                }
                None => return PumpExit::PeerClosed,
            }
        }
    }
}
