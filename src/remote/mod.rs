use crate::actor::pid::client_address;
use crate::actor::process::ProcessRef;
use crate::actor::props::Props;
use crate::actor::system::ActorSystem;
use crate::actor::{Pid, SpawnErr};
use crate::remote::activator::{
    ActivationRequest, ActivationResponse, Activator, ACTIVATION_REQUEST_TAG,
    ACTIVATION_RESPONSE_TAG, ACTIVATOR_ID,
};
use crate::remote::codec::MessageCodec;
use crate::remote::config::RemoteConfig;
use crate::remote::endpoint::manager::EndpointManager;
use crate::remote::endpoint::EndpointRuntime;
use crate::remote::handler::RemoteMessageHandler;
use crate::remote::net::{ChannelProvider, TcpChannelProvider};
use crate::remote::process::RemoteProcess;

use parking_lot::Mutex as SyncMutex;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod activator;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod handler;
pub mod net;
pub(crate) mod process;

pub use endpoint::{
    ConnectorState, Endpoint, EndpointConnectedEvent, EndpointKind, EndpointTerminatedEvent,
};

#[derive(Debug)]
pub enum RemoteStartErr {
    Bind(std::io::Error),
    Spawn(SpawnErr),
}

impl Display for RemoteStartErr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteStartErr::Bind(e) => write!(f, "failed to bind listener: {}", e),
            RemoteStartErr::Spawn(e) => write!(f, "failed to spawn system actor: {}", e),
        }
    }
}

impl std::error::Error for RemoteStartErr {}

/// The remote layer of one actor system: listener, endpoint manager, wire
/// codec and the activator. Starting it registers a host resolver so that
/// sends to foreign pids transparently route through endpoints.
#[derive(Clone)]
pub struct Remote {
    inner: Arc<RemoteInner>,
}

struct RemoteInner {
    system: ActorSystem,
    config: Arc<RemoteConfig>,
    manager: EndpointManager,
    listener_task: SyncMutex<Option<JoinHandle<()>>>,
    listener_shutdown: CancellationToken,
    activator: Pid,
    stopped: AtomicBool,
}

impl Remote {
    pub async fn start(system: &ActorSystem, config: RemoteConfig) -> Result<Remote, RemoteStartErr> {
        config.codec.register::<ActivationRequest>(ACTIVATION_REQUEST_TAG);
        config
            .codec
            .register::<ActivationResponse>(ACTIVATION_RESPONSE_TAG);

        let listener = match &config.listen_address {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await.map_err(RemoteStartErr::Bind)?;
                let bound = listener.local_addr().map_err(RemoteStartErr::Bind)?;
                let advertised = config
                    .advertised_address
                    .clone()
                    .unwrap_or_else(|| bound.to_string());
                system.registry().set_address(advertised.into());
                Some(listener)
            }
            None => {
                let address = client_address(&system.system_id().simple().to_string());
                system.registry().set_address(address);
                None
            }
        };

        let provider: Arc<dyn ChannelProvider> = config
            .channel_provider
            .clone()
            .unwrap_or_else(|| Arc::new(TcpChannelProvider::new(config.max_frame_bytes)));
        let codec = config.codec.clone();
        let kinds = Arc::new(config.kinds.clone());
        let config = Arc::new(config);

        let runtime = EndpointRuntime {
            system: system.clone(),
            config: config.clone(),
            provider,
            handler: RemoteMessageHandler::new(system.clone(), codec.clone()),
        };

        let manager = EndpointManager::new(runtime);
        manager.start();

        {
            let resolver_manager = manager.clone();
            let resolver_codec = codec.clone();
            let resolver_system = system.clone();
            system
                .registry()
                .register_host_resolver(Arc::new(move |pid| {
                    Some(Arc::new(RemoteProcess::new(
                        pid.clone(),
                        resolver_manager.clone(),
                        resolver_codec.clone(),
                        resolver_system.clone(),
                    )) as ProcessRef)
                }));
        }

        let activator = system
            .spawn_named(
                Props::from_producer(move || Activator::new(kinds.clone())),
                ACTIVATOR_ID,
            )
            .map_err(RemoteStartErr::Spawn)?;

        let listener_shutdown = system.shutdown_token().child_token();
        let listener_task = listener.map(|listener| {
            tokio::spawn(net::server::serve(
                listener,
                manager.clone(),
                listener_shutdown.clone(),
            ))
        });

        info!(address = %system.address(), "remote layer started");

        Ok(Remote {
            inner: Arc::new(RemoteInner {
                system: system.clone(),
                config,
                manager,
                listener_task: SyncMutex::new(listener_task),
                listener_shutdown,
                activator,
                stopped: AtomicBool::new(false),
            }),
        })
    }

    pub fn system(&self) -> &ActorSystem {
        &self.inner.system
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.inner.config
    }

    pub fn codec(&self) -> &Arc<MessageCodec> {
        &self.inner.config.codec
    }

    pub fn endpoint_manager(&self) -> &EndpointManager {
        &self.inner.manager
    }

    pub fn activator_pid(&self) -> &Pid {
        &self.inner.activator
    }

    /// Stops the listener, disposes every endpoint and stops the activator.
    /// Further calls are no-ops.
    pub async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.listener_shutdown.cancel();
        let listener_task = self.inner.listener_task.lock().take();
        if let Some(task) = listener_task {
            let _ = task.await;
        }

        self.inner.manager.stop().await;
        self.inner.system.stop_and_wait(&self.inner.activator).await;

        info!(address = %self.inner.system.address(), "remote layer stopped");
    }
}
