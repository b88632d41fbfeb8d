use crate::actor::event_stream::Subscription;
use crate::actor::pid::CLIENT_ADDRESS_PREFIX;
use crate::diagnostics::{DiagnosticEntry, Diagnostics};
use crate::remote::endpoint::{Endpoint, EndpointRuntime, EndpointTerminatedEvent};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Lazy map of remote endpoints, keyed by address for server peers and by
/// peer system id for client peers.
///
/// Lock discipline: lookups run against lock-free maps; the single
/// coordination mutex exists solely to make `check blocklist -> check map ->
/// insert` atomic, and to serialise the map/blocklist mutations of the
/// termination handler and shutdown. Endpoint construction is synchronous
/// and cheap, so it may happen under the lock; endpoint *disposal* performs
/// network-ordered shutdown and always happens outside it. No suspension
/// point runs while the lock is held.
#[derive(Clone)]
pub struct EndpointManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    runtime: EndpointRuntime,
    server_endpoints: DashMap<Arc<str>, Endpoint>,
    client_endpoints: DashMap<Arc<str>, Endpoint>,
    blocked_addresses: DashMap<Arc<str>, DateTime<Utc>>,
    blocked_client_ids: DashMap<Arc<str>, DateTime<Utc>>,
    coordination: SyncMutex<()>,
    shutdown: CancellationToken,
    blocked_endpoint: Endpoint,
    subscription: SyncMutex<Option<Subscription>>,
    /// Termination-handler tasks, awaited by `stop`.
    tracker: TaskTracker,
}

enum BlockKey {
    Address(Arc<str>),
    ClientSystemId(Arc<str>),
}

/// Removes its blocklist entry when dropped, so the entry disappears on
/// every exit path of the termination handler.
struct UnblockGuard {
    manager: Arc<ManagerInner>,
    key: BlockKey,
}

impl Drop for UnblockGuard {
    fn drop(&mut self) {
        match &self.key {
            BlockKey::Address(address) => {
                self.manager.blocked_addresses.remove(address.as_ref());
                trace!(address = %address, "address unblocked");
            }
            BlockKey::ClientSystemId(system_id) => {
                self.manager.blocked_client_ids.remove(system_id.as_ref());
                trace!(system_id = %system_id, "client system id unblocked");
            }
        }
    }
}

impl EndpointManager {
    pub(crate) fn new(runtime: EndpointRuntime) -> EndpointManager {
        let blocked_endpoint = Endpoint::blocked(runtime.system.clone());

        EndpointManager {
            inner: Arc::new(ManagerInner {
                runtime,
                server_endpoints: DashMap::new(),
                client_endpoints: DashMap::new(),
                blocked_addresses: DashMap::new(),
                blocked_client_ids: DashMap::new(),
                coordination: SyncMutex::new(()),
                shutdown: CancellationToken::new(),
                blocked_endpoint,
                subscription: SyncMutex::new(None),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Subscribes the termination handler to the event stream.
    pub(crate) fn start(&self) {
        let manager = self.clone();
        let subscription = self
            .inner
            .runtime
            .system
            .event_stream()
            .subscribe::<EndpointTerminatedEvent, _>(move |event| {
                let manager = manager.clone();
                let event = (*event).clone();
                let tracker = manager.inner.tracker.clone();
                tracker.spawn(async move { manager.on_endpoint_terminated(event).await });
            });

        *self.inner.subscription.lock() = Some(subscription);
    }

    /// Endpoint for a server peer at `address`, creating it on first use.
    /// Always returns an endpoint - blocked destinations, null addresses
    /// and shutdown all yield the blocked sentinel.
    pub fn get_or_add_server(&self, address: Option<&str>) -> Endpoint {
        let Some(address) = address else {
            warn!("endpoint requested for null address, returning blocked endpoint");
            return self.inner.blocked_endpoint.clone();
        };

        if self.inner.shutdown.is_cancelled() || self.inner.blocked_addresses.contains_key(address)
        {
            return self.inner.blocked_endpoint.clone();
        }

        if let Some(existing) = self.inner.server_endpoints.get(address) {
            return existing.clone();
        }

        let _lock = self.inner.coordination.lock();

        // Re-check under the lock: a terminate or a racing create may have
        // won in the meantime.
        if self.inner.shutdown.is_cancelled() || self.inner.blocked_addresses.contains_key(address)
        {
            return self.inner.blocked_endpoint.clone();
        }

        if let Some(existing) = self.inner.server_endpoints.get(address) {
            return existing.clone();
        }

        let address: Arc<str> = address.into();
        let local_address = self.inner.runtime.system.address();
        let endpoint = if local_address.starts_with(CLIENT_ADDRESS_PREFIX) {
            Endpoint::client_side(address.clone(), self.inner.runtime.clone())
        } else {
            Endpoint::server_side(address.clone(), self.inner.runtime.clone())
        };

        self.inner
            .server_endpoints
            .insert(address, endpoint.clone());

        endpoint
    }

    /// Endpoint for a client-mode peer, creating a buffering endpoint on
    /// first use. Its transmit path attaches once the peer connects in.
    pub fn get_or_add_client(&self, system_id: &str) -> Endpoint {
        if self.inner.shutdown.is_cancelled()
            || self.inner.blocked_client_ids.contains_key(system_id)
        {
            return self.inner.blocked_endpoint.clone();
        }

        if let Some(existing) = self.inner.client_endpoints.get(system_id) {
            return existing.clone();
        }

        let _lock = self.inner.coordination.lock();

        if self.inner.shutdown.is_cancelled()
            || self.inner.blocked_client_ids.contains_key(system_id)
        {
            return self.inner.blocked_endpoint.clone();
        }

        if let Some(existing) = self.inner.client_endpoints.get(system_id) {
            return existing.clone();
        }

        let system_id: Arc<str> = system_id.into();
        let endpoint = Endpoint::server_side_client(system_id.clone(), &self.inner.runtime);
        self.inner
            .client_endpoints
            .insert(system_id, endpoint.clone());

        endpoint
    }

    /// Lookup-only variant of [`get_or_add_server`](Self::get_or_add_server).
    pub fn get_server(&self, address: &str) -> Option<Endpoint> {
        self.inner
            .server_endpoints
            .get(address)
            .map(|e| e.value().clone())
    }

    /// Lookup-only variant of [`get_or_add_client`](Self::get_or_add_client).
    pub fn get_client(&self, system_id: &str) -> Option<Endpoint> {
        self.inner
            .client_endpoints
            .get(system_id)
            .map(|e| e.value().clone())
    }

    pub fn is_blocked_address(&self, address: &str) -> bool {
        self.inner.blocked_addresses.contains_key(address)
    }

    pub fn is_blocked_client(&self, system_id: &str) -> bool {
        self.inner.blocked_client_ids.contains_key(system_id)
    }

    pub fn server_endpoint_count(&self) -> usize {
        self.inner.server_endpoints.len()
    }

    pub fn client_endpoint_count(&self) -> usize {
        self.inner.client_endpoints.len()
    }

    pub(crate) fn runtime(&self) -> &EndpointRuntime {
        &self.inner.runtime
    }

    pub(crate) fn blocked_endpoint(&self) -> Endpoint {
        self.inner.blocked_endpoint.clone()
    }

    /// Handles one `EndpointTerminated` event: bury the key, dispose the
    /// endpoint outside the lock, optionally honour the post-termination
    /// grace, and unblock no matter what happened in between.
    async fn on_endpoint_terminated(&self, event: EndpointTerminatedEvent) {
        debug!(
            address = event.address.as_deref(),
            system_id = event.system_id.as_deref(),
            should_block = event.should_block,
            "endpoint terminated"
        );

        let mut to_dispose: Vec<Endpoint> = Vec::new();
        let mut unblocks: Vec<UnblockGuard> = Vec::new();

        {
            let _lock = self.inner.coordination.lock();

            if self.inner.shutdown.is_cancelled() {
                return;
            }

            if let Some(address) = &event.address {
                let removed = self
                    .inner
                    .server_endpoints
                    .remove(address.as_str())
                    .map(|(_, endpoint)| endpoint);
                let already_blocked = self.inner.blocked_addresses.contains_key(address.as_str());

                // A missing endpoint with a live blocklist entry means an
                // earlier handler for the same key is still in flight;
                // disposal happens at most once.
                if removed.is_some() || !already_blocked {
                    let key: Arc<str> = address.as_str().into();
                    self.inner.blocked_addresses.insert(key.clone(), Utc::now());
                    unblocks.push(UnblockGuard {
                        manager: self.inner.clone(),
                        key: BlockKey::Address(key),
                    });
                }

                if let Some(endpoint) = removed {
                    to_dispose.push(endpoint);
                }
            }

            if let Some(system_id) = &event.system_id {
                let removed = self
                    .inner
                    .client_endpoints
                    .remove(system_id.as_str())
                    .map(|(_, endpoint)| endpoint);
                let already_blocked = self
                    .inner
                    .blocked_client_ids
                    .contains_key(system_id.as_str());

                if removed.is_some() || !already_blocked {
                    let key: Arc<str> = system_id.as_str().into();
                    self.inner
                        .blocked_client_ids
                        .insert(key.clone(), Utc::now());
                    unblocks.push(UnblockGuard {
                        manager: self.inner.clone(),
                        key: BlockKey::ClientSystemId(key),
                    });
                }

                if let Some(endpoint) = removed {
                    to_dispose.push(endpoint);
                }
            }
        }

        for endpoint in to_dispose {
            endpoint.dispose().await;
        }

        if event.should_block || self.inner.runtime.config.delay_without_block {
            if !unblocks.is_empty() {
                if let Some(wait) = self.inner.runtime.config.wait_after_endpoint_termination {
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = self.inner.shutdown.cancelled() => {}
                    }
                }
            }
        }

        // Guards drop here: the blocklist entries are removed on every path,
        // so no key stays blocked forever.
        drop(unblocks);
    }

    /// Raises the shutdown signal and disposes every endpoint, awaiting
    /// in-flight termination handlers. Further calls return immediately.
    /// The activator actor is stopped by the remote layer after this.
    pub async fn stop(&self) {
        {
            let _lock = self.inner.coordination.lock();

            if self.inner.shutdown.is_cancelled() {
                return;
            }

            if let Some(subscription) = self.inner.subscription.lock().take() {
                subscription.unsubscribe();
            }

            self.inner.shutdown.cancel();
        }

        let servers: Vec<Endpoint> = self
            .inner
            .server_endpoints
            .iter()
            .map(|e| e.value().clone())
            .collect();
        self.inner.server_endpoints.clear();

        let clients: Vec<Endpoint> = self
            .inner
            .client_endpoints
            .iter()
            .map(|e| e.value().clone())
            .collect();
        self.inner.client_endpoints.clear();

        for endpoint in servers {
            endpoint.dispose().await;
        }
        for endpoint in clients {
            endpoint.dispose().await;
        }

        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        debug!("endpoint manager stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl Diagnostics for EndpointManager {
    fn diagnostics(&self) -> Vec<DiagnosticEntry> {
        vec![
            DiagnosticEntry::new(
                "endpoint-manager",
                "server_endpoints",
                self.inner.server_endpoints.len().to_string(),
            ),
            DiagnosticEntry::new(
                "endpoint-manager",
                "client_endpoints",
                self.inner.client_endpoints.len().to_string(),
            ),
            DiagnosticEntry::new(
                "endpoint-manager",
                "blocked_addresses",
                self.inner.blocked_addresses.len().to_string(),
            ),
            DiagnosticEntry::new(
                "endpoint-manager",
                "blocked_client_system_ids",
                self.inner.blocked_client_ids.len().to_string(),
            ),
            DiagnosticEntry::new(
                "endpoint-manager",
                "stopped",
                self.inner.shutdown.is_cancelled().to_string(),
            ),
        ]
    }
}
