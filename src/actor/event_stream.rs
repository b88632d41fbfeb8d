use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

type DynEvent = Arc<dyn Any + Send + Sync>;

/// In-process typed pub/sub bus.
///
/// Events are keyed by their concrete type. Each subscriber gets its own
/// forwarding task, so delivery order for a single subscriber matches
/// publication order; no order is promised across subscribers. Publication
/// is fire-and-forget - a slow or panicking subscriber never blocks or
/// fails the publisher.
#[derive(Clone)]
pub struct EventStream {
    inner: Arc<EventStreamInner>,
}

struct EventStreamInner {
    subscribers: RwLock<HashMap<TypeId, Vec<Subscriber>>>,
    next_id: AtomicU64,
    tracker: TaskTracker,
}

struct Subscriber {
    id: u64,
    sender: mpsc::UnboundedSender<DynEvent>,
}

impl EventStream {
    pub fn new() -> EventStream {
        EventStream {
            inner: Arc::new(EventStreamInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Registers `handler` for events of type `E` and returns its
    /// subscription token. The handler runs on a dedicated forwarding task;
    /// panics are caught and logged so a stray subscriber cannot halt
    /// publication.
    pub fn subscribe<E, F>(&self, handler: F) -> Subscription
    where
        E: Any + Send + Sync,
        F: Fn(Arc<E>) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<DynEvent>();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let type_id = TypeId::of::<E>();

        self.inner
            .subscribers
            .write()
            .entry(type_id)
            .or_default()
            .push(Subscriber { id, sender: tx });

        let event_type = std::any::type_name::<E>();
        self.inner.tracker.spawn(async move {
            while let Some(event) = rx.recv().await {
                let Ok(event) = event.downcast::<E>() else {
                    continue;
                };

                let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
                if result.is_err() {
                    error!(event_type, "event handler panicked, event dropped");
                }
            }
        });

        Subscription {
            id,
            type_id,
            stream: Arc::downgrade(&self.inner),
        }
    }

    pub fn publish<E: Any + Send + Sync>(&self, event: E) {
        let event: DynEvent = Arc::new(event);

        let subscribers = self.inner.subscribers.read();
        if let Some(entries) = subscribers.get(&TypeId::of::<E>()) {
            for subscriber in entries {
                // A closed channel just means the subscriber is shutting
                // down; its entry is removed on unsubscribe or drain.
                let _ = subscriber.sender.send(event.clone());
            }
        } else {
            trace!(
                event_type = std::any::type_name::<E>(),
                "no subscribers, event dropped"
            );
        }
    }

    pub fn subscriber_count<E: Any>(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Drops every subscription and waits for the forwarding tasks to finish
    /// delivering what they already hold.
    pub(crate) async fn drain(&self) {
        self.inner.subscribers.write().clear();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure handle to one subscription. Unsubscribing is a map removal; dropping
/// the token without unsubscribing leaves the subscription active.
pub struct Subscription {
    id: u64,
    type_id: TypeId,
    stream: Weak<EventStreamInner>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.stream.upgrade() {
            let mut subscribers = inner.subscribers.write();
            if let Some(entries) = subscribers.get_mut(&self.type_id) {
                entries.retain(|s| s.id != self.id);
                if entries.is_empty() {
                    subscribers.remove(&self.type_id);
                }
            }
        }
    }
}
