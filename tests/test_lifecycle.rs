use plexus::actor::context::ActorContext;
use plexus::actor::{
    Actor, ActorError, ActorSystem, Envelope, Props, SpawnErr, StopReason, Terminated,
};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub mod util;

#[macro_use]
extern crate async_trait;

struct LifecycleActor {
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Actor for LifecycleActor {
    async fn started(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        self.events.lock().push("started".to_string());
        Ok(())
    }

    async fn receive(
        &mut self,
        _ctx: &mut ActorContext,
        envelope: Envelope,
    ) -> Result<(), ActorError> {
        if let Some(value) = envelope.message.downcast_ref::<String>() {
            self.events.lock().push(format!("recv:{}", value));
        }
        Ok(())
    }

    async fn stopping(&mut self, _ctx: &mut ActorContext) {
        self.events.lock().push("stopping".to_string());
    }

    async fn stopped(&mut self, _ctx: &mut ActorContext) {
        self.events.lock().push("stopped".to_string());
    }
}

#[tokio::test]
pub async fn test_lifecycle_hooks_run_in_order() {
    util::create_trace_logger();

    let system = ActorSystem::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let producer_events = events.clone();

    let pid = system
        .spawn_named(
            Props::from_producer(move || LifecycleActor {
                events: producer_events.clone(),
            }),
            "lifecycle",
        )
        .expect("spawn");

    system.send(&pid, "hello".to_string());
    system.stop_and_wait(&pid).await;

    assert_eq!(
        *events.lock(),
        vec![
            "started".to_string(),
            "recv:hello".to_string(),
            "stopping".to_string(),
            "stopped".to_string()
        ]
    );

    // The registry entry is gone once the actor reports Stopped.
    assert!(system.registry().get_local("lifecycle").is_none());
}

#[tokio::test]
pub async fn test_spawn_duplicate_id_fails() {
    util::create_trace_logger();

    let system = ActorSystem::new();
    let (props, _) = util::collecting_props();

    let first = system.spawn_named(props.clone(), "unique");
    assert!(first.is_ok());

    match system.spawn_named(props, "unique") {
        Err(SpawnErr::AlreadyExists(pid)) => assert_eq!(&*pid.id, "unique"),
        other => panic!("expected AlreadyExists, got {:?}", other),
    }
}

#[tokio::test]
pub async fn test_per_sender_ordering() {
    util::create_trace_logger();

    let system = ActorSystem::new();
    let (props, values) = util::collecting_props();
    let pid = system.spawn(props).expect("spawn");

    const COUNT: i64 = 500;
    for i in 0..COUNT {
        system.send(&pid, i);
    }

    assert!(
        util::wait_until(
            || values.lock().len() == COUNT as usize,
            Duration::from_secs(5)
        )
        .await
    );

    let observed = values.lock().clone();
    let expected: Vec<i64> = (0..COUNT).collect();
    assert_eq!(observed, expected);
}

struct StopDuringStartup;

#[async_trait]
impl Actor for StopDuringStartup {
    async fn started(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        ctx.stop_self();
        Ok(())
    }

    async fn receive(
        &mut self,
        _ctx: &mut ActorContext,
        _envelope: Envelope,
    ) -> Result<(), ActorError> {
        Ok(())
    }
}

#[tokio::test]
pub async fn test_stop_requested_during_startup() {
    util::create_trace_logger();

    let system = ActorSystem::new();
    let pid = system
        .spawn_named(Props::from_producer(|| StopDuringStartup), "short-lived")
        .expect("spawn");

    assert!(
        util::wait_until(
            || system.registry().get_local(&pid.id).is_none(),
            Duration::from_secs(5)
        )
        .await
    );
}

struct ChildSpawner {
    child_count: usize,
    stopped_children: Arc<AtomicUsize>,
}

#[async_trait]
impl Actor for ChildSpawner {
    async fn started(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        for i in 0..self.child_count {
            let (props, _) = util::collecting_props();
            ctx.spawn_child_named(props, &format!("child-{}", i))
                .map_err(|e| ActorError::new(e.to_string()))?;
        }
        Ok(())
    }

    async fn receive(
        &mut self,
        _ctx: &mut ActorContext,
        envelope: Envelope,
    ) -> Result<(), ActorError> {
        if let Some(Terminated { reason, .. }) = envelope.message.downcast_ref::<Terminated>() {
            assert_eq!(*reason, StopReason::Stopped);
            self.stopped_children.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[tokio::test]
pub async fn test_stopping_parent_stops_children() {
    util::create_trace_logger();

    let system = ActorSystem::new();
    let stopped_children = Arc::new(AtomicUsize::new(0));
    let counter = stopped_children.clone();

    let pid = system
        .spawn_named(
            Props::from_producer(move || ChildSpawner {
                child_count: 5,
                stopped_children: counter.clone(),
            }),
            "parent",
        )
        .expect("spawn");

    assert!(
        util::wait_until(
            || {
                (0..5).all(|i| {
                    system
                        .registry()
                        .get_local(&format!("child-{}", i))
                        .is_some()
                })
            },
            Duration::from_secs(5)
        )
        .await
    );

    system.stop_and_wait(&pid).await;

    for i in 0..5 {
        assert!(
            system
                .registry()
                .get_local(&format!("child-{}", i))
                .is_none(),
            "child-{} still registered after parent stopped",
            i
        );
    }
}
