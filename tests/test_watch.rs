use plexus::actor::context::ActorContext;
use plexus::actor::{
    Actor, ActorError, ActorSystem, Envelope, Pid, Props, StopReason, Terminated,
};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub mod util;

#[macro_use]
extern crate async_trait;

struct WatchSubject;

#[async_trait]
impl Actor for WatchSubject {
    async fn receive(
        &mut self,
        _ctx: &mut ActorContext,
        _envelope: Envelope,
    ) -> Result<(), ActorError> {
        Ok(())
    }
}

struct StartWatching(Pid);

struct Watcher {
    notifications: Arc<Mutex<Vec<(Pid, StopReason)>>>,
}

#[async_trait]
impl Actor for Watcher {
    async fn receive(
        &mut self,
        ctx: &mut ActorContext,
        envelope: Envelope,
    ) -> Result<(), ActorError> {
        if let Some(StartWatching(subject)) = envelope.message.downcast_ref::<StartWatching>() {
            ctx.watch(subject);
        } else if let Some(terminated) = envelope.message.downcast_ref::<Terminated>() {
            self.notifications
                .lock()
                .push((terminated.who.clone(), terminated.reason.clone()));
        }
        Ok(())
    }
}

#[tokio::test]
pub async fn test_watcher_is_notified_on_subject_stop() {
    util::create_trace_logger();

    let system = ActorSystem::new();
    let notifications = Arc::new(Mutex::new(Vec::new()));

    let watcher_notifications = notifications.clone();
    let watcher = system
        .spawn_named(
            Props::from_producer(move || Watcher {
                notifications: watcher_notifications.clone(),
            }),
            "watcher",
        )
        .expect("spawn watcher");

    let subject = system
        .spawn_named(Props::from_producer(|| WatchSubject), "subject")
        .expect("spawn subject");

    system.send(&watcher, StartWatching(subject.clone()));

    // Give the Watch registration time to land before stopping.
    assert!(
        util::wait_until(
            || system.registry().get_local("subject").is_some(),
            Duration::from_secs(5)
        )
        .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    system.stop(&subject);

    assert!(
        util::wait_until(|| notifications.lock().len() == 1, Duration::from_secs(5)).await
    );

    let (who, reason) = notifications.lock()[0].clone();
    assert_eq!(who, subject);
    assert_eq!(reason, StopReason::Stopped);
}

#[tokio::test]
pub async fn test_unwatch_suppresses_notification() {
    util::create_trace_logger();

    let system = ActorSystem::new();
    let notifications = Arc::new(Mutex::new(Vec::new()));

    struct ToggleWatcher {
        notifications: Arc<Mutex<Vec<(Pid, StopReason)>>>,
    }

    struct WatchThenUnwatch(Pid);

    #[async_trait]
    impl Actor for ToggleWatcher {
        async fn receive(
            &mut self,
            ctx: &mut ActorContext,
            envelope: Envelope,
        ) -> Result<(), ActorError> {
            if let Some(WatchThenUnwatch(subject)) =
                envelope.message.downcast_ref::<WatchThenUnwatch>()
            {
                ctx.watch(subject);
                ctx.unwatch(subject);
            } else if let Some(terminated) = envelope.message.downcast_ref::<Terminated>() {
                self.notifications
                    .lock()
                    .push((terminated.who.clone(), terminated.reason.clone()));
            }
            Ok(())
        }
    }

    let watcher_notifications = notifications.clone();
    let watcher = system
        .spawn_named(
            Props::from_producer(move || ToggleWatcher {
                notifications: watcher_notifications.clone(),
            }),
            "toggle-watcher",
        )
        .expect("spawn watcher");

    let subject = system
        .spawn_named(Props::from_producer(|| WatchSubject), "toggle-subject")
        .expect("spawn subject");

    system.send(&watcher, WatchThenUnwatch(subject.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    system.stop_and_wait(&subject).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(notifications.lock().is_empty());
}
