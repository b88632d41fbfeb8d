use plexus::actor::process::{DeadLetterEvent, Process};
use plexus::actor::{ActorSystem, Envelope, Pid, SystemMessage};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub mod util;

struct CountingSink {
    received: Arc<Mutex<Vec<String>>>,
    label: &'static str,
}

impl Process for CountingSink {
    fn send_user(&self, envelope: Envelope) {
        self.received
            .lock()
            .push(format!("{}:{}", self.label, envelope.message.type_name()));
    }

    fn send_system(&self, _message: SystemMessage) {}

    fn stop(&self) {}
}

#[tokio::test]
pub async fn test_unknown_local_pid_resolves_to_dead_letter() {
    util::create_trace_logger();

    let system = ActorSystem::new();
    let dead_letters = Arc::new(Mutex::new(Vec::new()));

    let subscriber_dead_letters = dead_letters.clone();
    let _subscription = system
        .event_stream()
        .subscribe::<DeadLetterEvent, _>(move |event| {
            subscriber_dead_letters
                .lock()
                .push(event.target.clone());
        });

    let missing = Pid::new(system.address(), "no-such-actor");
    system.send(&missing, 42i64);

    assert!(
        util::wait_until(|| dead_letters.lock().len() == 1, Duration::from_secs(5)).await
    );
    assert_eq!(dead_letters.lock()[0], Some(missing));
}

#[tokio::test]
pub async fn test_host_resolvers_run_in_registration_order() {
    util::create_trace_logger();

    let system = ActorSystem::new();
    let received = Arc::new(Mutex::new(Vec::new()));

    let first_received = received.clone();
    system
        .registry()
        .register_host_resolver(Arc::new(move |pid| {
            if pid.address.starts_with("alpha") {
                Some(Arc::new(CountingSink {
                    received: first_received.clone(),
                    label: "first",
                }) as Arc<dyn Process>)
            } else {
                None
            }
        }));

    let second_received = received.clone();
    system
        .registry()
        .register_host_resolver(Arc::new(move |_pid| {
            Some(Arc::new(CountingSink {
                received: second_received.clone(),
                label: "second",
            }) as Arc<dyn Process>)
        }));

    system.send(&Pid::new("alpha:1000", "x"), 1i64);
    system.send(&Pid::new("beta:1000", "x"), 2i64);

    assert!(
        util::wait_until(|| received.lock().len() == 2, Duration::from_secs(5)).await
    );
    assert_eq!(received.lock()[0], "first:i64");
    assert_eq!(received.lock()[1], "second:i64");
}

#[tokio::test]
pub async fn test_add_remove_roundtrip() {
    util::create_trace_logger();

    let system = ActorSystem::new();
    let received = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::new(CountingSink {
        received: received.clone(),
        label: "sink",
    });

    let pid = system
        .registry()
        .add("manual", sink)
        .expect("register sink");
    assert!(system.registry().get_local("manual").is_some());

    system.send(&pid, "hello".to_string());
    assert!(
        util::wait_until(|| received.lock().len() == 1, Duration::from_secs(5)).await
    );

    system.registry().remove(&pid);
    assert!(system.registry().get_local("manual").is_none());

    // Sends after removal fall through to dead letters, not the old sink.
    system.send(&pid, "late".to_string());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(received.lock().len(), 1);
}

#[tokio::test]
pub async fn test_generated_ids_are_unique() {
    util::create_trace_logger();

    let system = ActorSystem::new();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..1000 {
        assert!(seen.insert(system.registry().next_id()));
    }
}
