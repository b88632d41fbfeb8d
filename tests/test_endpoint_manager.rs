use plexus::actor::ActorSystem;
use plexus::remote::config::RemoteConfig;
use plexus::remote::{EndpointTerminatedEvent, Remote};

use std::time::{Duration, Instant};

pub mod util;

async fn start_node(wait_after: Duration) -> (ActorSystem, Remote) {
    let system = ActorSystem::new();
    let remote = Remote::start(
        &system,
        RemoteConfig::new()
            .with_listen_address("127.0.0.1:0")
            .with_wait_after_endpoint_termination(Some(wait_after))
            .with_max_connect_attempts(None)
            .with_connect_backoff(Duration::from_millis(50), Duration::from_millis(200)),
    )
    .await
    .expect("start remote");

    (system, remote)
}

#[tokio::test]
pub async fn test_get_or_add_server_returns_one_endpoint_per_address() {
    util::create_trace_logger();

    let (system, remote) = start_node(Duration::from_secs(1)).await;
    let manager = remote.endpoint_manager();

    let first = manager.get_or_add_server(Some("127.0.0.1:53111"));
    let second = manager.get_or_add_server(Some("127.0.0.1:53111"));

    assert!(!first.is_blocked());
    assert_eq!(first.address(), second.address());
    assert_eq!(manager.server_endpoint_count(), 1);

    assert!(manager.get_or_add_server(None).is_blocked());

    remote.stop().await;
    system.shutdown().await;
}

#[tokio::test]
pub async fn test_terminated_address_is_blocked_until_grace_expires() {
    util::create_trace_logger();

    let (system, remote) = start_node(Duration::from_millis(300)).await;
    let manager = remote.endpoint_manager();
    let addr = "127.0.0.1:53112";

    let endpoint = manager.get_or_add_server(Some(addr));
    assert!(!endpoint.is_blocked());

    system.event_stream().publish(EndpointTerminatedEvent {
        should_block: true,
        address: Some(addr.to_string()),
        system_id: None,
    });

    assert!(
        util::wait_until(|| manager.is_blocked_address(addr), Duration::from_secs(5)).await,
        "termination handler never blocked the address"
    );
    assert!(manager.get_or_add_server(Some(addr)).is_blocked());
    assert_eq!(manager.server_endpoint_count(), 0);

    // The blocklist entry is removed in finite time; a later send creates a
    // fresh endpoint.
    assert!(
        util::wait_until(|| !manager.is_blocked_address(addr), Duration::from_secs(5)).await,
        "blocklist entry was never removed"
    );
    assert!(!manager.get_or_add_server(Some(addr)).is_blocked());

    remote.stop().await;
    system.shutdown().await;
}

#[tokio::test]
pub async fn test_termination_grace_does_not_block_other_endpoints() {
    util::create_trace_logger();

    let (system, remote) = start_node(Duration::from_secs(3)).await;
    let manager = remote.endpoint_manager();

    // Handler sleeps the full grace for this key; the manager must stay
    // responsive for everything else.
    system.event_stream().publish(EndpointTerminatedEvent {
        should_block: true,
        address: Some("127.0.0.1:53113".to_string()),
        system_id: None,
    });
    assert!(
        util::wait_until(
            || manager.is_blocked_address("127.0.0.1:53113"),
            Duration::from_secs(5)
        )
        .await
    );

    let started = Instant::now();
    for port in 53200..53230 {
        let endpoint = manager.get_or_add_server(Some(&format!("127.0.0.1:{}", port)));
        assert!(!endpoint.is_blocked());
    }
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "endpoint creation stalled behind the termination grace: {:?}",
        started.elapsed()
    );

    // Shutdown interrupts the sleeping handler instead of waiting it out.
    let stop_started = Instant::now();
    remote.stop().await;
    assert!(
        stop_started.elapsed() < Duration::from_secs(2),
        "stop waited out the grace period: {:?}",
        stop_started.elapsed()
    );

    system.shutdown().await;
}

#[tokio::test]
pub async fn test_double_termination_is_idempotent() {
    util::create_trace_logger();

    let (system, remote) = start_node(Duration::from_millis(200)).await;
    let manager = remote.endpoint_manager();
    let addr = "127.0.0.1:53114";

    manager.get_or_add_server(Some(addr));

    for _ in 0..2 {
        system.event_stream().publish(EndpointTerminatedEvent {
            should_block: true,
            address: Some(addr.to_string()),
            system_id: None,
        });
    }

    assert!(
        util::wait_until(|| manager.is_blocked_address(addr), Duration::from_secs(5)).await
    );
    assert!(
        util::wait_until(|| !manager.is_blocked_address(addr), Duration::from_secs(5)).await
    );
    assert!(!manager.get_or_add_server(Some(addr)).is_blocked());

    remote.stop().await;
    system.shutdown().await;
}

#[tokio::test]
pub async fn test_stop_is_idempotent_and_blocks_new_endpoints() {
    util::create_trace_logger();

    let (system, remote) = start_node(Duration::from_millis(200)).await;
    let manager = remote.endpoint_manager();

    manager.get_or_add_server(Some("127.0.0.1:53115"));
    manager.get_or_add_server(Some("127.0.0.1:53116"));
    assert_eq!(manager.server_endpoint_count(), 2);

    remote.stop().await;
    remote.stop().await;

    assert!(manager.is_stopped());
    assert_eq!(manager.server_endpoint_count(), 0);
    assert!(manager.get_or_add_server(Some("127.0.0.1:53117")).is_blocked());

    system.shutdown().await;
}
