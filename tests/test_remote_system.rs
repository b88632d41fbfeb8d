use plexus::actor::context::ActorContext;
use plexus::actor::{Actor, ActorError, ActorSystem, Envelope, Pid, Props, RequestErr};
use plexus::remote::activator::{ActivationRequest, ActivationResponse, ACTIVATOR_ID};
use plexus::remote::config::RemoteConfig;
use plexus::remote::Remote;

use std::time::Duration;

pub mod util;

#[macro_use]
extern crate async_trait;

#[macro_use]
extern crate serde;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Ping {
    seq: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Pong {
    seq: u64,
}

struct EchoActor;

#[async_trait]
impl Actor for EchoActor {
    async fn receive(
        &mut self,
        ctx: &mut ActorContext,
        envelope: Envelope,
    ) -> Result<(), ActorError> {
        if let Some(ping) = envelope.message.downcast_ref::<Ping>() {
            ctx.respond(Pong { seq: ping.seq });
        }
        Ok(())
    }
}

fn node_config() -> RemoteConfig {
    RemoteConfig::new()
        .with_listen_address("127.0.0.1:0")
        .with_message_type::<Ping>("test.ping")
        .with_message_type::<Pong>("test.pong")
}

async fn start_server_node() -> (ActorSystem, Remote) {
    let system = ActorSystem::new();
    let remote = Remote::start(&system, node_config()).await.expect("start");
    system
        .spawn_named(Props::from_producer(|| EchoActor), "echo")
        .expect("spawn echo");
    (system, remote)
}

async fn request_echo(system: &ActorSystem, target: &Pid, seq: u64) -> Result<u64, RequestErr> {
    let reply = system
        .request(target, Ping { seq }, Duration::from_secs(5))
        .await?;
    let pong = reply.downcast_ref::<Pong>().expect("pong reply").clone();
    Ok(pong.seq)
}

#[tokio::test]
pub async fn test_two_node_echo() {
    util::create_trace_logger();

    let (system_a, remote_a) = start_server_node().await;
    let (system_b, remote_b) = start_server_node().await;

    let echo_on_b = Pid::new(system_b.address(), "echo");
    let echo_on_a = Pid::new(system_a.address(), "echo");

    for seq in 0..200u64 {
        assert_eq!(request_echo(&system_a, &echo_on_b, seq).await, Ok(seq));
        assert_eq!(request_echo(&system_b, &echo_on_a, seq).await, Ok(seq));
    }

    remote_a.stop().await;
    remote_b.stop().await;
    system_a.shutdown().await;
    system_b.shutdown().await;
}

#[tokio::test]
pub async fn test_client_mode_peer_round_trip() {
    util::create_trace_logger();

    let (server_system, server_remote) = start_server_node().await;

    // No listener: the client system is addressed by its `$client/...`
    // identity and replies travel back over the connection it opened.
    let client_system = ActorSystem::new();
    let client_remote = Remote::start(
        &client_system,
        RemoteConfig::new()
            .with_message_type::<Ping>("test.ping")
            .with_message_type::<Pong>("test.pong"),
    )
    .await
    .expect("start client remote");

    assert!(client_system.address().starts_with("$client/"));

    let echo = Pid::new(server_system.address(), "echo");
    for seq in 0..50u64 {
        assert_eq!(request_echo(&client_system, &echo, seq).await, Ok(seq));
    }

    client_remote.stop().await;
    server_remote.stop().await;
    client_system.shutdown().await;
    server_system.shutdown().await;
}

#[tokio::test]
pub async fn test_activator_spawns_registered_kind() {
    util::create_trace_logger();

    let (system_a, remote_a) = start_server_node().await;

    let system_b = ActorSystem::new();
    let remote_b = Remote::start(
        &system_b,
        node_config().with_kind("echo", Props::from_producer(|| EchoActor)),
    )
    .await
    .expect("start");

    let activator = Pid::new(system_b.address(), ACTIVATOR_ID);
    let reply = system_a
        .request(
            &activator,
            ActivationRequest {
                kind: "echo".to_string(),
                id: Some("remote-echo".to_string()),
            },
            Duration::from_secs(5),
        )
        .await
        .expect("activation reply");

    let spawned = match reply.downcast_ref::<ActivationResponse>() {
        Some(ActivationResponse::Spawned(pid)) => pid.clone(),
        other => panic!("unexpected activation response: {:?}", other),
    };
    assert_eq!(&*spawned.id, "remote-echo");

    // The activated actor is live and reachable by the returned pid.
    assert_eq!(request_echo(&system_a, &spawned, 7).await, Ok(7));

    let unknown = system_a
        .request(
            &activator,
            ActivationRequest {
                kind: "missing".to_string(),
                id: None,
            },
            Duration::from_secs(5),
        )
        .await
        .expect("activation reply");
    assert!(matches!(
        unknown.downcast_ref::<ActivationResponse>(),
        Some(ActivationResponse::UnknownKind(_))
    ));

    remote_a.stop().await;
    remote_b.stop().await;
    system_a.shutdown().await;
    system_b.shutdown().await;
}
