use crate::remote::endpoint::manager::EndpointManager;
use crate::remote::endpoint::EndpointTerminatedEvent;
use crate::remote::net::message::WireFrame;
use crate::remote::net::{Channel, FrameSource, TcpChannelProvider};

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Accept loop for inbound peer connections. One session task per
/// connection; honours the shutdown signal at the next accept.
pub(crate) async fn serve(
    listener: TcpListener,
    manager: EndpointManager,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    let manager = manager.clone();
                    tokio::spawn(session(stream, peer_addr, manager));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    trace!("listener stopped");
}

async fn session(stream: TcpStream, peer_addr: SocketAddr, manager: EndpointManager) {
    let runtime = manager.runtime().clone();
    let _ = stream.set_nodelay(true);

    let Channel { sink, mut source } =
        TcpChannelProvider::channel_from_stream(stream, runtime.config.max_frame_bytes);

    // The first frame must identify the peer.
    let hello = tokio::time::timeout(runtime.config.handshake_timeout, source.next()).await;
    let hello = match hello {
        Ok(Some(Ok(bytes))) => match WireFrame::read_from_bytes(&bytes) {
            Some(WireFrame::Hello(hello)) => hello,
            _ => {
                warn!(peer = %peer_addr, "connection did not identify itself, dropped");
                return;
            }
        },
        Ok(_) => {
            debug!(peer = %peer_addr, "connection closed before handshake");
            return;
        }
        Err(_) => {
            warn!(peer = %peer_addr, "handshake timed out, connection dropped");
            return;
        }
    };

    debug!(
        peer = %peer_addr,
        peer_system_id = %hello.system_id,
        peer_address = %hello.address,
        is_client = hello.is_client,
        "session established"
    );

    // A client-mode peer is only reachable over this connection: wire its
    // endpoint's transmit path to our write half. Server peers reply over
    // their own outbound endpoints, so the write half goes unused.
    let client_system_id = if hello.is_client {
        let endpoint = manager.get_or_add_client(&hello.system_id);
        if endpoint.is_blocked() {
            debug!(
                peer_system_id = %hello.system_id,
                "client system id is blocked, connection dropped"
            );
            return;
        }
        endpoint.attach_conduit(sink, &runtime);
        Some(hello.system_id)
    } else {
        None
    };

    let shutdown = runtime.system.shutdown_token();
    let mut malformed = 0usize;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = source.next() => match frame {
                Some(Ok(bytes)) => {
                    if let Err(e) = runtime.handler.handle_bytes(&bytes) {
                        malformed += 1;
                        warn!(
                            peer = %peer_addr,
                            error = %e,
                            count = malformed,
                            "malformed inbound frame dropped"
                        );
                        if malformed > runtime.config.malformed_frame_threshold {
                            warn!(peer = %peer_addr, "malformed frame threshold exceeded, closing session");
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    debug!(peer = %peer_addr, error = %e, "session stream error");
                    break;
                }
                None => break,
            }
        }
    }

    if let Some(system_id) = client_system_id {
        runtime
            .system
            .event_stream()
            .publish(EndpointTerminatedEvent {
                should_block: false,
                address: None,
                system_id: Some(system_id),
            });
    }

    trace!(peer = %peer_addr, "session closed");
}
