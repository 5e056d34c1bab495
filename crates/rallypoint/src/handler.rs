//! Per-connection handler: decode, route, write back.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The task multiplexes three things:
//!   1. Frames from the client → decoded and handed to the relay
//!   2. Events the relay pushed for this connection → encoded and written
//!   3. The idle timer → the connection is dropped if the client goes quiet

use std::sync::Arc;
use std::time::{Duration, Instant};

use rallypoint_protocol::{ClientEvent, Codec, Envelope, JsonCodec};
use rallypoint_session::{Authorizer, ConnectionHandle, Outbound};
use rallypoint_transport::{Connection, WebSocketConnection};

use crate::relay::millis;
use crate::{Peer, RallyError, Relay};

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A: Authorizer>(
    conn: WebSocketConnection,
    relay: Arc<Relay<A>>,
    codec: JsonCodec,
    idle_timeout: Duration,
) -> Result<(), RallyError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = %conn.peer_addr(), "handling new connection");

    let (handle, mut outbound) = ConnectionHandle::channel(conn_id);
    let mut peer = Peer::new(handle);
    let mut seq: u64 = 0;
    let start = Instant::now();

    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    let result = loop {
        tokio::select! {
            incoming = conn.recv() => {
                let data = match incoming {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%conn_id, "connection closed cleanly");
                        break Ok(());
                    }
                    Err(e) => break Err(RallyError::from(e)),
                };
                idle.as_mut().reset(tokio::time::Instant::now() + idle_timeout);

                let envelope: Envelope<ClientEvent> = match codec.decode(&data) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "failed to decode envelope");
                        continue;
                    }
                };
                relay.handle_event(&mut peer, envelope.payload).await;
            }

            Some(out) = outbound.recv() => match out {
                Outbound::Event(event) => {
                    peer.observe(&event);
                    let frame = Envelope::new(next_seq(&mut seq), millis(start.elapsed()), event);
                    let bytes = match codec.encode(&frame) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::error!(%conn_id, error = %e, "failed to encode event");
                            continue;
                        }
                    };
                    if let Err(e) = conn.send(&bytes).await {
                        break Err(RallyError::from(e));
                    }
                }
                Outbound::Close { reason } => {
                    tracing::info!(%conn_id, %reason, "closing connection");
                    let _ = conn.close().await;
                    break Ok(());
                }
            },

            () = &mut idle => {
                tracing::info!(%conn_id, "connection idle, dropping");
                let _ = conn.close().await;
                break Ok(());
            }
        }
    };

    relay.disconnect(&mut peer).await;
    result
}

fn next_seq(seq: &mut u64) -> u64 {
    *seq += 1;
    *seq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_seq_starts_at_one_and_increments() {
        let mut seq = 0;
        assert_eq!(next_seq(&mut seq), 1);
        assert_eq!(next_seq(&mut seq), 2);
    }
}
