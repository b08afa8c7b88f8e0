//! WebSocket upgrade handler and per-connection workers
//!
//! Each accepted socket is split in two halves, each driven by its own worker:
//!
//! 1. The read worker (this task) re-arms the idle deadline on every inbound
//!    frame, pongs included, and hands text frames to the manager.
//! 2. The write worker (spawned) drains the connection's send queue and keeps
//!    the peer alive with a ping on every keepalive tick.
//!
//! Whichever worker stops first ends the connection; teardown runs once,
//! after the read worker returns.

use super::manager::ConnectionManager;
use crate::config::TransportConfig;
use crate::core::connection::Connection;
use crate::core::error::{HubError, HubResult};
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, timeout};

/// WebSocket upgrade handler
///
/// Applies the configured inbound size limit before upgrading; a larger
/// frame fails the read and tears the connection down.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(manager): State<Arc<ConnectionManager>>,
) -> impl IntoResponse {
    let max_message_size = manager.transport().max_message_size;
    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, manager))
}

/// Why the read worker stopped
#[derive(Debug)]
enum ReadExit {
    PeerClosed,
    IdleTimeout,
    Transport(HubError),
    Protocol(HubError),
    WriterStopped,
}

async fn handle_socket(socket: WebSocket, manager: Arc<ConnectionManager>) {
    let conn = manager.connect().await;
    let transport = manager.transport().clone();

    let (ws_write, ws_read) = socket.split();
    let mut writer = tokio::spawn(write_worker(ws_write, conn.clone(), transport.clone()));

    let exit = read_worker(ws_read, &manager, &conn, &transport, &mut writer).await;
    match &exit {
        ReadExit::Protocol(e) => {
            tracing::warn!(connection_id = %conn.id(), error = %e, "Closing connection on malformed message");
        }
        ReadExit::Transport(e) => {
            tracing::debug!(connection_id = %conn.id(), error = %e, "WebSocket read error");
        }
        other => {
            tracing::debug!(connection_id = %conn.id(), reason = ?other, "Read worker stopped");
        }
    }

    // Closes the queue, so the writer drains, sends a close frame and exits
    manager.disconnect(&conn).await;

    if !matches!(exit, ReadExit::WriterStopped)
        && timeout(transport.write_timeout(), &mut writer).await.is_err()
    {
        writer.abort();
    }
}

async fn read_worker(
    mut ws_read: SplitStream<WebSocket>,
    manager: &ConnectionManager,
    conn: &Arc<Connection>,
    transport: &TransportConfig,
    writer: &mut JoinHandle<()>,
) -> ReadExit {
    let read_timeout = transport.read_timeout();

    loop {
        let next = tokio::select! {
            next = timeout(read_timeout, ws_read.next()) => next,
            _ = &mut *writer => return ReadExit::WriterStopped,
        };

        match next {
            Err(_) => return ReadExit::IdleTimeout,
            Ok(None) => return ReadExit::PeerClosed,
            Ok(Some(Err(e))) => return ReadExit::Transport(e.into()),
            Ok(Some(Ok(Message::Text(text)))) => {
                if let Err(e) = manager.dispatch(conn, text.as_str()).await {
                    return ReadExit::Protocol(e);
                }
            }
            Ok(Some(Ok(Message::Close(_)))) => return ReadExit::PeerClosed,
            Ok(Some(Ok(_))) => {
                // Pings are answered by axum; pongs only re-arm the deadline
            }
        }
    }
}

async fn write_worker(
    mut ws_write: SplitSink<WebSocket, Message>,
    conn: Arc<Connection>,
    transport: TransportConfig,
) {
    let write_timeout = transport.write_timeout();
    let mut keepalive = tokio::time::interval(transport.ping_interval());
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
    keepalive.tick().await;

    loop {
        tokio::select! {
            batch = conn.queue().next_batch() => {
                let Some(frames) = batch else {
                    let _ = write_with_deadline(&mut ws_write, vec![Message::Close(None)], write_timeout).await;
                    break;
                };

                let messages = frames.into_iter().map(|f| Message::Text(f.into())).collect();
                if let Err(e) = write_with_deadline(&mut ws_write, messages, write_timeout).await {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "WebSocket write failed, closing");
                    break;
                }
            }
            _ = keepalive.tick() => {
                // Outbound frames never re-arm the read deadline, pongs do
                let ping = vec![Message::Ping(Bytes::new())];
                if let Err(e) = write_with_deadline(&mut ws_write, ping, write_timeout).await {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "WebSocket ping failed, closing");
                    break;
                }
            }
        }
    }

    // Producers see a closed queue from now on
    conn.close();
}

/// Write a batch of messages with a single flush, bounded by the deadline
async fn write_with_deadline(
    ws_write: &mut SplitSink<WebSocket, Message>,
    messages: Vec<Message>,
    deadline: Duration,
) -> HubResult<()> {
    let write = async {
        for message in messages {
            ws_write.feed(message).await?;
        }
        ws_write.flush().await
    };

    match timeout(deadline, write).await {
        Ok(result) => result.map_err(HubError::from),
        Err(_) => Err(HubError::Transport("write deadline exceeded".to_string())),
    }
}
