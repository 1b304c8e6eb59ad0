//! Connection handling logic for WebSocket clients.
//!
//! This module contains the per-connection task: WebSocket handshake,
//! inbound frame dispatch, outbound queue draining and cleanup.

use crate::{
    connection::OutboundMessage,
    error::ServerError,
    relay::RelayCoordinator,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
};
use tracing::{debug, trace, warn};

/// Handles a single client connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Perform WebSocket handshake
/// 2. Register the connection with the coordinator (state `Connected`)
/// 3. Run the incoming and outgoing halves until either one ends
/// 4. Tear the connection down, which parts its participant if it had one
///
/// # Arguments
///
/// * `stream` - The TCP stream for the client connection
/// * `addr` - The remote address of the client
/// * `coordinator` - Relay coordinator shared by all connections
///
/// # Returns
///
/// `Ok(())` once the connection has been cleaned up, or a `ServerError` if
/// the handshake failed.
///
/// # Message Handling
///
/// * **Incoming**: text frames go to [`RelayCoordinator::handle_message`];
///   rejected frames are logged there and otherwise ignored
/// * **Outgoing**: drains the connection's outbound queue, which the
///   coordinator and the liveness monitor fill
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    coordinator: Arc<RelayCoordinator>,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed: {e}")))?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let connection_id = coordinator.on_connect(addr, outbound_tx);

    let incoming_task = async {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    // Rejections are already logged by the coordinator.
                    if let Ok(dispatch) = coordinator.handle_message(connection_id, text.as_str()).await {
                        trace!("Connection {} -> {:?}", connection_id, dispatch);
                    }
                }
                Ok(Message::Binary(data)) => {
                    warn!(
                        "⚠️ Ignoring {} byte binary frame from connection {}",
                        data.len(),
                        connection_id
                    );
                }
                Ok(Message::Close(_)) => {
                    debug!("🔌 Client {} requested close", connection_id);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error for connection {}: {}", connection_id, e);
                    break;
                }
            }
        }
    };

    let outgoing_task = async {
        while let Some(message) = outbound_rx.recv().await {
            match message {
                OutboundMessage::Text(text) => {
                    if let Err(e) = ws_sender.send(Message::text(text)).await {
                        warn!("Failed to send to connection {}: {}", connection_id, e);
                        break;
                    }
                }
                OutboundMessage::Close(reason) => {
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: reason.into(),
                    };
                    if let Err(e) = ws_sender.send(Message::Close(Some(frame))).await {
                        debug!("Close frame to connection {} failed: {}", connection_id, e);
                    }
                    break;
                }
            }
        }
    };

    // Run both halves concurrently until one completes
    tokio::select! {
        _ = incoming_task => {},
        _ = outgoing_task => {},
    }

    coordinator.on_disconnect(connection_id).await;
    Ok(())
}
