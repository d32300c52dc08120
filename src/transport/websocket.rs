use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::Broker;
use crate::transport::message::{ClientMessage, ServerMessage};

/// Pause after a failed `accept` so a persistent error (e.g. EMFILE) does not spin.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind the ingest listener. Failing here is a startup error.
pub async fn bind(addr: &str) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!("Ingest server listening on ws://{}", listener.local_addr()?);
    Ok(listener)
}

/// Accept connections forever, one task per client.
pub async fn serve(listener: TcpListener, broker: Arc<Broker>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let broker = Arc::clone(&broker);
                tokio::spawn(handle_connection(stream, peer, broker));
            }
            Err(e) => {
                error!("Failed to accept connection: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, broker: Arc<Broker>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, "WebSocket handshake error: {e}");
            return;
        }
    };
    debug!(%peer, "Producer connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let response = match msg {
            WsMessage::Text(text) => handle_request(&broker, text.as_str()).await,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                error!(%peer, "Failed to serialize response: {e}");
                continue;
            }
        };
        if let Err(e) = ws_sender.send(WsMessage::text(json)).await {
            warn!(%peer, "Failed to send response: {e}");
            break;
        }
    }

    debug!(%peer, "Producer disconnected");
}

/// Apply one client request to the broker and build its response.
///
/// Publishing may wait for queue room, so it runs on the blocking pool.
pub async fn handle_request(broker: &Arc<Broker>, text: &str) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Publish { topic, payload }) => {
            let worker_broker = Arc::clone(broker);
            let worker_topic = topic.clone();
            match tokio::task::spawn_blocking(move || worker_broker.publish(&worker_topic, payload)).await {
                Ok(accepted) => ServerMessage::Published { topic, accepted },
                Err(e) => {
                    error!(topic = %topic, "Publish worker failed: {e}");
                    ServerMessage::Error {
                        message: "publish failed".to_string(),
                    }
                }
            }
        }
        Ok(ClientMessage::Stats) => ServerMessage::Stats {
            topics: broker.get_stats(),
        },
        Err(err) => {
            warn!("Invalid client message: {err}");
            ServerMessage::Error {
                message: format!("invalid request: {err}"),
            }
        }
    }
}
