//! WebSocket transport
//!
//! Preferred transport. Each text message carries one JSON [`WireFrame`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::events::WireFrame;
use super::transport::{Link, LinkPeer, Transport, TransportKind};
use crate::error::TransportError;

/// Low-latency bidirectional transport over `ws://` / `wss://`
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

/// Rewrite the endpoint to a websocket scheme and attach the bearer token
pub(crate) fn websocket_url(endpoint: &Url, token: Option<&str>) -> Result<Url, TransportError> {
    let mut url = endpoint.clone();
    let scheme = match endpoint.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(TransportError::InvalidEndpoint(format!(
                "unsupported scheme {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::InvalidEndpoint(endpoint.to_string()))?;
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn open(&self, endpoint: &Url, token: Option<&str>) -> Result<Link, TransportError> {
        let url = websocket_url(endpoint, token)?;
        let (socket, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Handshake {
                    kind: TransportKind::WebSocket,
                    message: e.to_string(),
                })?;

        let (mut sink, mut stream) = socket.split();
        let (link, peer) = Link::pair(TransportKind::WebSocket);
        let LinkPeer {
            to_client,
            mut from_client,
        } = peer;
        let link_id = link.id;

        // Writer: ends when the client drops its side of the link
        tokio::spawn(async move {
            while let Some(frame) = from_client.recv().await {
                match frame.to_text() {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break; // Connection closed
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, event = %frame.event, "Failed to serialize frame");
                    }
                }
            }
            let _ = sink.close().await;
            tracing::debug!(link_id = %link_id, "WebSocket writer finished");
        });

        // Reader: dropping `to_client` tells the connection manager the link is gone
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => match WireFrame::from_text(&text) {
                        Ok(frame) => {
                            if to_client.send(frame).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                link_id = %link_id,
                                error = %e,
                                "Dropping malformed frame"
                            );
                        }
                    },
                    Ok(Message::Close(_)) => {
                        tracing::info!(link_id = %link_id, "WebSocket close frame received");
                        break;
                    }
                    Ok(_) => {} // Ping/pong handled by tungstenite, binary ignored
                    Err(e) => {
                        tracing::warn!(link_id = %link_id, error = %e, "WebSocket read failed");
                        break;
                    }
                }
            }
            tracing::debug!(link_id = %link_id, "WebSocket reader finished");
        });

        tracing::info!(link_id = %link_id, endpoint = %endpoint, "WebSocket link opened");
        Ok(link)
    }
}
