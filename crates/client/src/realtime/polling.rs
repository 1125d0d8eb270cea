//! HTTP long-polling transport
//!
//! Fallback used when the websocket handshake fails:
//! - `POST {endpoint}/poll` opens a session and returns `{ "sid": "..." }`
//! - `GET {endpoint}/poll?sid=...` returns a JSON array of pending frames
//! - `POST {endpoint}/poll?sid=...` delivers one client frame
//!
//! Any failed poll drops the link; reconnection is the connection manager's job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Notify;
use url::Url;

use super::events::WireFrame;
use super::transport::{Link, LinkPeer, Transport, TransportKind};
use crate::error::TransportError;

/// Default upper bound for a single long-poll request
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Deserialize)]
struct PollHandshake {
    sid: String,
}

/// Long-polling transport over plain HTTP
#[derive(Debug, Clone)]
pub struct PollingTransport {
    http_client: Client,
}

impl PollingTransport {
    /// Create a polling transport with the default long-poll timeout
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_POLL_TIMEOUT)
    }

    pub fn with_timeout(poll_timeout: Duration) -> Result<Self, TransportError> {
        let http_client = Client::builder()
            .timeout(poll_timeout)
            .build()
            .map_err(|e| TransportError::Handshake {
                kind: TransportKind::Polling,
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { http_client })
    }

    pub fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }
}

/// Rewrite the endpoint to an HTTP scheme and append the `poll` segment
pub(crate) fn poll_url(endpoint: &Url) -> Result<Url, TransportError> {
    let mut url = endpoint.clone();
    let scheme = match endpoint.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(TransportError::InvalidEndpoint(format!(
                "unsupported scheme {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::InvalidEndpoint(endpoint.to_string()))?;
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|_| TransportError::InvalidEndpoint(endpoint.to_string()))?
        .pop_if_empty()
        .push("poll");
    Ok(url)
}

fn handshake_error(message: impl std::fmt::Display) -> TransportError {
    TransportError::Handshake {
        kind: TransportKind::Polling,
        message: message.to_string(),
    }
}

#[async_trait]
impl Transport for PollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    async fn open(&self, endpoint: &Url, token: Option<&str>) -> Result<Link, TransportError> {
        let url = poll_url(endpoint)?;

        let mut request = self.http_client.post(url.clone());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(handshake_error)?;
        if !response.status().is_success() {
            return Err(handshake_error(format!(
                "server returned {}",
                response.status()
            )));
        }
        let handshake: PollHandshake = response.json().await.map_err(handshake_error)?;

        let (link, peer) = Link::pair(TransportKind::Polling);
        let LinkPeer {
            to_client,
            mut from_client,
        } = peer;
        let link_id = link.id;
        let sid = handshake.sid;
        let token = token.map(str::to_string);
        let dropped = Arc::new(Notify::new());

        // Sender: one POST per client frame
        {
            let http_client = self.http_client.clone();
            let url = url.clone();
            let sid = sid.clone();
            let token = token.clone();
            let dropped = Arc::clone(&dropped);
            tokio::spawn(async move {
                while let Some(frame) = from_client.recv().await {
                    let mut request = http_client
                        .post(url.clone())
                        .query(&[("sid", sid.as_str())])
                        .json(&frame);
                    if let Some(token) = &token {
                        request = request.bearer_auth(token);
                    }
                    let failed = match request.send().await {
                        Ok(response) => !response.status().is_success(),
                        Err(e) => {
                            tracing::warn!(link_id = %link_id, error = %e, "Poll send failed");
                            true
                        }
                    };
                    if failed {
                        dropped.notify_one();
                        break;
                    }
                }
                tracing::debug!(link_id = %link_id, "Polling sender finished");
            });
        }

        // Receiver: long-poll until a request fails or the client goes away
        {
            let http_client = self.http_client.clone();
            tokio::spawn(async move {
                loop {
                    let mut request = http_client
                        .get(url.clone())
                        .query(&[("sid", sid.as_str())]);
                    if let Some(token) = &token {
                        request = request.bearer_auth(token);
                    }

                    let frames = tokio::select! {
                        _ = to_client.closed() => break,
                        _ = dropped.notified() => break,
                        result = request.send() => match result {
                            Ok(response) if response.status().is_success() => {
                                match response.json::<Vec<WireFrame>>().await {
                                    Ok(frames) => frames,
                                    Err(e) => {
                                        tracing::warn!(link_id = %link_id, error = %e, "Malformed poll response");
                                        break;
                                    }
                                }
                            }
                            Ok(response) => {
                                tracing::warn!(link_id = %link_id, status = %response.status(), "Poll rejected");
                                break;
                            }
                            Err(e) => {
                                tracing::warn!(link_id = %link_id, error = %e, "Poll failed");
                                break;
                            }
                        },
                    };

                    for frame in frames {
                        if to_client.send(frame).is_err() {
                            return;
                        }
                    }
                }
                tracing::debug!(link_id = %link_id, "Polling receiver finished");
            });
        }

        tracing::info!(link_id = %link_id, endpoint = %endpoint, "Polling link opened");
        Ok(link)
    }
}
