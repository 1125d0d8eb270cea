//! Transport abstraction
//!
//! A transport turns an endpoint into a [`Link`]: a pair of frame channels.
//! The inbound channel closing is how a link reports that it dropped.

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

use super::events::WireFrame;
use crate::error::TransportError;

/// Available transports, in the order they are normally preferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Low-latency bidirectional socket
    WebSocket,
    /// HTTP long polling fallback
    Polling,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WebSocket => write!(f, "websocket"),
            Self::Polling => write!(f, "polling"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "websocket" | "ws" => Ok(Self::WebSocket),
            "polling" | "long-polling" => Ok(Self::Polling),
            _ => Err(format!("Invalid transport: {}", s)),
        }
    }
}

/// An open bidirectional link to the realtime server
#[derive(Debug)]
pub struct Link {
    /// Unique id for this link, used in logs
    pub id: Uuid,
    pub kind: TransportKind,
    pub outbound: mpsc::UnboundedSender<WireFrame>,
    pub inbound: mpsc::UnboundedReceiver<WireFrame>,
}

/// The far side of a [`Link`], held by the transport's I/O tasks
#[derive(Debug)]
pub struct LinkPeer {
    /// Frames delivered to the client
    pub to_client: mpsc::UnboundedSender<WireFrame>,
    /// Frames the client emitted
    pub from_client: mpsc::UnboundedReceiver<WireFrame>,
}

impl Link {
    /// Create a connected link/peer pair
    pub fn pair(kind: TransportKind) -> (Link, LinkPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let link = Link {
            id: Uuid::new_v4(),
            kind,
            outbound: out_tx,
            inbound: in_rx,
        };
        let peer = LinkPeer {
            to_client: in_tx,
            from_client: out_rx,
        };
        (link, peer)
    }
}

/// Opens links to the realtime endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Perform the handshake and return a live link.
    ///
    /// Callers bound this with the handshake timeout; implementations do not
    /// need their own.
    async fn open(&self, endpoint: &Url, token: Option<&str>) -> Result<Link, TransportError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_kind_parsing() {
        assert_eq!("websocket".parse::<TransportKind>().unwrap(), TransportKind::WebSocket);
        assert_eq!(" Polling ".parse::<TransportKind>().unwrap(), TransportKind::Polling);
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[tokio::test]
    async fn test_link_pair_carries_frames_both_ways() {
        let (mut link, mut peer) = Link::pair(TransportKind::Polling);

        link.outbound
            .send(WireFrame::new("join-admin", json!(null)))
            .unwrap();
        assert_eq!(peer.from_client.recv().await.unwrap().event, "join-admin");

        peer.to_client
            .send(WireFrame::new("newOrder", json!({})))
            .unwrap();
        assert_eq!(link.inbound.recv().await.unwrap().event, "newOrder");

        // Dropping the peer is observed as a closed inbound channel
        drop(peer);
        assert!(link.inbound.recv().await.is_none());
    }
}
