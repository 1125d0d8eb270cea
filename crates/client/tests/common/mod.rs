//! Shared fixtures for the client integration tests

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pharmadesk_client::notifications::{AlertSink, AlertTone};
use pharmadesk_client::realtime::{Link, LinkPeer, Transport, TransportKind};
use pharmadesk_client::support::{MessageDraft, TicketApi};
use pharmadesk_client::{Config, TicketError, TicketResult, TransportError};
use pharmadesk_shared::{
    Message, OrderId, ParticipantId, Role, Sender, Ticket, TicketId, TicketStatus,
};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use url::Url;

// ============================================================================
// Configuration
// ============================================================================

pub fn test_config() -> Config {
    Config {
        realtime_url: Url::parse("ws://127.0.0.1:1/realtime").unwrap(),
        api_base_url: Url::parse("http://127.0.0.1:1/api/").unwrap(),
        access_token: Some("test-token".to_string()),
        reconnect_delay_ms: 10,
        reconnect_attempts: 5,
        handshake_timeout_ms: 500,
        transports: vec![TransportKind::WebSocket],
        http_timeout_ms: 1000,
    }
}

// ============================================================================
// Channel Transport
// ============================================================================

/// Transport whose links are in-process channel pairs.
///
/// Every successful open hands the server side of the link to the test.
pub struct ChannelTransport {
    peers: mpsc::UnboundedSender<LinkPeer>,
}

impl ChannelTransport {
    pub fn pair() -> (Arc<dyn Transport>, mpsc::UnboundedReceiver<LinkPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        (Arc::new(Self { peers }), peer_rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn open(&self, _endpoint: &Url, _token: Option<&str>) -> Result<Link, TransportError> {
        let (link, peer) = Link::pair(TransportKind::WebSocket);
        self.peers.send(peer).map_err(|_| TransportError::Handshake {
            kind: TransportKind::WebSocket,
            message: "server gone".to_string(),
        })?;
        Ok(link)
    }
}

/// Run `f` under a timeout so a broken flow fails instead of hanging
pub async fn within<F: std::future::Future>(f: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("timed out")
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Default)]
pub struct RecordingAlerts {
    tones: Mutex<Vec<AlertTone>>,
}

impl RecordingAlerts {
    pub fn tones(&self) -> Vec<AlertTone> {
        self.tones.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn play(&self, tone: AlertTone) {
        self.tones.lock().unwrap().push(tone);
    }
}

// ============================================================================
// In-Memory Ticket Store
// ============================================================================

/// Ticket store that behaves like the REST API for a single caller
pub struct InMemoryTickets {
    caller: ParticipantId,
    role: Role,
    tickets: Mutex<Vec<Ticket>>,
    next_id: AtomicU32,
}

impl InMemoryTickets {
    pub fn new(caller: &str, role: Role) -> Self {
        Self {
            caller: ParticipantId::from(caller),
            role,
            tickets: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn all(&self) -> Vec<Ticket> {
        self.tickets.lock().unwrap().clone()
    }

    /// Close a ticket as another actor would, without going through the client
    pub fn close_elsewhere(&self, id: &TicketId) {
        let mut tickets = self.tickets.lock().unwrap();
        if let Some(ticket) = tickets.iter_mut().find(|t| &t.id == id) {
            ticket.status = TicketStatus::Closed;
        }
    }

    fn message(&self, draft: &MessageDraft) -> Message {
        Message {
            sender: Sender {
                id: self.caller.clone(),
                display_role: self.role,
            },
            body: draft.body().to_string(),
            attachments: draft
                .attachments()
                .iter()
                .map(|a| format!("https://files.pharmadesk.test/{}", a.file_name))
                .collect(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[async_trait]
impl TicketApi for InMemoryTickets {
    async fn list_tickets(&self) -> TicketResult<Vec<Ticket>> {
        Ok(self.all())
    }

    async fn get_ticket(&self, id: &TicketId) -> TicketResult<Ticket> {
        self.all()
            .into_iter()
            .find(|t| &t.id == id)
            .ok_or(TicketError::NotFound)
    }

    async fn create_ticket(
        &self,
        draft: &MessageDraft,
        order_id: Option<&OrderId>,
    ) -> TicketResult<Ticket> {
        let id = TicketId::new(format!(
            "ticket-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        let ticket = Ticket {
            id,
            participant_id: self.caller.clone(),
            order_id: order_id.cloned(),
            status: TicketStatus::Open,
            conversation: vec![self.message(draft)],
            updated_at: OffsetDateTime::now_utc(),
        };
        self.tickets.lock().unwrap().push(ticket.clone());
        Ok(ticket)
    }

    async fn reply(&self, id: &TicketId, draft: &MessageDraft) -> TicketResult<Ticket> {
        let message = self.message(draft);
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or(TicketError::NotFound)?;
        if ticket.status.is_closed() {
            return Err(TicketError::TicketClosed);
        }
        ticket.conversation.push(message);
        ticket.updated_at = OffsetDateTime::now_utc();
        Ok(ticket.clone())
    }

    async fn close(&self, id: &TicketId) -> TicketResult<Ticket> {
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or(TicketError::NotFound)?;
        ticket.status = TicketStatus::Closed;
        ticket.updated_at = OffsetDateTime::now_utc();
        Ok(ticket.clone())
    }
}
