//! Client error types
//!
//! Every failure in this crate is advisory to the hosting application: none of
//! these errors should end the user's session.

use crate::realtime::transport::TransportKind;

/// Transport-level failures while opening or using a link
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("{kind} handshake failed: {message}")]
    Handshake { kind: TransportKind, message: String },

    #[error("{kind} handshake timed out")]
    HandshakeTimeout { kind: TransportKind },

    #[error("No transport configured")]
    NoTransport,

    #[error("Link closed")]
    Closed,
}

/// Failures of the realtime connection surface
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("Not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Inbound frames that cannot be turned into a typed event
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Malformed payload for {event}: {source}")]
    MalformedPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
}

/// Room addressing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Invalid room type: {0}")]
    InvalidRoomType(String),

    #[error("Room {0} requires an identity key")]
    MissingKey(String),
}

/// Support ticket failures surfaced to callers
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("Ticket is closed")]
    TicketClosed,

    #[error("Ticket not found")]
    NotFound,

    #[error("A message for this conversation is already being sent")]
    SendInFlight,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Ticket service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response from ticket service: {0}")]
    InvalidResponse(String),
}

impl TicketError {
    /// Ticket-state failures; the UI disables replies or reports a missing ticket
    pub fn is_ticket_state(&self) -> bool {
        matches!(self, TicketError::TicketClosed | TicketError::NotFound)
    }

    /// Generic send failures: the user may retry with the same draft
    pub fn is_retryable_send_failure(&self) -> bool {
        match self {
            TicketError::Http(_) => true,
            TicketError::Api { status, .. } => *status >= 500,
            TicketError::InvalidResponse(_) => true,

            TicketError::TicketClosed => false,
            TicketError::NotFound => false,
            TicketError::SendInFlight => false,
            TicketError::Unauthorized => false,
        }
    }
}

/// Result type alias for ticket operations
pub type TicketResult<T> = Result<T, TicketError>;
