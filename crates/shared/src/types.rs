//! Common types used across Pharmadesk

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Declares an opaque, string-backed identifier.
///
/// Identifiers are issued by the backend and never interpreted by the client.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identity of an authenticated actor (customer, pharmacist, delivery agent or admin)
    ParticipantId
);

string_id!(
    /// Order identifier as issued by the order service
    OrderId
);

string_id!(
    /// Support ticket identifier as issued by the ticket store
    TicketId
);

// =============================================================================
// Roles
// =============================================================================

/// Marketplace role carried in the session token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Pharmacist,
    #[serde(alias = "delivery_boy", alias = "deliveryBoy")]
    Delivery,
    #[serde(alias = "support")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Pharmacist => "pharmacist",
            Self::Delivery => "delivery",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "customer" => Ok(Self::Customer),
            "pharmacist" => Ok(Self::Pharmacist),
            "delivery" | "delivery_boy" | "deliveryboy" => Ok(Self::Delivery),
            "admin" | "support" => Ok(Self::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

// =============================================================================
// Support Tickets
// =============================================================================

/// Ticket lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Invalid ticket status: {}", s)),
        }
    }
}

/// Author of a ticket message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub id: ParticipantId,
    pub display_role: Role,
}

/// One entry of a ticket's append-only conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender: Sender,
    #[serde(default)]
    pub body: String,
    /// Blob store URLs, in upload order
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Message {
    /// A message needs a body, at least one attachment, or both
    pub fn has_content(&self) -> bool {
        !self.body.trim().is_empty() || !self.attachments.is_empty()
    }
}

/// Support conversation container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub participant_id: ParticipantId,
    /// Order context; `None` for general support
    #[serde(default, alias = "order")]
    pub order_id: Option<OrderId>,
    pub status: TicketStatus,
    /// Ordered by server-assigned position
    #[serde(default, alias = "messages")]
    pub conversation: Vec<Message>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Ticket {
    pub fn is_open(&self) -> bool {
        !self.status.is_closed()
    }

    pub fn is_general(&self) -> bool {
        self.order_id.is_none()
    }

    pub fn belongs_to(&self, participant: &ParticipantId) -> bool {
        &self.participant_id == participant
    }

    /// True when this ticket can take further messages for `order_id`
    pub fn is_reusable_for(&self, participant: &ParticipantId, order_id: &OrderId) -> bool {
        self.belongs_to(participant) && self.order_id.as_ref() == Some(order_id) && self.is_open()
    }}
