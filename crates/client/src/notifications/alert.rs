//! Alert tones
//!
//! The tone depends only on who is signed in, never on the event payload.

use pharmadesk_shared::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTone {
    /// Customers and admins
    Default,
    Pharmacist,
    Delivery,
}

impl AlertTone {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Pharmacist => Self::Pharmacist,
            Role::Delivery => Self::Delivery,
            Role::Customer | Role::Admin => Self::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Pharmacist => "pharmacist",
            Self::Delivery => "delivery",
        }
    }
}

/// Plays alert tones. Implementations must not block.
pub trait AlertSink: Send + Sync {
    fn play(&self, tone: AlertTone);
}

/// Records tones in the log; used when the host has no audio output
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn play(&self, tone: AlertTone) {
        tracing::info!(tone = tone.as_str(), "Alert tone");
    }
}
