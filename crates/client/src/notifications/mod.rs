//! Order notifications
//!
//! Turns inbound order events into short-lived [`Notification`] records:
//! - One notification kind per order event
//! - Bounded retention (most recent five)
//! - Targeted removal when an order is withdrawn
//! - Role-specific alert tones

use pharmadesk_shared::OrderId;
use serde::Serialize;
use time::OffsetDateTime;

use crate::realtime::Party;

mod alert;
mod dispatcher;
mod store;

pub use alert::{AlertSink, AlertTone, LogAlertSink};
pub use dispatcher::{DispatchOutcome, DispatcherHandle, EventDispatcher, NotificationCommand};
pub use store::{NotificationStore, NOTIFICATION_CAPACITY};

/// Client-generated, strictly increasing notification id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NotificationId(pub u64);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Notification classification, one per order event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    OrderAccepted,
    OrderRejected,
    OrderAcceptedByPharmacist,
    OrderReadyForDelivery,
    OrderStatusUpdated,
    OrderClaimed,
    OrderNoLongerAvailable,
    NewOrder,
    OrderAssigned,
    OrderStatusChanged,
    OrderCancelled,
    OrderDelivered,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderAccepted => "orderAccepted",
            Self::OrderRejected => "orderRejected",
            Self::OrderAcceptedByPharmacist => "orderAcceptedByPharmacist",
            Self::OrderReadyForDelivery => "orderReadyForDelivery",
            Self::OrderStatusUpdated => "orderStatusUpdated",
            Self::OrderClaimed => "orderClaimed",
            Self::OrderNoLongerAvailable => "orderNoLongerAvailable",
            Self::NewOrder => "newOrder",
            Self::OrderAssigned => "orderAssigned",
            Self::OrderStatusChanged => "orderStatusChanged",
            Self::OrderCancelled => "orderCancelled",
            Self::OrderDelivered => "orderDelivered",
        }
    }

    /// Fixed display title
    pub fn title(&self) -> &'static str {
        match self {
            Self::OrderAccepted => "Order Accepted",
            Self::OrderRejected => "Order Rejected",
            Self::OrderAcceptedByPharmacist => "Accepted by Pharmacist",
            Self::OrderReadyForDelivery => "Ready for Delivery",
            Self::OrderStatusUpdated => "Order Status Updated",
            Self::OrderClaimed => "Order Claimed",
            Self::OrderNoLongerAvailable => "Order No Longer Available",
            Self::NewOrder => "New Order",
            Self::OrderAssigned => "Order Assigned",
            Self::OrderStatusChanged => "Order Status Changed",
            Self::OrderCancelled => "Order Cancelled",
            Self::OrderDelivered => "Order Delivered",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific fields, all optional
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pharmacist: Option<Party>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_boy: Option<Party>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_info: Option<Party>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Immutable record derived from one server event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(flatten)]
    pub details: NotificationDetails,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Notification {
    /// Broad match on order id or order number
    pub fn matches_order_key(&self, key: &str) -> bool {
        self.order_id.as_ref().is_some_and(|id| id.as_str() == key)
            || self.order_number.as_deref() == Some(key)
    }

    /// Same content as `other`, ignoring id and creation time
    pub fn is_equivalent(&self, other: &Notification) -> bool {
        self.kind == other.kind
            && self.order_id == other.order_id
            && self.order_number == other.order_number
            && self.message == other.message
            && self.details.status == other.details.status
    }
}
