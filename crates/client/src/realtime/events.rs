//! Realtime event types and serialization
//!
//! Defines the wire frame and the typed server-to-client events. Every server
//! event kind has its own payload shape; unknown kinds and payloads that do not
//! match their shape are rejected with a [`ProtocolError`].

use pharmadesk_shared::{OrderId, TicketId, TicketStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

// =============================================================================
// Wire Frame
// =============================================================================

/// Transport-agnostic frame: `{ "event": "<name>", "data": <json> }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl WireFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Event Data Structures
// =============================================================================

/// Order reference carried by every order event
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
}

impl OrderRef {
    /// Broad match: either the order id or the order number equals `key`
    pub fn matches_key(&self, key: &str) -> bool {
        self.order_id.as_ref().is_some_and(|id| id.as_str() == key)
            || self.order_number.as_deref() == Some(key)
    }
}

/// A person attached to an order (customer, pharmacist or delivery agent)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// `orderAccepted`, `orderAcceptedByPharmacist`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PharmacistPayload {
    pub message: String,
    #[serde(flatten)]
    pub order: OrderRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pharmacist: Option<Party>,
}

/// `orderRejected`, `orderCancelled`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonPayload {
    pub message: String,
    #[serde(flatten)]
    pub order: OrderRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `orderReadyForDelivery`, `orderDelivered`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPayload {
    pub message: String,
    #[serde(flatten)]
    pub order: OrderRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_boy: Option<Party>,
}

/// `orderStatusUpdated`, `orderStatusChanged`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub message: String,
    #[serde(flatten)]
    pub order: OrderRef,
    pub status: String,
}

/// `orderClaimed`, `orderAssigned`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentPayload {
    pub message: String,
    #[serde(flatten)]
    pub order: OrderRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_boy: Option<Party>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_info: Option<Party>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

/// `newOrder`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderPayload {
    pub message: String,
    #[serde(flatten)]
    pub order: OrderRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_info: Option<Party>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

/// `orderNoLongerAvailable`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawnPayload {
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub order: OrderRef,
}

/// `ticketUpdated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketUpdatedPayload {
    pub ticket_id: TicketId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
}

/// `ticketMessage`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketMessagePayload {
    pub ticket_id: TicketId,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    OrderAccepted(PharmacistPayload),
    OrderRejected(ReasonPayload),
    OrderAcceptedByPharmacist(PharmacistPayload),
    OrderReadyForDelivery(DeliveryPayload),
    OrderStatusUpdated(StatusPayload),
    OrderClaimed(AssignmentPayload),
    OrderNoLongerAvailable(WithdrawnPayload),
    NewOrder(NewOrderPayload),
    OrderAssigned(AssignmentPayload),
    OrderStatusChanged(StatusPayload),
    OrderCancelled(ReasonPayload),
    OrderDelivered(DeliveryPayload),
    TicketUpdated(TicketUpdatedPayload),
    TicketMessage(TicketMessagePayload),
}

fn payload<T: DeserializeOwned>(event: &str, data: &Value) -> Result<T, ProtocolError> {
    T::deserialize(data).map_err(|source| ProtocolError::MalformedPayload {
        event: event.to_string(),
        source,
    })
}

impl ServerEvent {
    /// Parse a typed event out of an inbound frame
    pub fn from_frame(frame: &WireFrame) -> Result<Self, ProtocolError> {
        let name = frame.event.as_str();
        let data = &frame.data;
        let event = match name {
            "orderAccepted" => Self::OrderAccepted(payload(name, data)?),
            "orderRejected" => Self::OrderRejected(payload(name, data)?),
            "orderAcceptedByPharmacist" => Self::OrderAcceptedByPharmacist(payload(name, data)?),
            "orderReadyForDelivery" => Self::OrderReadyForDelivery(payload(name, data)?),
            "orderStatusUpdated" => Self::OrderStatusUpdated(payload(name, data)?),
            "orderClaimed" => Self::OrderClaimed(payload(name, data)?),
            "orderNoLongerAvailable" => Self::OrderNoLongerAvailable(payload(name, data)?),
            "newOrder" => Self::NewOrder(payload(name, data)?),
            "orderAssigned" => Self::OrderAssigned(payload(name, data)?),
            "orderStatusChanged" => Self::OrderStatusChanged(payload(name, data)?),
            "orderCancelled" => Self::OrderCancelled(payload(name, data)?),
            "orderDelivered" => Self::OrderDelivered(payload(name, data)?),
            "ticketUpdated" => Self::TicketUpdated(payload(name, data)?),
            "ticketMessage" => Self::TicketMessage(payload(name, data)?),
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }

    /// Encode back into a wire frame (used by servers and test peers)
    pub fn to_frame(&self) -> Result<WireFrame, serde_json::Error> {
        let data = match self {
            Self::OrderAccepted(p) | Self::OrderAcceptedByPharmacist(p) => serde_json::to_value(p)?,
            Self::OrderRejected(p) | Self::OrderCancelled(p) => serde_json::to_value(p)?,
            Self::OrderReadyForDelivery(p) | Self::OrderDelivered(p) => serde_json::to_value(p)?,
            Self::OrderStatusUpdated(p) | Self::OrderStatusChanged(p) => serde_json::to_value(p)?,
            Self::OrderClaimed(p) | Self::OrderAssigned(p) => serde_json::to_value(p)?,
            Self::OrderNoLongerAvailable(p) => serde_json::to_value(p)?,
            Self::NewOrder(p) => serde_json::to_value(p)?,
            Self::TicketUpdated(p) => serde_json::to_value(p)?,
            Self::TicketMessage(p) => serde_json::to_value(p)?,
        };
        Ok(WireFrame::new(self.name(), data))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderAccepted(_) => "orderAccepted",
            Self::OrderRejected(_) => "orderRejected",
            Self::OrderAcceptedByPharmacist(_) => "orderAcceptedByPharmacist",
            Self::OrderReadyForDelivery(_) => "orderReadyForDelivery",
            Self::OrderStatusUpdated(_) => "orderStatusUpdated",
            Self::OrderClaimed(_) => "orderClaimed",
            Self::OrderNoLongerAvailable(_) => "orderNoLongerAvailable",
            Self::NewOrder(_) => "newOrder",
            Self::OrderAssigned(_) => "orderAssigned",
            Self::OrderStatusChanged(_) => "orderStatusChanged",
            Self::OrderCancelled(_) => "orderCancelled",
            Self::OrderDelivered(_) => "orderDelivered",
            Self::TicketUpdated(_) => "ticketUpdated",
            Self::TicketMessage(_) => "ticketMessage",
        }
    }

    pub fn is_ticket_event(&self) -> bool {
        matches!(self, Self::TicketUpdated(_) | Self::TicketMessage(_))
    }

    /// Order reference for order events; `None` for ticket events
    pub fn order_ref(&self) -> Option<&OrderRef> {
        match self {
            Self::OrderAccepted(p) | Self::OrderAcceptedByPharmacist(p) => Some(&p.order),
            Self::OrderRejected(p) | Self::OrderCancelled(p) => Some(&p.order),
            Self::OrderReadyForDelivery(p) | Self::OrderDelivered(p) => Some(&p.order),
            Self::OrderStatusUpdated(p) | Self::OrderStatusChanged(p) => Some(&p.order),
            Self::OrderClaimed(p) | Self::OrderAssigned(p) => Some(&p.order),
            Self::OrderNoLongerAvailable(p) => Some(&p.order),
            Self::NewOrder(p) => Some(&p.order),
            Self::TicketUpdated(_) | Self::TicketMessage(_) => None,
        }
    }

    /// Ticket the event refers to, for ticket events
    pub fn ticket_id(&self) -> Option<&TicketId> {
        match self {
            Self::TicketUpdated(p) => Some(&p.ticket_id),
            Self::TicketMessage(p) => Some(&p.ticket_id),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_order_deserialization() {
        let frame = WireFrame::from_text(
            r#"{"event":"newOrder","data":{"message":"New order received","orderId":"o-1","orderNumber":"A1B2C3","amount":42.5,"priority":"urgent","customerInfo":{"name":"Ada","phone":"555"}}}"#,
        )
        .unwrap();
        match ServerEvent::from_frame(&frame).unwrap() {
            ServerEvent::NewOrder(p) => {
                assert_eq!(p.order.order_id, Some(OrderId::from("o-1")));
                assert_eq!(p.order.order_number.as_deref(), Some("A1B2C3"));
                assert_eq!(p.amount, Some(42.5));
                assert_eq!(p.priority.as_deref(), Some("urgent"));
                assert_eq!(p.customer_info.unwrap().name.as_deref(), Some("Ada"));
            }
            other => panic!("Expected NewOrder event, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        let frame = WireFrame::new("orderTeleported", json!({"message": "?"}));
        assert!(matches!(
            ServerEvent::from_frame(&frame),
            Err(ProtocolError::UnknownEvent(name)) if name == "orderTeleported"
        ));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        // status is required for status events
        let frame = WireFrame::new("orderStatusChanged", json!({"message": "changed", "orderId": "o-1"}));
        assert!(matches!(
            ServerEvent::from_frame(&frame),
            Err(ProtocolError::MalformedPayload { event, .. }) if event == "orderStatusChanged"
        ));
    }

    #[test]
    fn test_withdrawn_event_message_optional() {
        let frame = WireFrame::new("orderNoLongerAvailable", json!({"orderNumber": "A1B2C3"}));
        let event = ServerEvent::from_frame(&frame).unwrap();
        assert!(event.order_ref().unwrap().matches_key("A1B2C3"));
        assert!(!event.is_ticket_event());
    }

    #[test]
    fn test_ticket_event_roundtrip_through_frame() {
        let event = ServerEvent::TicketUpdated(TicketUpdatedPayload {
            ticket_id: TicketId::from("t-9"),
            status: Some(TicketStatus::Closed),
        });
        let frame = event.to_frame().unwrap();
        assert_eq!(frame.event, "ticketUpdated");
        assert_eq!(frame.data, json!({"ticketId": "t-9", "status": "closed"}));
        assert_eq!(ServerEvent::from_frame(&frame).unwrap(), event);
        assert_eq!(event.ticket_id(), Some(&TicketId::from("t-9")));
    }

    #[test]
    fn test_order_ref_broad_match() {
        let order = OrderRef {
            order_id: Some(OrderId::from("o-1")),
            order_number: Some("A1B2C3".to_string()),
        };
        assert!(order.matches_key("o-1"));
        assert!(order.matches_key("A1B2C3"));
        assert!(!order.matches_key("o-2"));
        assert!(!OrderRef::default().matches_key(""));
    }
}
