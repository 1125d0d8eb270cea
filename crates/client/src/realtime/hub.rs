//! Typed event subscriptions
//!
//! The hub fans inbound [`ServerEvent`]s out to registered subscribers in the
//! order they were published. Subscriptions are explicit register/unregister
//! pairs; dropping a [`Subscription`] also unregisters it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::events::ServerEvent;

/// Which events a subscriber wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    All,
    /// Order lifecycle events (everything that becomes a notification)
    Orders,
    /// `ticketUpdated` / `ticketMessage`
    Tickets,
}

impl EventFilter {
    pub fn matches(&self, event: &ServerEvent) -> bool {
        match self {
            Self::All => true,
            Self::Orders => !event.is_ticket_event(),
            Self::Tickets => event.is_ticket_event(),
        }
    }
}

/// Identifier of a live registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    filter: EventFilter,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    registrations: Vec<Registration>,
}

/// Fan-out point for inbound events
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register interest in events matching `filter`
    pub fn register(&self, filter: EventFilter) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.registrations.push(Registration { id, filter, sender });

        tracing::debug!(
            subscription_id = id.0,
            filter = ?filter,
            subscribers = inner.registrations.len(),
            "Event subscription registered"
        );

        Subscription {
            id,
            hub: self.clone(),
            receiver,
        }
    }

    /// Remove a registration. Returns false if it was already gone.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.registrations.len();
        inner.registrations.retain(|r| r.id != id);
        let removed = inner.registrations.len() < before;
        if removed {
            tracing::debug!(subscription_id = id.0, "Event subscription unregistered");
        }
        removed
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Returns the number of subscribers that received it. Subscribers whose
    /// receiving side is gone are pruned.
    pub fn publish(&self, event: ServerEvent) -> usize {
        let mut inner = self.lock();
        let mut delivered = 0;
        inner.registrations.retain(|r| {
            if !r.filter.matches(&event) {
                return !r.sender.is_closed();
            }
            match r.sender.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });

        tracing::trace!(event = event.name(), recipients = delivered, "Published event");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().registrations.len()
    }
}

/// A live registration on the [`EventHub`]
pub struct Subscription {
    id: SubscriptionId,
    hub: EventHub,
    receiver: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, in publish order. `None` once unregistered.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn unregister(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::realtime::events::{OrderRef, TicketMessagePayload, WithdrawnPayload};
    use pharmadesk_shared::TicketId;

    fn order_event(number: &str) -> ServerEvent {
        ServerEvent::OrderNoLongerAvailable(WithdrawnPayload {
            message: String::new(),
            order: OrderRef {
                order_id: None,
                order_number: Some(number.to_string()),
            },
        })
    }

    fn ticket_event(id: &str) -> ServerEvent {
        ServerEvent::TicketMessage(TicketMessagePayload {
            ticket_id: TicketId::from(id),
        })
    }

    #[tokio::test]
    async fn test_publish_respects_filters_and_order() {
        let hub = EventHub::new();
        let mut all = hub.register(EventFilter::All);
        let mut orders = hub.register(EventFilter::Orders);
        let mut tickets = hub.register(EventFilter::Tickets);

        assert_eq!(hub.publish(order_event("A")), 2);
        assert_eq!(hub.publish(ticket_event("t-1")), 2);
        assert_eq!(hub.publish(order_event("B")), 2);

        assert_eq!(all.recv().await.unwrap(), order_event("A"));
        assert_eq!(all.recv().await.unwrap(), ticket_event("t-1"));
        assert_eq!(all.recv().await.unwrap(), order_event("B"));

        assert_eq!(orders.recv().await.unwrap(), order_event("A"));
        assert_eq!(orders.recv().await.unwrap(), order_event("B"));
        assert!(orders.try_recv().is_none());

        assert_eq!(tickets.recv().await.unwrap(), ticket_event("t-1"));
        assert!(tickets.try_recv().is_none());
    }

    #[test]
    fn test_unregister_and_drop_remove_registration() {
        let hub = EventHub::new();
        let first = hub.register(EventFilter::All);
        let second = hub.register(EventFilter::Tickets);
        assert_eq!(hub.subscriber_count(), 2);

        let id = first.id();
        first.unregister();
        assert_eq!(hub.subscriber_count(), 1);
        assert!(!hub.unregister(id));

        drop(second);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(order_event("A")), 0);
    }
}
