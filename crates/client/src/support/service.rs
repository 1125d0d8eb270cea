//! Ticket operations
//!
//! [`TicketService`] is the authoritative path for ticket state. It selects
//! the ticket a participant should continue, creates tickets lazily on the
//! first message and guards against duplicate first sends for the same
//! participant and order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use pharmadesk_shared::{Message, OrderId, ParticipantId, Ticket, TicketId};

use super::api::{MessageDraft, TicketApi};
use crate::error::{TicketError, TicketResult};

type SendKey = (ParticipantId, Option<OrderId>);

/// The ticket a conversation view should show, if any yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketContext {
    pub participant: ParticipantId,
    pub order_id: Option<OrderId>,
    /// `None` until the first message creates one
    pub ticket: Option<Ticket>,
}

impl TicketContext {
    pub fn messages(&self) -> &[Message] {
        self.ticket
            .as_ref()
            .map(|t| t.conversation.as_slice())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.ticket.is_none()
    }
}

/// Pick the ticket to continue from `tickets`, which are in server order.
///
/// With an order: the first open ticket of this participant for that order.
/// Without: the participant's most recently updated ticket of any status,
/// earliest in server order on ties.
pub fn select_ticket<'a>(
    tickets: &'a [Ticket],
    participant: &ParticipantId,
    order_id: Option<&OrderId>,
) -> Option<&'a Ticket> {
    match order_id {
        Some(order_id) => tickets
            .iter()
            .find(|t| t.is_reusable_for(participant, order_id)),
        None => tickets
            .iter()
            .filter(|t| t.belongs_to(participant))
            .fold(None, |best: Option<&Ticket>, t| match best {
                Some(b) if b.updated_at >= t.updated_at => Some(b),
                _ => Some(t),
            }),
    }
}

pub struct TicketService {
    api: Arc<dyn TicketApi>,
    in_flight: Mutex<HashSet<SendKey>>,
}

/// Releases the in-flight slot when the send finishes or is cancelled
struct InFlightGuard<'a> {
    service: &'a TicketService,
    key: SendKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.service
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl TicketService {
    pub fn new(api: Arc<dyn TicketApi>) -> Self {
        Self {
            api,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn api(&self) -> &Arc<dyn TicketApi> {
        &self.api
    }

    fn begin_send(&self, key: SendKey) -> TicketResult<InFlightGuard<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            return Err(TicketError::SendInFlight);
        }
        Ok(InFlightGuard { service: self, key })
    }

    /// Load the ticket `participant` should continue, or an empty context
    pub async fn fetch_or_create_context(
        &self,
        participant: &ParticipantId,
        order_id: Option<&OrderId>,
    ) -> TicketResult<TicketContext> {
        let tickets = self.api.list_tickets().await?;
        let ticket = select_ticket(&tickets, participant, order_id).cloned();

        tracing::debug!(
            participant = %participant,
            order_id = ?order_id,
            ticket_id = ?ticket.as_ref().map(|t| &t.id),
            "Resolved ticket context"
        );

        Ok(TicketContext {
            participant: participant.clone(),
            order_id: order_id.cloned(),
            ticket,
        })
    }

    /// Send the first message of a conversation.
    ///
    /// Reuses the participant's open ticket for `order_id` when there is one,
    /// otherwise creates a ticket. Ticket and message are one request, so
    /// either both exist afterwards or neither does.
    pub async fn send_first_message(
        &self,
        participant: &ParticipantId,
        draft: &MessageDraft,
        order_id: Option<&OrderId>,
    ) -> TicketResult<Ticket> {
        let _guard = self.begin_send((participant.clone(), order_id.cloned()))?;

        if let Some(order_id) = order_id {
            let tickets = self.api.list_tickets().await?;
            if let Some(existing) = select_ticket(&tickets, participant, Some(order_id)) {
                tracing::info!(
                    ticket_id = %existing.id,
                    order_id = %order_id,
                    "Reusing open ticket for order"
                );
                match self.api.reply(&existing.id, draft).await {
                    Err(TicketError::TicketClosed) => {
                        tracing::info!(ticket_id = %existing.id, "Ticket closed meanwhile, creating a new one");
                    }
                    result => return result,
                }
            }
        }

        self.api.create_ticket(draft, order_id).await
    }

    /// Append a message to an open ticket
    pub async fn reply(&self, ticket_id: &TicketId, draft: &MessageDraft) -> TicketResult<Ticket> {
        let ticket = self.api.get_ticket(ticket_id).await?;
        if ticket.status.is_closed() {
            tracing::debug!(ticket_id = %ticket_id, "Reply rejected, ticket closed");
            return Err(TicketError::TicketClosed);
        }
        self.api.reply(ticket_id, draft).await
    }

    /// Close a ticket. Closing a closed ticket returns it unchanged.
    pub async fn close(&self, ticket_id: &TicketId) -> TicketResult<Ticket> {
        let ticket = self.api.get_ticket(ticket_id).await?;
        if ticket.status.is_closed() {
            return Ok(ticket);
        }
        self.api.close(ticket_id).await
    }

    pub async fn get(&self, ticket_id: &TicketId) -> TicketResult<Ticket> {
        self.api.get_ticket(ticket_id).await
    }
}
