//! Conversation view-model
//!
//! [`TicketConversation`] holds what one support screen shows: the ticket's
//! message log, the draft body and the attachments staged for the next send.
//! Server responses replace the local ticket wholesale; nothing is inserted
//! optimistically.

use std::sync::Arc;

use pharmadesk_shared::{Message, OrderId, ParticipantId, Ticket, TicketId, TicketStatus};

use super::api::{Attachment, MessageDraft};
use super::service::{TicketContext, TicketService};
use crate::error::{TicketError, TicketResult};
use crate::realtime::hub::{EventFilter, EventHub, Subscription};

/// Result of [`TicketConversation::submit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Sent,
    /// Nothing to send; no request was made
    Skipped,
}

pub struct TicketConversation {
    service: Arc<TicketService>,
    participant: ParticipantId,
    order_id: Option<OrderId>,
    ticket: Option<Ticket>,
    body: String,
    staged: Vec<Attachment>,
    updates: Option<Subscription>,
}

impl TicketConversation {
    /// Load the ticket `participant` should continue for `order_id`
    pub async fn open(
        service: Arc<TicketService>,
        participant: ParticipantId,
        order_id: Option<OrderId>,
    ) -> TicketResult<Self> {
        let context = service
            .fetch_or_create_context(&participant, order_id.as_ref())
            .await?;
        Ok(Self::from_context(service, context))
    }

    pub fn from_context(service: Arc<TicketService>, context: TicketContext) -> Self {
        Self {
            service,
            participant: context.participant,
            order_id: context.order_id,
            ticket: context.ticket,
            body: String::new(),
            staged: Vec::new(),
            updates: None,
        }
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }

    pub fn ticket_id(&self) -> Option<&TicketId> {
        self.ticket.as_ref().map(|t| &t.id)
    }

    pub fn order_id(&self) -> Option<&OrderId> {
        self.order_id.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        self.ticket
            .as_ref()
            .map(|t| t.conversation.as_slice())
            .unwrap_or_default()
    }

    pub fn status(&self) -> Option<TicketStatus> {
        self.ticket.as_ref().map(|t| t.status)
    }

    /// False once the ticket is closed. A conversation without a ticket yet
    /// can always send.
    pub fn can_reply(&self) -> bool {
        self.ticket.as_ref().map_or(true, Ticket::is_open)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    /// Stage a file for the next send. Local only.
    pub fn stage_attachment(&mut self, attachment: Attachment) {
        self.staged.push(attachment);
    }

    /// Unstage by position. Local only.
    pub fn unstage_attachment(&mut self, index: usize) -> Option<Attachment> {
        (index < self.staged.len()).then(|| self.staged.remove(index))
    }

    pub fn staged(&self) -> &[Attachment] {
        &self.staged
    }

    /// Send the draft body and staged attachments.
    ///
    /// An empty draft is skipped without a request. On success the draft is
    /// cleared and the returned ticket replaces local state; on failure the
    /// draft is kept so the user can retry.
    pub async fn submit(&mut self) -> TicketResult<SubmitOutcome> {
        let Some(draft) = MessageDraft::new(self.body.clone(), self.staged.clone()) else {
            tracing::debug!(participant = %self.participant, "Skipping empty submit");
            return Ok(SubmitOutcome::Skipped);
        };
        if !self.can_reply() {
            return Err(TicketError::TicketClosed);
        }

        let result = match &self.ticket {
            Some(ticket) => self.service.reply(&ticket.id, &draft).await,
            None => {
                self.service
                    .send_first_message(&self.participant, &draft, self.order_id.as_ref())
                    .await
            }
        };

        match result {
            Ok(ticket) => {
                tracing::info!(
                    ticket_id = %ticket.id,
                    messages = ticket.conversation.len(),
                    attachments = self.staged.len(),
                    "Message sent"
                );
                self.ticket = Some(ticket);
                self.body.clear();
                self.staged.clear();
                Ok(SubmitOutcome::Sent)
            }
            Err(e) => {
                self.absorb_error(&e);
                tracing::warn!(participant = %self.participant, error = %e, "Message send failed");
                Err(e)
            }
        }
    }

    /// Close the ticket. Without a ticket there is nothing to close.
    pub async fn close_ticket(&mut self) -> TicketResult<()> {
        let Some(id) = self.ticket_id().cloned() else {
            return Ok(());
        };
        match self.service.close(&id).await {
            Ok(ticket) => {
                self.ticket = Some(ticket);
                Ok(())
            }
            Err(e) => {
                self.absorb_error(&e);
                Err(e)
            }
        }
    }

    /// Reload from the service
    pub async fn refresh(&mut self) -> TicketResult<()> {
        match self.ticket_id().cloned() {
            Some(id) => {
                let ticket = self.service.get(&id).await?;
                self.ticket = Some(ticket);
            }
            None => {
                let context = self
                    .service
                    .fetch_or_create_context(&self.participant, self.order_id.as_ref())
                    .await?;
                self.ticket = context.ticket;
            }
        }
        Ok(())
    }

    /// Listen for ticket events on the shared hub
    pub fn watch_updates(&mut self, hub: &EventHub) {
        if self.updates.is_none() {
            self.updates = Some(hub.register(EventFilter::Tickets));
        }
    }

    pub fn is_watching(&self) -> bool {
        self.updates.is_some()
    }

    /// Wait for an event about this conversation's ticket, then refresh.
    ///
    /// Before a ticket exists any ticket event triggers a refresh, since it
    /// may announce the ticket created for this conversation elsewhere.
    /// `None` when not watching.
    pub async fn next_update(&mut self) -> Option<TicketResult<()>> {
        loop {
            let event = self.updates.as_mut()?.recv().await?;
            let relevant = match (event.ticket_id(), self.ticket_id()) {
                (Some(event_ticket), Some(ours)) => event_ticket == ours,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if relevant {
                return Some(self.refresh().await);
            }
        }
    }

    /// Tear down the view: stop listening and drop staged files.
    /// The shared connection is untouched.
    pub fn leave(mut self) {
        self.updates.take();
        self.staged.clear();
        tracing::debug!(participant = %self.participant, "Conversation left");
    }

    fn absorb_error(&mut self, error: &TicketError) {
        if matches!(error, TicketError::TicketClosed) {
            if let Some(ticket) = self.ticket.as_mut() {
                ticket.status = TicketStatus::Closed;
            }
        }
    }
}
