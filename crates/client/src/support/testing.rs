//! In-memory ticket store for unit tests

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pharmadesk_shared::{
    Message, OrderId, ParticipantId, Role, Sender, Ticket, TicketId, TicketStatus,
};
use time::OffsetDateTime;
use tokio::sync::Notify;

use super::api::{MessageDraft, TicketApi};
use crate::error::{TicketError, TicketResult};

#[derive(Default)]
struct Calls {
    list: AtomicU32,
    create: AtomicU32,
    reply: AtomicU32,
    close: AtomicU32,
}

pub(crate) struct MemoryTicketApi {
    caller: ParticipantId,
    tickets: Mutex<Vec<Ticket>>,
    next_id: AtomicU32,
    calls: Calls,
    fail_next: Mutex<Option<TicketError>>,
    create_gate: Mutex<Option<Arc<Notify>>>,
    create_pending: Notify,
}

impl MemoryTicketApi {
    pub(crate) fn new() -> Self {
        Self {
            caller: ParticipantId::from("cust-1"),
            tickets: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            calls: Calls::default(),
            fail_next: Mutex::new(None),
            create_gate: Mutex::new(None),
            create_pending: Notify::new(),
        }
    }

    fn next_ticket_id(&self) -> TicketId {
        TicketId::new(format!("t-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    pub(crate) fn seed(
        &self,
        participant: &str,
        order_id: Option<&str>,
        status: TicketStatus,
        updated_at: OffsetDateTime,
    ) -> TicketId {
        let id = self.next_ticket_id();
        self.tickets.lock().unwrap().push(Ticket {
            id: id.clone(),
            participant_id: ParticipantId::from(participant),
            order_id: order_id.map(OrderId::from),
            status,
            conversation: Vec::new(),
            updated_at,
        });
        id
    }

    pub(crate) fn tickets(&self) -> Vec<Ticket> {
        self.tickets.lock().unwrap().clone()
    }

    pub(crate) fn ticket(&self, id: &TicketId) -> Option<Ticket> {
        self.tickets().into_iter().find(|t| &t.id == id)
    }

    pub(crate) fn network_calls(&self) -> u32 {
        self.calls.list.load(Ordering::SeqCst)
            + self.calls.create.load(Ordering::SeqCst)
            + self.calls.reply.load(Ordering::SeqCst)
            + self.calls.close.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> u32 {
        self.calls.close.load(Ordering::SeqCst)
    }

    /// The next write fails with `error`
    pub(crate) fn fail_next_write(&self, error: TicketError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// Park the next `create_ticket` until the returned gate is notified
    pub(crate) fn hold_creates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.create_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) async fn wait_for_pending_create(&self) {
        self.create_pending.notified().await;
    }

    fn take_failure(&self) -> TicketResult<()> {
        match self.fail_next.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn message(&self, draft: &MessageDraft) -> Message {
        Message {
            sender: Sender {
                id: self.caller.clone(),
                display_role: Role::Customer,
            },
            body: draft.body().to_string(),
            attachments: draft
                .attachments()
                .iter()
                .map(|a| format!("https://blobs.test/{}", a.file_name))
                .collect(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    fn update<F>(&self, id: &TicketId, apply: F) -> TicketResult<Ticket>
    where
        F: FnOnce(&mut Ticket) -> TicketResult<()>,
    {
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or(TicketError::NotFound)?;
        apply(ticket)?;
        ticket.updated_at = OffsetDateTime::now_utc();
        Ok(ticket.clone())
    }
}

#[async_trait]
impl TicketApi for MemoryTicketApi {
    async fn list_tickets(&self) -> TicketResult<Vec<Ticket>> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        Ok(self.tickets())
    }

    async fn get_ticket(&self, id: &TicketId) -> TicketResult<Ticket> {
        self.ticket(id).ok_or(TicketError::NotFound)
    }

    async fn create_ticket(
        &self,
        draft: &MessageDraft,
        order_id: Option<&OrderId>,
    ) -> TicketResult<Ticket> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        let gate = self.create_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.create_pending.notify_one();
            gate.notified().await;
        }
        self.take_failure()?;

        let ticket = Ticket {
            id: self.next_ticket_id(),
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
        self.calls.reply.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        let message = self.message(draft);
        self.update(id, |ticket| {
            if ticket.status.is_closed() {
                return Err(TicketError::TicketClosed);
            }
            ticket.conversation.push(message);
            Ok(())
        })
    }

    async fn close(&self, id: &TicketId) -> TicketResult<Ticket> {
        self.calls.close.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        self.update(id, |ticket| {
            ticket.status = TicketStatus::Closed;
            Ok(())
        })
    }
}
