//! Support tickets
//!
//! REST-backed ticket operations and the per-screen conversation state. The
//! ticket store is authoritative; realtime ticket events only trigger a
//! refresh.

pub mod api;
pub mod conversation;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{Attachment, HttpTicketApi, MessageDraft, TicketApi};
pub use conversation::{SubmitOutcome, TicketConversation};
pub use service::{select_ticket, TicketContext, TicketService};
