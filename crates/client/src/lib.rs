//! Pharmadesk Client
//!
//! Realtime event distribution and support-ticket messaging for the pharmacy
//! marketplace:
//! - [`realtime`]: connection lifecycle, transports, typed events, rooms
//! - [`notifications`]: order notifications with bounded retention
//! - [`support`]: REST-backed tickets and conversation state

pub mod client;
pub mod config;
pub mod error;
pub mod notifications;
pub mod realtime;
pub mod support;

pub use client::{ticket_service, transports_for, RealtimeClient};
pub use config::{Config, ConfigError};
pub use error::{ConnectionError, ProtocolError, RoomError, TicketError, TicketResult, TransportError};
