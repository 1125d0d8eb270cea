//! Realtime connection module
//!
//! Everything between the realtime server and the rest of the client:
//! - Transport negotiation (websocket first, long polling as fallback)
//! - Connection lifecycle with capped exponential reconnect
//! - Typed server events and the subscription hub
//! - Room membership with replay on reconnect

pub mod connection;
pub mod events;
pub mod hub;
pub mod polling;
pub mod room;
pub mod transport;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{
    ConnectOptions, ConnectionManager, ConnectionState, ConnectionStatus, ReconnectPolicy,
};
pub use events::{OrderRef, Party, ServerEvent, WireFrame};
pub use hub::{EventFilter, EventHub, Subscription, SubscriptionId};
pub use polling::PollingTransport;
pub use room::{RoomIntent, RoomRouter, RoomType};
pub use transport::{Link, LinkPeer, Transport, TransportKind};
pub use websocket::WebSocketTransport;
