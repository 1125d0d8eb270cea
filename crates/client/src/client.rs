//! Session-scoped realtime client
//!
//! Wires the connection, room router and notification dispatcher together
//! for one signed-in session.

use std::sync::Arc;

use pharmadesk_shared::Session;
use tokio::sync::watch;

use crate::config::Config;
use crate::error::TransportError;
use crate::notifications::{AlertSink, DispatcherHandle, EventDispatcher, Notification};
use crate::realtime::{
    ConnectOptions, ConnectionManager, ConnectionStatus, EventFilter, EventHub, PollingTransport,
    RoomRouter, Transport, TransportKind, WebSocketTransport,
};
use crate::support::{HttpTicketApi, TicketService};

/// Build transports in the configured preference order
pub fn transports_for(kinds: &[TransportKind]) -> Result<Vec<Arc<dyn Transport>>, TransportError> {
    kinds
        .iter()
        .map(|kind| {
            let transport: Arc<dyn Transport> = match kind {
                TransportKind::WebSocket => Arc::new(WebSocketTransport::new()),
                TransportKind::Polling => Arc::new(PollingTransport::new()?),
            };
            Ok::<_, TransportError>(transport)
        })
        .collect()
}

pub struct RealtimeClient {
    session: Session,
    hub: EventHub,
    connection: Arc<ConnectionManager>,
    rooms: Arc<RoomRouter>,
    notifications: DispatcherHandle,
}

impl RealtimeClient {
    /// Start a client with the transports named in `config`
    pub fn start(
        config: &Config,
        session: Session,
        alerts: Arc<dyn AlertSink>,
    ) -> Result<Self, TransportError> {
        let transports = transports_for(&config.transports)?;
        Ok(Self::with_transports(config, session, transports, alerts))
    }

    /// Start a client over explicit transports.
    ///
    /// Returns immediately; connection progress is visible through
    /// [`RealtimeClient::connection_status`].
    pub fn with_transports(
        config: &Config,
        session: Session,
        transports: Vec<Arc<dyn Transport>>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let hub = EventHub::new();
        let connection = Arc::new(ConnectionManager::new(
            session.clone(),
            transports,
            hub.clone(),
        ));

        let rooms = RoomRouter::new(Arc::clone(&connection));
        rooms.start();
        rooms.join_session_rooms(&session);

        let notifications = EventDispatcher::new(session.clone(), alerts)
            .spawn(hub.register(EventFilter::Orders));

        connection.connect(
            config.realtime_url.clone(),
            ConnectOptions {
                token: config.access_token.clone(),
                policy: config.reconnect_policy(),
            },
        );

        tracing::info!(
            identity = %session.identity(),
            role = %session.role(),
            endpoint = %config.realtime_url,
            "Realtime client started"
        );

        Self {
            session,
            hub,
            connection,
            rooms,
            notifications,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Hub for additional subscribers such as conversation views
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn rooms(&self) -> &Arc<RoomRouter> {
        &self.rooms
    }

    pub fn notifications(&self) -> &DispatcherHandle {
        &self.notifications
    }

    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.subscribe_state()
    }

    pub fn notification_updates(&self) -> watch::Receiver<Vec<Notification>> {
        self.notifications.subscribe()
    }

    /// Disconnect and stop dispatching
    pub async fn shutdown(self) {
        self.connection.disconnect().await;
        self.notifications.shutdown().await;
        tracing::info!(identity = %self.session.identity(), "Realtime client stopped");
    }
}

/// Ticket service over the configured REST API
pub fn ticket_service(config: &Config) -> Result<TicketService, crate::error::TicketError> {
    let api = HttpTicketApi::new(
        config.api_base_url.clone(),
        config.access_token.clone(),
        config.http_timeout(),
    )?;
    Ok(TicketService::new(Arc::new(api)))
}
