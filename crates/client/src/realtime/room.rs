//! Room membership
//!
//! Rooms are server-side multicast groups addressed by a [`RoomType`] and, for
//! per-actor rooms, an identity key. The router keeps an ordered set of join
//! intents and replays all of them whenever the connection comes up on a new
//! link, because the server forgets memberships when a link ends.
//!
//! Intents registered while offline are queued and sent on the next connect.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use pharmadesk_shared::{Role, Session};
use serde_json::Value;
use tokio::task::JoinHandle;

use super::connection::ConnectionManager;
use super::events::WireFrame;
use crate::error::RoomError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomType {
    Customer,
    Pharmacist,
    Delivery,
    /// Broadcast room for every admin, never keyed
    Admin,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Pharmacist => "pharmacist",
            Self::Delivery => "delivery",
            Self::Admin => "admin",
        }
    }

    pub fn requires_key(&self) -> bool {
        !matches!(self, Self::Admin)
    }
}

impl From<Role> for RoomType {
    fn from(role: Role) -> Self {
        match role {
            Role::Customer => Self::Customer,
            Role::Pharmacist => Self::Pharmacist,
            Role::Delivery => Self::Delivery,
            Role::Admin => Self::Admin,
        }
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomType {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "pharmacist" => Ok(Self::Pharmacist),
            "delivery" => Ok(Self::Delivery),
            "admin" => Ok(Self::Admin),
            other => Err(RoomError::InvalidRoomType(other.to_string())),
        }
    }
}

/// One `(room type, key)` membership the client wants
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomIntent {
    pub room_type: RoomType,
    pub key: Option<String>,
}

impl RoomIntent {
    pub fn new(room_type: RoomType, key: Option<String>) -> Result<Self, RoomError> {
        let key = if room_type.requires_key() {
            match key {
                Some(key) if !key.is_empty() => Some(key),
                _ => return Err(RoomError::MissingKey(room_type.to_string())),
            }
        } else {
            None
        };
        Ok(Self { room_type, key })
    }

    /// The room a session belongs to: admins share one broadcast room, every
    /// other role gets a room keyed by its identity.
    pub fn for_session(session: &Session) -> Self {
        let room_type = RoomType::from(session.role());
        let key = room_type
            .requires_key()
            .then(|| session.identity().to_string());
        Self { room_type, key }
    }

    fn frame(&self, verb: &str) -> WireFrame {
        let data = self
            .key
            .as_ref()
            .map(|k| Value::String(k.clone()))
            .unwrap_or(Value::Null);
        WireFrame::new(format!("{}-{}", verb, self.room_type), data)
    }

    pub fn join_frame(&self) -> WireFrame {
        self.frame("join")
    }

    pub fn leave_frame(&self) -> WireFrame {
        self.frame("leave")
    }
}

#[derive(Default)]
struct RouterState {
    /// Registration order is replay order
    intents: Vec<RoomIntent>,
    /// Connection epoch the intents were last replayed on
    replayed_epoch: Option<u64>,
}

/// Joins and leaves rooms over the shared connection
pub struct RoomRouter {
    connection: Arc<ConnectionManager>,
    state: Mutex<RouterState>,
    replay_task: Mutex<Option<JoinHandle<()>>>,
}

impl RoomRouter {
    pub fn new(connection: Arc<ConnectionManager>) -> Arc<Self> {
        Arc::new(Self {
            connection,
            state: Mutex::new(RouterState::default()),
            replay_task: Mutex::new(None),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Watch the connection and replay intents on every new link.
    ///
    /// The task holds a weak reference, so dropping the router ends it.
    pub fn start(self: &Arc<Self>) {
        let mut status_rx = self.connection.subscribe_state();
        let router: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                let status = status_rx.borrow_and_update().clone();
                if status.is_connected() {
                    match router.upgrade() {
                        Some(router) => router.replay(status.epoch),
                        None => break,
                    }
                }
                if status_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        let mut slot = self
            .replay_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Register a join intent. Idempotent: a repeated join emits nothing.
    pub fn join(&self, room_type: RoomType, key: Option<&str>) -> Result<(), RoomError> {
        let intent = RoomIntent::new(room_type, key.map(str::to_string)).inspect_err(|e| {
            tracing::error!(room = %room_type, error = %e, "Rejected room join");
        })?;

        let mut state = self.lock();
        if state.intents.contains(&intent) {
            return Ok(());
        }
        let live = self.live_epoch_matches(&state);
        state.intents.push(intent.clone());
        drop(state);

        if live {
            self.send(intent.join_frame());
        } else {
            tracing::debug!(room = %room_type, "Join queued until connected");
        }
        Ok(())
    }

    /// Join by wire name. Unknown room types are logged and rejected.
    pub fn join_named(&self, room_type: &str, key: Option<&str>) -> Result<(), RoomError> {
        let room_type = parse_room_type(room_type)?;
        self.join(room_type, key)
    }

    /// Drop a join intent, telling the server if the link is up
    pub fn leave(&self, room_type: RoomType, key: Option<&str>) -> Result<(), RoomError> {
        let intent = RoomIntent::new(room_type, key.map(str::to_string)).inspect_err(|e| {
            tracing::error!(room = %room_type, error = %e, "Rejected room leave");
        })?;

        let mut state = self.lock();
        let before = state.intents.len();
        state.intents.retain(|i| i != &intent);
        let removed = state.intents.len() < before;
        let live = self.live_epoch_matches(&state);
        drop(state);

        if removed && live {
            self.send(intent.leave_frame());
        }
        Ok(())
    }

    pub fn leave_named(&self, room_type: &str, key: Option<&str>) -> Result<(), RoomError> {
        let room_type = parse_room_type(room_type)?;
        self.leave(room_type, key)
    }

    /// Join the room implied by the session's role and identity
    pub fn join_session_rooms(&self, session: &Session) {
        let intent = RoomIntent::for_session(session);
        if let Err(e) = self.join(intent.room_type, intent.key.as_deref()) {
            tracing::error!(error = %e, "Failed to register session room");
        }
    }

    /// Current intents in registration order
    pub fn intents(&self) -> Vec<RoomIntent> {
        self.lock().intents.clone()
    }

    /// Re-issue every join on the link identified by `epoch`. Runs at most once
    /// per epoch.
    fn replay(&self, epoch: u64) {
        let mut state = self.lock();
        if state.replayed_epoch == Some(epoch) {
            return;
        }
        // A newer link is already up; its own replay covers it
        let current = self.connection.status();
        if !current.is_connected() || current.epoch != epoch {
            tracing::debug!(epoch, current = current.epoch, "Skipping stale room replay");
            return;
        }
        state.replayed_epoch = Some(epoch);

        tracing::info!(epoch, rooms = state.intents.len(), "Replaying room joins");
        for intent in &state.intents {
            self.send(intent.join_frame());
        }
    }

    fn live_epoch_matches(&self, state: &RouterState) -> bool {
        let status = self.connection.status();
        status.is_connected() && state.replayed_epoch == Some(status.epoch)
    }

    fn send(&self, frame: WireFrame) {
        let event = frame.event.clone();
        if let Err(e) = self.connection.emit(frame) {
            // The next replay covers it
            tracing::debug!(event = %event, error = %e, "Room frame not sent");
        }
    }
}

impl Drop for RoomRouter {
    fn drop(&mut self) {
        if let Some(handle) = self
            .replay_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

fn parse_room_type(name: &str) -> Result<RoomType, RoomError> {
    name.parse::<RoomType>().inspect_err(|e| {
        tracing::error!(room = %name, error = %e, "Ignoring unknown room type");
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::realtime::connection::{ConnectOptions, ConnectionStatus, ReconnectPolicy};
    use crate::realtime::hub::EventHub;
    use crate::realtime::testing::{ScriptedTransport, Step};
    use crate::realtime::transport::{LinkPeer, TransportKind};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use url::Url;

    fn setup(
        steps: impl IntoIterator<Item = Step>,
    ) -> (Arc<ConnectionManager>, Arc<RoomRouter>, mpsc::UnboundedReceiver<LinkPeer>) {
        let (transport, peers) = ScriptedTransport::new(TransportKind::WebSocket, steps);
        let session = Session::new("pharm-7", Role::Pharmacist);
        let connection = Arc::new(ConnectionManager::new(
            session,
            vec![transport.shared()],
            EventHub::new(),
        ));
        let router = RoomRouter::new(Arc::clone(&connection));
        router.start();
        (connection, router, peers)
    }

    fn connect(connection: &ConnectionManager) {
        let options = ConnectOptions {
            token: None,
            policy: ReconnectPolicy::from_time_unit(Duration::from_millis(1)),
        };
        connection.connect(Url::parse("ws://localhost:4000/").unwrap(), options);
    }

    async fn next_event(peer: &mut LinkPeer) -> WireFrame {
        tokio::time::timeout(Duration::from_secs(5), peer.from_client.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_room_type_parsing() {
        assert_eq!("delivery".parse::<RoomType>().unwrap(), RoomType::Delivery);
        assert_eq!(
            "warehouse".parse::<RoomType>(),
            Err(RoomError::InvalidRoomType("warehouse".into()))
        );
    }

    #[test]
    fn test_session_room_intents() {
        let admin = RoomIntent::for_session(&Session::new("a-1", Role::Admin));
        assert_eq!(admin.join_frame(), WireFrame::new("join-admin", Value::Null));

        let courier = RoomIntent::for_session(&Session::new("d-1", Role::Delivery));
        assert_eq!(courier.join_frame(), WireFrame::new("join-delivery", json!("d-1")));
        assert_eq!(courier.leave_frame().event, "leave-delivery");
    }

    #[test]
    fn test_keyed_rooms_require_key() {
        assert_eq!(
            RoomIntent::new(RoomType::Customer, None),
            Err(RoomError::MissingKey("customer".into()))
        );
        // Admin ignores any key
        let admin = RoomIntent::new(RoomType::Admin, Some("x".into())).unwrap();
        assert_eq!(admin.key, None);
    }

    #[tokio::test]
    async fn test_offline_joins_are_queued_once_and_flushed() {
        let (connection, router, mut peers) = setup([Step::Accept]);

        router.join(RoomType::Pharmacist, Some("pharm-7")).unwrap();
        router.join(RoomType::Pharmacist, Some("pharm-7")).unwrap();
        router.join(RoomType::Admin, None).unwrap();
        router.leave(RoomType::Admin, None).unwrap();
        assert_eq!(router.intents().len(), 1);

        connect(&connection);
        let mut peer = peers.recv().await.unwrap();

        assert_eq!(
            next_event(&mut peer).await,
            WireFrame::new("join-pharmacist", json!("pharm-7"))
        );
        // Nothing else was queued
        router.join_named("customer", Some("c-1")).unwrap();
        assert_eq!(next_event(&mut peer).await.event, "join-customer");
    }

    #[tokio::test]
    async fn test_rejoins_on_every_new_link() {
        let (connection, router, mut peers) = setup([Step::Accept, Step::Accept]);
        router.join_session_rooms(connection.session());
        connect(&connection);

        let mut first = peers.recv().await.unwrap();
        assert_eq!(next_event(&mut first).await.event, "join-pharmacist");

        drop(first);
        let mut second = peers.recv().await.unwrap();
        assert_eq!(
            next_event(&mut second).await,
            WireFrame::new("join-pharmacist", json!("pharm-7"))
        );

        let mut rx = connection.subscribe_state();
        let status = rx.wait_for(ConnectionStatus::is_connected).await.unwrap().clone();
        assert_eq!(status.epoch, 2);
    }

    #[tokio::test]
    async fn test_stale_replay_does_not_resend_on_newer_link() {
        let (connection, router, mut peers) = setup([Step::Accept, Step::Accept]);
        router.join_session_rooms(connection.session());
        connect(&connection);

        let first = peers.recv().await.unwrap();
        drop(first);
        let mut second = peers.recv().await.unwrap();
        assert_eq!(next_event(&mut second).await.event, "join-pharmacist");

        // A replay for the previous link arriving late emits nothing
        router.replay(1);
        assert!(second.from_client.try_recv().is_err());

        // The current link stays marked as replayed, so new joins go out directly
        router.join(RoomType::Admin, None).unwrap();
        assert_eq!(
            next_event(&mut second).await,
            WireFrame::new("join-admin", Value::Null)
        );
    }

    #[tokio::test]
    async fn test_leave_while_connected_emits_leave() {
        let (connection, router, mut peers) = setup([Step::Accept]);
        router.join(RoomType::Delivery, Some("d-2")).unwrap();
        connect(&connection);

        let mut peer = peers.recv().await.unwrap();
        assert_eq!(next_event(&mut peer).await.event, "join-delivery");

        router.leave(RoomType::Delivery, Some("d-2")).unwrap();
        assert_eq!(
            next_event(&mut peer).await,
            WireFrame::new("leave-delivery", json!("d-2"))
        );
        assert!(router.intents().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_room_type_is_rejected_without_side_effects() {
        let (_connection, router, _peers) = setup([]);
        assert!(matches!(
            router.join_named("warehouse", Some("w-1")),
            Err(RoomError::InvalidRoomType(_))
        ));
        assert!(router.intents().is_empty());
    }
}
