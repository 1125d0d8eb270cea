//! Realtime connection lifecycle
//!
//! [`ConnectionManager`] owns the single realtime link of a session. `connect`
//! spawns a supervisor task that negotiates a transport, pumps inbound frames
//! into the [`EventHub`] and reconnects on drops with a capped exponential
//! backoff. Every transition is published on a `watch` channel.
//!
//! Connection failures are advisory: they end up in
//! [`ConnectionStatus::last_error`] and never propagate to the host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pharmadesk_shared::Session;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use url::Url;

use super::events::{ServerEvent, WireFrame};
use super::hub::EventHub;
use super::transport::{Link, Transport, TransportKind};
use crate::error::{ConnectionError, TransportError};

/// Number of base delays the backoff is capped at
const MAX_DELAY_UNITS: u32 = 5;
/// Handshake timeout expressed in base delays
const HANDSHAKE_TIMEOUT_UNITS: u32 = 20;

// =============================================================================
// Reconnect Policy
// =============================================================================

/// Retry schedule for failed connects and dropped links
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
    /// Bound on a single transport handshake
    pub handshake_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_time_unit(Duration::from_secs(1))
    }
}

impl ReconnectPolicy {
    /// Policy scaled to `unit`: delays of 1, 2, 4, 5, 5 units, five attempts,
    /// handshake bounded at 20 units.
    pub fn from_time_unit(unit: Duration) -> Self {
        Self {
            base_delay: unit,
            max_delay: unit * MAX_DELAY_UNITS,
            max_attempts: 5,
            handshake_timeout: unit * HANDSHAKE_TIMEOUT_UNITS,
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(16);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }
}

/// Per-connect options
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Bearer token handed to the transport handshake
    pub token: Option<String>,
    pub policy: ReconnectPolicy,
}

// =============================================================================
// Connection Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Retries exhausted. Only a manual `connect` leaves this state.
    Errored,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Observable snapshot of the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Transport of the live link, if any
    pub transport: Option<TransportKind>,
    pub last_error: Option<String>,
    /// Consecutive failed attempts since the last successful connect
    pub retry_attempts: u32,
    /// Incremented on every successful connect; a new value means a fresh
    /// server-side session with no room memberships.
    pub epoch: u64,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            transport: None,
            last_error: None,
            retry_attempts: 0,
            epoch: 0,
        }
    }
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

// =============================================================================
// Connection Manager
// =============================================================================

type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<WireFrame>>>>;

struct Supervisor {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    /// Cleared by the supervisor before it publishes `Errored`, so a host
    /// reacting to that state can reconnect before the task has finished.
    running: Arc<AtomicBool>,
}

impl Supervisor {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.handle.is_finished()
    }
}

/// Owns the realtime link for one session
pub struct ConnectionManager {
    session: Session,
    transports: Arc<Vec<Arc<dyn Transport>>>,
    hub: EventHub,
    status: Arc<watch::Sender<ConnectionStatus>>,
    outbound: OutboundSlot,
    supervisor: Mutex<Option<Supervisor>>,
}

impl ConnectionManager {
    /// `transports` are tried in the given order on every attempt
    pub fn new(session: Session, transports: Vec<Arc<dyn Transport>>, hub: EventHub) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            session,
            transports: Arc::new(transports),
            hub,
            status: Arc::new(status),
            outbound: Arc::new(Mutex::new(None)),
            supervisor: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Current status snapshot
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes. Dropping the receiver cancels it.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    fn supervisor_slot(&self) -> MutexGuard<'_, Option<Supervisor>> {
        self.supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start connecting in the background and return immediately.
    ///
    /// A no-op while a supervisor is already running. After `Errored` or
    /// `disconnect` a fresh supervisor starts with counters reset.
    /// Must be called within a tokio runtime.
    pub fn connect(&self, endpoint: Url, options: ConnectOptions) {
        let mut slot = self.supervisor_slot();
        if slot.as_ref().is_some_and(Supervisor::is_running) {
            tracing::debug!(endpoint = %endpoint, "Connect ignored, supervisor already running");
            return;
        }
        if let Some(previous) = slot.take() {
            // Gave up but still unwinding
            let _ = previous.shutdown.send(());
        }

        self.status.send_modify(|status| {
            status.state = ConnectionState::Connecting;
            status.transport = None;
            status.retry_attempts = 0;
        });

        let (shutdown, shutdown_rx) = oneshot::channel();
        let running = Arc::new(AtomicBool::new(true));
        let run = SupervisorRun {
            running: Arc::clone(&running),
            identity: self.session.identity().to_string(),
            transports: Arc::clone(&self.transports),
            hub: self.hub.clone(),
            status: Arc::clone(&self.status),
            outbound: Arc::clone(&self.outbound),
            endpoint,
            options,
        };
        let handle = tokio::spawn(run.run(shutdown_rx));
        *slot = Some(Supervisor {
            shutdown,
            handle,
            running,
        });
    }

    /// Close the link and stop reconnecting
    pub async fn disconnect(&self) {
        let supervisor = self.supervisor_slot().take();
        if let Some(Supervisor {
            shutdown, handle, ..
        }) = supervisor
        {
            let _ = shutdown.send(());
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Connection supervisor panicked");
            }
        }
        clear_outbound(&self.outbound);
        self.status.send_modify(|status| {
            status.state = ConnectionState::Disconnected;
            status.transport = None;
        });
        tracing::info!(identity = %self.session.identity(), "Realtime connection closed");
    }

    /// Send a frame on the live link
    pub fn emit(&self, frame: WireFrame) -> Result<(), ConnectionError> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        match outbound.as_ref() {
            Some(sender) => sender
                .send(frame)
                .map_err(|_| ConnectionError::NotConnected),
            None => Err(ConnectionError::NotConnected),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor_slot().take() {
            let _ = supervisor.shutdown.send(());
        }
    }
}

fn clear_outbound(outbound: &OutboundSlot) {
    *outbound.lock().unwrap_or_else(PoisonError::into_inner) = None;
}

// =============================================================================
// Supervisor
// =============================================================================

enum LinkEnd {
    Dropped,
    Shutdown,
}

struct SupervisorRun {
    running: Arc<AtomicBool>,
    identity: String,
    transports: Arc<Vec<Arc<dyn Transport>>>,
    hub: EventHub,
    status: Arc<watch::Sender<ConnectionStatus>>,
    outbound: OutboundSlot,
    endpoint: Url,
    options: ConnectOptions,
}

impl SupervisorRun {
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let policy = self.options.policy.clone();
        let mut failures: u32 = 0;
        let mut dropped = false;

        loop {
            if failures > 0 || dropped {
                let attempt = failures + 1;
                let delay = policy.delay_for(attempt);
                self.status.send_modify(|status| {
                    status.state = ConnectionState::Reconnecting;
                    status.transport = None;
                    status.retry_attempts = failures;
                });
                tracing::info!(
                    identity = %self.identity,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = &mut shutdown => return,
                }
            }

            let negotiated = tokio::select! {
                result = self.negotiate(policy.handshake_timeout) => result,
                _ = &mut shutdown => return,
            };

            match negotiated {
                Ok(link) => {
                    failures = 0;
                    dropped = false;
                    match self.pump(link, &mut shutdown).await {
                        LinkEnd::Shutdown => return,
                        LinkEnd::Dropped => {
                            tracing::warn!(identity = %self.identity, "Realtime link dropped");
                            dropped = true;
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        identity = %self.identity,
                        error = %e,
                        attempt = failures,
                        max_attempts = policy.max_attempts,
                        "Realtime connect failed"
                    );
                    self.status.send_modify(|status| {
                        status.last_error = Some(e.to_string());
                        status.retry_attempts = failures;
                    });

                    if failures >= policy.max_attempts {
                        self.running.store(false, Ordering::SeqCst);
                        self.status.send_modify(|status| {
                            status.state = ConnectionState::Errored;
                            status.transport = None;
                        });
                        tracing::error!(
                            identity = %self.identity,
                            attempts = failures,
                            "Realtime connection gave up"
                        );
                        return;
                    }
                }
            }
        }
    }

    /// Try each transport in order, each bounded by the handshake timeout
    async fn negotiate(&self, handshake_timeout: Duration) -> Result<Link, TransportError> {
        let token = self.options.token.as_deref();
        let mut last_error = TransportError::NoTransport;

        for transport in self.transports.iter() {
            let kind = transport.kind();
            match tokio::time::timeout(handshake_timeout, transport.open(&self.endpoint, token)).await
            {
                Ok(Ok(link)) => return Ok(link),
                Ok(Err(e)) => {
                    tracing::debug!(transport = %kind, error = %e, "Transport handshake failed");
                    last_error = e;
                }
                Err(_) => {
                    tracing::debug!(transport = %kind, "Transport handshake timed out");
                    last_error = TransportError::HandshakeTimeout { kind };
                }
            }
        }

        Err(last_error)
    }

    /// Publish the link, then forward inbound frames until it ends
    async fn pump(&self, link: Link, shutdown: &mut oneshot::Receiver<()>) -> LinkEnd {
        let Link {
            id,
            kind,
            outbound,
            mut inbound,
        } = link;

        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(outbound);
        self.status.send_modify(|status| {
            status.state = ConnectionState::Connected;
            status.transport = Some(kind);
            status.retry_attempts = 0;
            status.epoch += 1;
        });
        tracing::info!(identity = %self.identity, link_id = %id, transport = %kind, "Realtime connected");

        let end = loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(frame) => self.dispatch(frame),
                    None => break LinkEnd::Dropped,
                },
                _ = &mut *shutdown => break LinkEnd::Shutdown,
            }
        };

        clear_outbound(&self.outbound);
        end
    }

    fn dispatch(&self, frame: WireFrame) {
        match ServerEvent::from_frame(&frame) {
            Ok(event) => {
                self.hub.publish(event);
            }
            Err(e) => {
                tracing::warn!(event = %frame.event, error = %e, "Dropping inbound event");
            }
        }
    }
}
