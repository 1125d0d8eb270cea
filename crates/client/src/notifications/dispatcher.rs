//! Event to notification dispatch
//!
//! [`EventDispatcher`] is a plain state machine: feed it events in delivery
//! order and it updates its [`NotificationStore`]. [`EventDispatcher::spawn`]
//! runs it on a single task that also serves host commands, so events and
//! commands never interleave mid-update.

use std::sync::Arc;

use pharmadesk_shared::Session;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::alert::{AlertSink, AlertTone};
use super::store::NotificationStore;
use super::{Notification, NotificationDetails, NotificationId, NotificationKind};
use crate::realtime::events::{OrderRef, ServerEvent};
use crate::realtime::hub::Subscription;

/// What a single event did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Notified(NotificationId),
    /// `orderNoLongerAvailable` removed this many entries
    Removed(usize),
    /// An equivalent notification is already retained
    Duplicate,
    /// Not an order notification (ticket events)
    Ignored,
}

impl DispatchOutcome {
    pub fn changed_store(&self) -> bool {
        matches!(self, Self::Notified(_) | Self::Removed(1..))
    }
}

/// Host requests served by the dispatcher task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCommand {
    Dismiss(NotificationId),
    Clear,
}

pub struct EventDispatcher {
    session: Session,
    store: NotificationStore,
    alerts: Arc<dyn AlertSink>,
    next_id: u64,
}

impl EventDispatcher {
    pub fn new(session: Session, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            session,
            store: NotificationStore::new(),
            alerts,
            next_id: 1,
        }
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    /// Apply one event
    pub fn dispatch(&mut self, event: ServerEvent) -> DispatchOutcome {
        if let ServerEvent::OrderNoLongerAvailable(payload) = &event {
            let removed = self.store.remove(|n| matches_any_key(n, &payload.order));
            tracing::info!(
                order_id = ?payload.order.order_id,
                order_number = ?payload.order.order_number,
                removed,
                "Order withdrawn"
            );
            return DispatchOutcome::Removed(removed);
        }

        let id = NotificationId(self.next_id);
        let Some(notification) = notification_for(&event, id, OffsetDateTime::now_utc()) else {
            return DispatchOutcome::Ignored;
        };

        if self.store.contains_equivalent(&notification) {
            tracing::debug!(kind = %notification.kind, "Duplicate notification suppressed");
            return DispatchOutcome::Duplicate;
        }

        self.next_id += 1;
        tracing::info!(
            notification_id = %id,
            kind = %notification.kind,
            order_number = ?notification.order_number,
            "Notification received"
        );
        self.store.push(notification);
        self.alerts.play(AlertTone::for_role(self.session.role()));
        DispatchOutcome::Notified(id)
    }

    pub fn apply(&mut self, command: NotificationCommand) {
        match command {
            NotificationCommand::Dismiss(id) => {
                self.store.dismiss(id);
            }
            NotificationCommand::Clear => self.store.clear(),
        }
    }

    /// Consume `subscription` on a dedicated task.
    ///
    /// The task owns the subscription and ends when the handle is dropped or
    /// shut down, or when the registration is removed from the hub.
    pub fn spawn(self, mut subscription: Subscription) -> DispatcherHandle {
        let (commands, mut command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(self.store.snapshot());
        let mut dispatcher = self;

        let task = tokio::spawn(async move {
            loop {
                let changed = tokio::select! {
                    event = subscription.recv() => match event {
                        Some(event) => dispatcher.dispatch(event).changed_store(),
                        None => break,
                    },
                    command = command_rx.recv() => match command {
                        Some(command) => {
                            dispatcher.apply(command);
                            true
                        }
                        None => break,
                    },
                };
                if changed {
                    snapshot_tx.send_replace(dispatcher.store.snapshot());
                }
            }
            tracing::debug!("Notification dispatcher stopped");
        });

        DispatcherHandle {
            commands,
            snapshots,
            task,
        }
    }
}

/// Build the notification for an order event; `None` for everything else
pub fn notification_for(
    event: &ServerEvent,
    id: NotificationId,
    created_at: OffsetDateTime,
) -> Option<Notification> {
    let (kind, message, order, details) = match event {
        ServerEvent::OrderAccepted(p) | ServerEvent::OrderAcceptedByPharmacist(p) => {
            let kind = if matches!(event, ServerEvent::OrderAccepted(_)) {
                NotificationKind::OrderAccepted
            } else {
                NotificationKind::OrderAcceptedByPharmacist
            };
            let details = NotificationDetails {
                pharmacist: p.pharmacist.clone(),
                ..Default::default()
            };
            (kind, &p.message, &p.order, details)
        }
        ServerEvent::OrderRejected(p) | ServerEvent::OrderCancelled(p) => {
            let kind = if matches!(event, ServerEvent::OrderRejected(_)) {
                NotificationKind::OrderRejected
            } else {
                NotificationKind::OrderCancelled
            };
            let details = NotificationDetails {
                reason: p.reason.clone(),
                ..Default::default()
            };
            (kind, &p.message, &p.order, details)
        }
        ServerEvent::OrderReadyForDelivery(p) | ServerEvent::OrderDelivered(p) => {
            let kind = if matches!(event, ServerEvent::OrderReadyForDelivery(_)) {
                NotificationKind::OrderReadyForDelivery
            } else {
                NotificationKind::OrderDelivered
            };
            let details = NotificationDetails {
                delivery_boy: p.delivery_boy.clone(),
                ..Default::default()
            };
            (kind, &p.message, &p.order, details)
        }
        ServerEvent::OrderStatusUpdated(p) | ServerEvent::OrderStatusChanged(p) => {
            let kind = if matches!(event, ServerEvent::OrderStatusUpdated(_)) {
                NotificationKind::OrderStatusUpdated
            } else {
                NotificationKind::OrderStatusChanged
            };
            let details = NotificationDetails {
                status: Some(p.status.clone()),
                ..Default::default()
            };
            (kind, &p.message, &p.order, details)
        }
        ServerEvent::OrderClaimed(p) | ServerEvent::OrderAssigned(p) => {
            let kind = if matches!(event, ServerEvent::OrderClaimed(_)) {
                NotificationKind::OrderClaimed
            } else {
                NotificationKind::OrderAssigned
            };
            let details = NotificationDetails {
                delivery_boy: p.delivery_boy.clone(),
                customer_info: p.customer_info.clone(),
                amount: p.amount,
                ..Default::default()
            };
            (kind, &p.message, &p.order, details)
        }
        ServerEvent::NewOrder(p) => {
            let details = NotificationDetails {
                customer_info: p.customer_info.clone(),
                amount: p.amount,
                priority: p.priority.clone(),
                ..Default::default()
            };
            (NotificationKind::NewOrder, &p.message, &p.order, details)
        }
        ServerEvent::OrderNoLongerAvailable(_)
        | ServerEvent::TicketUpdated(_)
        | ServerEvent::TicketMessage(_) => return None,
    };

    Some(Notification {
        id,
        kind,
        title: kind.title().to_string(),
        message: message.clone(),
        order_id: order.order_id.clone(),
        order_number: order.order_number.clone(),
        details,
        created_at,
    })
}

/// Either the event's order id or its order number matches the notification
fn matches_any_key(notification: &Notification, order: &OrderRef) -> bool {
    let by_id = order
        .order_id
        .as_ref()
        .is_some_and(|id| notification.matches_order_key(id.as_str()));
    let by_number = order
        .order_number
        .as_deref()
        .is_some_and(|number| notification.matches_order_key(number));
    by_id || by_number
}

/// Host side of a running dispatcher
pub struct DispatcherHandle {
    commands: mpsc::UnboundedSender<NotificationCommand>,
    snapshots: watch::Receiver<Vec<Notification>>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    pub fn dismiss(&self, id: NotificationId) {
        let _ = self.commands.send(NotificationCommand::Dismiss(id));
    }

    pub fn clear(&self) {
        let _ = self.commands.send(NotificationCommand::Clear);
    }

    /// Latest retained notifications, most recent first
    pub fn notifications(&self) -> Vec<Notification> {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every store change
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.snapshots.clone()
    }

    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Notification dispatcher panicked");
        }
    }
}
