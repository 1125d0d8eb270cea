//! Realtime listener
//!
//! Connects as the session in `ACCESS_TOKEN` and logs connection changes and
//! order notifications until Ctrl+C.
//!
//! Usage:
//!   REALTIME_URL=wss://... API_BASE_URL=https://... ACCESS_TOKEN=... \
//!     cargo run --bin pharmadesk-listen

use std::sync::Arc;

use anyhow::Context;
use pharmadesk_client::notifications::LogAlertSink;
use pharmadesk_client::{Config, RealtimeClient};
use pharmadesk_shared::Session;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pharmadesk_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let token = config
        .access_token
        .clone()
        .context("ACCESS_TOKEN is required to listen")?;
    let session = Session::from_bearer_token(&token).context("decoding ACCESS_TOKEN")?;

    tracing::info!(
        realtime = %config.realtime_url,
        identity = %session.identity(),
        role = %session.role(),
        "Configuration loaded"
    );

    let client = RealtimeClient::start(&config, session, Arc::new(LogAlertSink))
        .context("starting realtime client")?;
    let mut status = client.connection_status();
    let mut notifications = client.notification_updates();

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                tracing::info!(
                    state = %current.state,
                    transport = ?current.transport,
                    retry_attempts = current.retry_attempts,
                    last_error = ?current.last_error,
                    "Connection status"
                );
            }
            changed = notifications.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = notifications.borrow_and_update().clone();
                if let Some(latest) = current.first() {
                    tracing::info!(
                        id = %latest.id,
                        kind = %latest.kind,
                        title = %latest.title,
                        message = %latest.message,
                        retained = current.len(),
                        "Notification"
                    );
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for Ctrl+C")?;
                break;
            }
        }
    }

    tracing::info!("Shutting down");
    client.shutdown().await;
    Ok(())
}
