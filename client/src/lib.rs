//! Housemate client - Core library
//!
//! Headless client core for the Housemate group coordination service:
//! sign-in, groups, chat and invitations over a signed RPC channel and
//! per-context socket channels, with a client-side record cache.

pub mod cache;
pub mod comm;
pub mod error;
pub mod forms;
pub mod models;
pub mod session;
pub mod settings;
pub mod state;

pub use error::{AppError, AppResult};
pub use session::{ClientEvent, Session};
pub use settings::Settings;

use tokio::sync::broadcast::error::RecvError;

/// Initialize logging
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "housemate_client=info".into()),
        )
        .try_init();
}

/// Run a headless session until interrupted
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    let settings = Settings::from_env()?;
    tracing::info!(
        "Starting Housemate client (server {}, node {})",
        settings.server_address(),
        settings.node_address()
    );

    let session = Session::connect(&settings)?;
    let mut events = session.subscribe();
    session.init().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => tracing::info!("event: {:?}", event),
                Err(RecvError::Lagged(n)) => tracing::warn!("dropped {} events", n),
                Err(RecvError::Closed) => break,
            },
        }
        for notice in session.take_notices().await {
            tracing::info!("notice ({:?}): {}", notice.level, notice.text);
        }
    }

    tracing::info!("Shutting down");
    session.shutdown().await;
    Ok(())
}
