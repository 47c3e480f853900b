use tracing::{debug, error, info};

mod chat;
mod config;
mod history;
mod protocol;
mod relay;
mod rooms;
mod session;
mod store;
mod ws;

use config::{Config, Database};
use history::MessageHistory;
use relay::Relay;
use store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RELAY_* and RUST_LOG may come from a local .env.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = dotenv {
        debug!("Using process environment only, .env not loaded: {}", e);
    }

    info!("Card relay starting...");

    let config = Config::from_env()?;

    let store = match &config.database {
        Database::File(path) => {
            info!("Initializing store at {}", path.display());
            Store::new(path).await?
        }
        Database::Memory => {
            info!("Using in-memory store, messages will not survive a restart");
            Store::in_memory().await?
        }
    };

    let history = MessageHistory::load(store).await?;
    let (relay, relay_task) = Relay::new(history, config.broadcast_scope).spawn(config.queue_capacity);

    let app = ws::router(relay);

    info!("Listening on {}", config.bind_addr());
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                error!("Server stopped with error: {}", e);
            }
        }
        _ = relay_task => {
            error!("Relay stopped unexpectedly");
        }
    }

    Ok(())
}
