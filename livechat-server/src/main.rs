//! `LiveChat` server: presence tracking and live message delivery.
//!
//! An axum server exposing the JSON message API under `/api` and the live
//! push channel on `/ws?userId=<id>`. Connected clients receive the online
//! user set as `getOnlineUsers` and new messages as `newMessage`.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:5001
//! cargo run --bin livechat-server
//!
//! # Run on custom address
//! cargo run --bin livechat-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! LIVECHAT_ADDR=127.0.0.1:8080 cargo run --bin livechat-server
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use livechat_server::config::{ServerCliArgs, ServerConfig};
use livechat_server::server::{self, AppState, HttpOptions};

/// How long live connections get to flush their Close frames on ctrl-c.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting livechat server");

    let state = Arc::new(AppState::in_memory());
    let options = HttpOptions::from(&config);

    let addr = config.bind_addr.to_string();
    let (bound_addr, mut handle) =
        match server::start_server_with_state(&addr, Arc::clone(&state), &options).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(error = %e, "failed to start server");
                std::process::exit(1);
            }
        };
    tracing::info!(addr = %bound_addr, "server listening");

    tokio::select! {
        result = &mut handle => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server task failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(
                online = state.presence.online_count(),
                "shutdown requested, closing live connections"
            );
            server::shutdown(&state, SHUTDOWN_GRACE).await;
            handle.abort();
        }
    }
}
