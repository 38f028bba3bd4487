//! # Network Servers
//!
//! Two listeners run side by side:
//!
//! | Port | Serves |
//! |------|--------|
//! | `http_port` | capture page + static assets ([`http`]) |
//! | `ws_port` | control/audio WebSocket ([`ws`]) |

pub mod http;
pub mod ws;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::state::AppState;

/// Bind both listeners and serve until either fails.
pub async fn serve(state: AppState) -> Result<()> {
    let network = &state.settings.network;

    let http_listener = bind(&network.hostname, network.http_port).await?;
    let ws_listener = bind(&network.hostname, network.ws_port).await?;

    info!("HTTP server is started at http://{}", http_listener.local_addr()?);
    info!("WebSocket server is started at ws://{}", ws_listener.local_addr()?);

    let http_app = http::router(&state.settings.static_files);
    let ws_app = ws::router(state.clone()).into_make_service_with_connect_info::<SocketAddr>();

    tokio::try_join!(
        async { axum::serve(http_listener, http_app).await.context("HTTP server terminated") },
        async { axum::serve(ws_listener, ws_app).await.context("WebSocket server terminated") },
    )?;
    Ok(())
}

async fn bind(hostname: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((hostname, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", hostname, port))
}
