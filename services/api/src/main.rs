mod config;
mod protocol;

use crate::config::ApiConfig;
use crate::protocol::{ServerMessage, handle_client_message};
use anyhow::Context;
use axum::{
    Router,
    extract::State,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use podcast_core::orchestrator::spawn_session;
use podcast_core::policy::SessionPolicy;
use podcast_core::reviewer::Reviewer;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

const REPLY_BUFFER: usize = 32;

/// Shared by every connection. Sessions themselves are never shared.
#[derive(Clone)]
struct AppState {
    reviewer: Arc<dyn Reviewer>,
    policy: SessionPolicy,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Runs one podcast session for the lifetime of the connection.
///
/// The socket is split so session commands keep flowing to the client while
/// the reader is busy, and a reset frame is never stuck behind them.
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("WebSocket connection established");
    let (handle, mut commands, actor) = spawn_session(state.reviewer, state.policy);
    let (mut write, mut read) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMessage>(REPLY_BUFFER);

    let writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                Some(command) = commands.recv() => ServerMessage::from(command),
                Some(reply) = reply_rx.recv() => reply,
                else => break,
            };
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to serialize server message: {}", e);
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(json.into())).await {
                info!("Failed to write to WebSocket: {}", e);
                break;
            }
        }
    });

    while let Some(incoming) = read.next().await {
        match incoming {
            Ok(Message::Text(text)) => {
                if let Some(reply) = handle_client_message(&handle, text.as_str()).await {
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                // Client disconnected.
                info!("WebSocket error: {}", e);
                break;
            }
        }
    }

    writer.abort();
    actor.abort();
    info!("WebSocket connection closed");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.service.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let reviewer = podcast_service::build_reviewer(&config.service)?;
    let state = AppState {
        reviewer,
        policy: config.service.policy.clone(),
    };

    // Permissive CORS so a separately served frontend can connect.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state);

    info!("Starting WebSocket server, listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    axum::serve(listener, app).await?;

    Ok(())
}
