//! Connection handlers for the roomcast server.
//!
//! Bridges WebSocket connections to the event router: inbound text frames
//! are decoded into client intents, and events routed to the connection
//! are encoded back out as JSON text frames.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use roomcast_backplane::{Backplane, MemoryBackplane};
use roomcast_core::{BrokerError, ConnectionId, EventRouter};
use roomcast_protocol::{decode_intent, encode_event, ClientIntent, ServerEvent};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

#[cfg(feature = "redis")]
use roomcast_backplane::RedisBackplane;

/// Shared server state.
pub struct AppState {
    /// The session/room broker.
    pub router: Arc<EventRouter>,
    /// Server configuration.
    pub config: Config,
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let backplane = build_backplane(&config).await;
    let router = Arc::new(EventRouter::new(backplane));

    if let Err(e) = router.connect_backplane().await {
        warn!(error = %e, "Backplane unavailable; running in local-only mode");
    }

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState { router, config });

    let app = Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind(addr).await?;

    info!("roomcast server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Choose the backplane implementation from configuration.
async fn build_backplane(config: &Config) -> Arc<dyn Backplane> {
    #[cfg(feature = "redis")]
    if let Some(url) = &config.backplane.redis_url {
        match RedisBackplane::connect(url).await {
            Ok(backplane) => return Arc::new(backplane),
            Err(e) => {
                warn!(error = %e, "Redis backplane unavailable; using in-process backplane");
            }
        }
    }

    #[cfg(not(feature = "redis"))]
    if config.backplane.redis_url.is_some() {
        warn!("redis_url configured but the 'redis' feature is disabled; using in-process backplane");
    }

    Arc::new(MemoryBackplane::new())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.router.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "instance": state.router.instance_id(),
        "connections": stats.connection_count,
        "rooms": stats.room_count,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (connection_id, mut outbound) = state.router.connect();
    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;

            // Events routed to this connection
            Some(event) = outbound.recv() => {
                if send_event(&mut sender, &event).await.is_err() {
                    break;
                }
            }

            // Frames from the client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_message(text.len(), "inbound");
                        handle_intent(&text, &connection_id, &state, &mut sender).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        // Tolerate JSON arriving in a binary frame
                        match String::from_utf8(data) {
                            Ok(text) => {
                                metrics::record_message(text.len(), "inbound");
                                handle_intent(&text, &connection_id, &state, &mut sender).await;
                            }
                            Err(_) => {
                                warn!(connection = %connection_id, "Ignoring non-UTF-8 binary frame");
                                metrics::record_error("protocol");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    state.router.disconnect(&connection_id).await;

    let stats = state.router.stats();
    metrics::set_active_rooms(stats.room_count);
    metrics::set_users_online(stats.named_count);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Decode and dispatch one inbound intent.
async fn handle_intent(
    text: &str,
    connection_id: &ConnectionId,
    state: &Arc<AppState>,
    sender: &mut SplitSink<WebSocket, Message>,
) {
    let intent = match decode_intent(text) {
        Ok(intent) => intent,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Ignoring malformed intent");
            metrics::record_error("protocol");
            return;
        }
    };

    debug!(connection = %connection_id, intent = intent.name(), "Handling intent");

    let result = match intent {
        ClientIntent::Join { display_name } => {
            state.router.join_identity(connection_id, &display_name).await
        }
        ClientIntent::JoinRoom { room_id } => state.router.join_room(connection_id, &room_id).await,
        ClientIntent::SendMessage { room_id, message } => {
            state
                .router
                .send_message(connection_id, &room_id, &message)
                .await
        }
    };

    match result {
        Ok(()) => {
            let stats = state.router.stats();
            metrics::set_active_rooms(stats.room_count);
            metrics::set_users_online(stats.named_count);
        }
        Err(e @ (BrokerError::NotNamed | BrokerError::EmptyName)) => {
            // Rejection notice to the offending connection only
            warn!(connection = %connection_id, error = %e, "Intent rejected");
            metrics::record_error("intent");
            let _ = send_event(sender, &ServerEvent::system(e.to_string())).await;
        }
        Err(e) => {
            debug!(connection = %connection_id, error = %e, "Intent ignored");
        }
    }
}

/// Encode and send one event to the WebSocket.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<()> {
    let text = encode_event(event)?;
    metrics::record_message(text.len(), "outbound");
    sender.send(Message::Text(text)).await?;
    Ok(())
}
