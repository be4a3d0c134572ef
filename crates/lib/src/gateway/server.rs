//! Gateway HTTP + WebSocket server (single port).

use crate::aggregator::Aggregator;
use crate::config::{self, Config};
use crate::dispatch::Dispatcher;
use crate::gateway::protocol::{SurfaceEvent, SurfaceParams};
use crate::gateway::surface::WsSink;
use crate::ingest::Ingestor;
use crate::sinks::SinkRegistry;
use crate::verify::WebhookVerifier;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

const PROTOCOL_VERSION: u32 = 1;

pub(crate) const SHUTDOWN_EVENT_JSON: &str = r#"{"type":"event","event":"shutdown"}"#;

/// Shared state for the gateway (config, sink registry, ingest path).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub registry: Arc<SinkRegistry>,
    pub ingestor: Ingestor,
    /// When Some, webhook requests must carry a valid signature.
    pub verifier: Option<Arc<WebhookVerifier>>,
    /// Broadcasts gateway-wide events (shutdown) to connected surfaces.
    pub event_tx: broadcast::Sender<String>,
}

/// Wire the registry, dispatcher, aggregator and verifier from config.
/// When bind is not loopback, a webhook secret must be configured or this fails.
pub fn build_state(config: Config) -> Result<GatewayState> {
    let secret = config::resolve_webhook_secret(&config);
    let bind = config.gateway.bind.trim();
    if !config::is_loopback_bind(bind) && secret.is_none() {
        anyhow::bail!(
            "refusing to bind gateway to {} without a webhook secret (set webhook.secret or HUDDLE_WEBHOOK_SECRET)",
            bind
        );
    }
    let verifier = match secret {
        Some(s) => Some(Arc::new(
            WebhookVerifier::new(&s, config.webhook.tolerance()).context("loading webhook secret")?,
        )),
        None => {
            log::warn!("no webhook secret configured; accepting unsigned webhooks (loopback only)");
            None
        }
    };

    let registry = Arc::new(SinkRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(registry.clone()));
    let aggregator = Aggregator::new(dispatcher.clone(), config.webhook.debounce());
    let (event_tx, _) = broadcast::channel(16);

    Ok(GatewayState {
        config: Arc::new(config),
        registry,
        ingestor: Ingestor::new(aggregator, dispatcher),
        verifier,
        event_tx,
    })
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/ws", get(ws_handler))
        .route("/webhooks/message", post(webhook_message))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let state = build_state(config)?;
    let bind_addr = format!("{}:{}", state.config.gateway.bind.trim(), state.config.gateway.port);
    log::info!(
        "debounce window {}ms",
        state.ingestor.aggregator().delay().as_millis()
    );

    let shutdown = shutdown_signal(state.clone());
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Delivers any buffered messages, then tells surfaces to close.
async fn shutdown_signal(state: GatewayState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, flushing pending messages");

    state.ingestor.aggregator().flush_now().await;
    let _ = state.event_tx.send(SHUTDOWN_EVENT_JSON.to_string());
}

/// POST /webhooks/message: verifies the signature (when configured), then ingests.
async fn webhook_message(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref verifier) = state.verifier {
        if let Err(e) = verifier.verify(&headers, &body) {
            log::warn!("webhook rejected: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    }
    match state.ingestor.ingest(&body).await {
        Ok(outcome) => {
            log::debug!("webhook accepted: {:?}", outcome);
            StatusCode::NO_CONTENT
        }
        Err(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "protocol": PROTOCOL_VERSION,
        "port": state.config.gateway.port,
        "sinks": state.registry.len().await,
        "pending": state.ingestor.aggregator().pending_len().await,
    }))
}

/// GET /ws?conversationId=..&endUserId=.. upgrades to a surface for one conversation.
async fn ws_handler(
    State(state): State<GatewayState>,
    Query(params): Query<SurfaceParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(mut socket: WebSocket, state: GatewayState, params: SurfaceParams) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = Arc::new(WsSink::new(params.end_user_id.clone(), tx));
    if let Err(e) = state
        .registry
        .register(params.conversation_id.clone(), sink)
        .await
    {
        log::warn!("ws surface rejected: {}", e);
        let err = SurfaceEvent::Error {
            message: e.to_string(),
        };
        let _ = socket.send(Message::Text(err.to_frame())).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    log::info!(
        "ws surface attached to conversation {} as {}",
        params.conversation_id,
        params.end_user_id
    );

    let registered = SurfaceEvent::Registered {
        conversation_id: params.conversation_id.clone(),
        end_user_id: params.end_user_id.clone(),
    };
    let mut event_rx = state.event_tx.subscribe();
    if socket.send(Message::Text(registered.to_frame())).await.is_ok() {
        loop {
            tokio::select! {
                biased;

                delivered = rx.recv() => {
                    let Some(event) = delivered else { break };
                    if socket.send(Message::Text(event.to_frame())).await.is_err() {
                        break;
                    }
                }
                event = event_rx.recv() => {
                    match event {
                        Ok(text) => {
                            let is_shutdown = text == SHUTDOWN_EVENT_JSON;
                            let _ = socket.send(Message::Text(text)).await;
                            if is_shutdown {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::debug!("ws surface lagged {} broadcast messages", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    }
                }
            }
        }
    }

    state.registry.unregister(&params.conversation_id).await;
    log::info!("ws surface detached from conversation {}", params.conversation_id);
}
