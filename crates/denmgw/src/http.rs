//! HTTP ingress and WebSocket egress on one router.
//!
//! `POST /denm` publishes accepted envelopes on the bus; `GET /denm`
//! upgrades to a WebSocket that receives every inbound DENM as a text
//! frame. `/api-docs` and `/swagger.json` document the POST schema.

use crate::bus::{EventBus, TOPIC_DENM_INCOMING, TOPIC_DENM_OUTGOING};
use crate::metrics::{record_http_request, update_ws_observers};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Per-connection outbound frame queue depth.
const WS_SEND_QUEUE: usize = 64;

const API_DOCS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>DENM Service API Documentation</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@4/swagger-ui.css">
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@4/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: "/swagger.json",
                dom_id: '#swagger-ui'
            });
        }
    </script>
</body>
</html>"#;

/// Mutex-guarded set of open WebSocket connections, keyed by an id handed
/// out at upgrade time. Holds only the send side; the socket itself lives
/// in its connection task.
#[derive(Default)]
pub struct WsRegistry {
    connections: Mutex<BTreeMap<u64, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

impl WsRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, tx: mpsc::Sender<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.lock().expect("ws registry mutex poisoned");
        connections.insert(id, tx);
        update_ws_observers(connections.len());
        id
    }

    fn remove(&self, id: u64) {
        let mut connections = self.connections.lock().expect("ws registry mutex poisoned");
        if connections.remove(&id).is_some() {
            update_ws_observers(connections.len());
        }
    }

    /// Queues one text frame to every open connection, in registration
    /// order. A connection that cannot keep up has the frame dropped.
    pub fn broadcast(&self, frame: &str) {
        let connections = self
            .connections
            .lock()
            .expect("ws registry mutex poisoned");
        for (id, tx) in connections.iter() {
            if tx.try_send(frame.to_string()).is_err() {
                warn!(id = *id, "dropping frame for slow WebSocket client");
            }
        }
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections
            .lock()
            .expect("ws registry mutex poisoned")
            .len()
    }

    /// Returns `true` if no connection is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared state behind the router.
#[derive(Clone)]
pub struct HttpState {
    /// The process event bus.
    pub bus: Arc<EventBus>,
    /// Open WebSocket connections.
    pub ws: Arc<WsRegistry>,
}

/// Subscribes the WebSocket fan-out to `denm.incoming`: each event is
/// serialized once and queued to every open connection.
pub fn subscribe_fanout(bus: &EventBus, registry: Arc<WsRegistry>) {
    bus.subscribe(TOPIC_DENM_INCOMING, move |payload| {
        let registry = Arc::clone(&registry);
        Box::pin(async move {
            registry.broadcast(&payload.to_string());
            Ok(())
        })
    });
}

/// Builds the service router.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api-docs", get(api_docs))
        .route("/swagger.json", get(swagger_json))
        .route("/denm", post(submit_denm).get(ws_upgrade))
        .with_state(state)
}

/// Serves the router until the process shuts down.
///
/// # Errors
///
/// Returns an error if serving fails.
pub async fn serve(listener: tokio::net::TcpListener, state: HttpState) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("HTTP server listening on {}", local_addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn api_docs() -> Html<&'static str> {
    Html(API_DOCS_HTML)
}

async fn swagger_json() -> Json<Value> {
    Json(json!({
        "openapi": "3.0.0",
        "info": {
            "title": "DENM Service API Documentation",
            "version": "1.0.0",
            "description": "API for sending DENM messages via AMQP",
        },
        "paths": {
            "/denm": {
                "post": {
                    "summary": "Send a DENM message",
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "object",
                                    "required": [
                                        "publisherId",
                                        "originatingCountry",
                                        "latitude",
                                        "longitude",
                                        "data",
                                    ],
                                    "properties": {
                                        "publisherId": { "type": "string" },
                                        "publicationId": { "type": "string" },
                                        "originatingCountry": { "type": "string" },
                                        "protocolVersion": { "type": "string" },
                                        "latitude": { "type": "number" },
                                        "longitude": { "type": "number" },
                                        "quadTree": { "type": "string" },
                                        "shardId": { "type": "integer" },
                                        "shardCount": { "type": "integer" },
                                        "timestamp": { "type": "string" },
                                        "relation": { "type": "string" },
                                        "data": { "type": "object" },
                                    },
                                },
                            },
                        },
                    },
                    "responses": {
                        "200": {
                            "description": "DENM message sent successfully",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "status": { "type": "string" },
                                        },
                                    },
                                },
                            },
                        },
                        "400": {
                            "description": "Invalid request",
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "error": { "type": "string" },
                                        },
                                    },
                                },
                            },
                        },
                    },
                },
            },
        },
    }))
}

async fn submit_denm(State(state): State<HttpState>, body: String) -> Response {
    let Ok(parsed) = serde_json::from_str::<Value>(&body) else {
        record_http_request("invalid_json");
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Invalid JSON"}))).into_response();
    };
    debug!(body = %parsed, "parsed DENM submission");

    match state.bus.publish(TOPIC_DENM_OUTGOING, parsed).await {
        Ok(()) => {
            record_http_request("success");
            (StatusCode::OK, Json(json!({"status": "success"}))).into_response()
        }
        Err(e) => {
            error!(error = %e, "error processing DENM request");
            record_http_request("rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

async fn ws_upgrade(State(state): State<HttpState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state.ws))
}

async fn handle_ws(socket: WebSocket, registry: Arc<WsRegistry>) {
    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(WS_SEND_QUEUE);
    let id = registry.insert(frame_tx);
    info!(id, "WebSocket connection opened");

    let (mut ws_tx, mut ws_rx) = socket.split();
    loop {
        tokio::select! {
            frame = frame_rx.recv() => match frame {
                Some(text) => {
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    debug!(id, %text, "received WS message");
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(id, error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    registry.remove(id);
    info!(id, "WebSocket connection closed");
}
