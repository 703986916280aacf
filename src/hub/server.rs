//! HTTP/WebSocket surface: `/ws/votes/:poll_id` for live tally fan-out, plus `/metrics` and
//! `/healthz` served from the same router.

use super::Hub;
use crate::metrics::ProcessorMetrics;
use crate::model::encode_tally;
use crate::store::VoteStore;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub store: Arc<dyn VoteStore>,
    pub metrics: Arc<ProcessorMetrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/votes/:poll_id", get(ws_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler(
    Path(poll_id): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if poll_id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "poll_id must not be empty").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, poll_id, state))
}

async fn handle_socket(mut socket: WebSocket, poll_id: String, state: AppState) {
    let snapshot = match state.store.get_results(&poll_id).await {
        Ok(tally) => tally,
        Err(e) => {
            warn!(poll_id = %poll_id, error = %e, "could not load initial tally snapshot");
            Default::default()
        }
    };
    if let Ok(bytes) = encode_tally(&snapshot) {
        match String::from_utf8(bytes) {
            Ok(text) => {
                if socket.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!(poll_id = %poll_id, error = %e, "encoded tally was not valid utf-8"),
        }
    }

    let mut subscription = state.hub.subscribe(poll_id.clone()).await;
    debug!(poll_id = %poll_id, "subscriber joined");

    loop {
        tokio::select! {
            broadcast = subscription.recv() => {
                match broadcast {
                    Some(payload) => match String::from_utf8(payload) {
                        Ok(text) => {
                            if socket.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(poll_id = %poll_id, error = %e, "broadcast payload was not valid utf-8");
                        }
                    },
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }
    debug!(poll_id = %poll_id, "subscriber left");
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}
