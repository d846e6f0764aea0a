use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::coordinator::Coordinator;
use crate::decision::{Interaction, Outcome};
use crate::error::{RelayError, Result};

use super::{BindRequest, BindResponse, ErrorBody, LifecycleEvent, LivenessResponse};

/// Error wrapper mapping the relay taxonomy onto HTTP statuses.
pub struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RelayError::RequestNotFound { .. } => StatusCode::NOT_FOUND,
            RelayError::InvalidTransition { .. } => StatusCode::CONFLICT,
            RelayError::InvalidEvent { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            status: "error".into(),
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
            )
        })
        .on_response(|response: &Response, latency: Duration, _span: &tracing::Span| {
            tracing::debug!(
                status = response.status().as_u16(),
                latency_ms = latency.as_millis() as u64,
                "http request completed"
            );
        });

    Router::new()
        .route("/health", get(health))
        .route("/api/pending/{id}/process", post(process_pending))
        .route("/api/pending/{id}/resolve", post(resolve_pending))
        .route("/api/events", post(post_event))
        .route("/api/bindings", post(bind))
        .route("/api/bindings/{target}", delete(unbind))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/{id}/alive", get(session_alive))
        .layer(Extension(coordinator))
        .layer(trace_layer)
}

/// Bind the loopback listener.
pub async fn bind_listener(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpListener::bind(addr).await.map_err(|e| RelayError::Ipc {
        reason: format!("failed to bind {addr}: {e}"),
    })
}

/// Serve the API until the listener fails.
pub async fn serve(coordinator: Arc<Coordinator>, listener: TcpListener) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "http api listening");
    }
    axum::serve(listener, router(coordinator))
        .await
        .map_err(|e| RelayError::Ipc {
            reason: format!("http server failed: {e}"),
        })
}

#[tracing::instrument(level = "debug", skip_all)]
async fn health(Extension(coordinator): Extension<Arc<Coordinator>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "prompts": coordinator.mirrors().len(),
        "sessions": coordinator.sessions().list().len(),
    }))
}

/// Accept immediately and render in the background; the hook never waits
/// on the channel.
#[tracing::instrument(level = "info", skip_all)]
async fn process_pending(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    // Surface a bad id now rather than inside the spawned task.
    coordinator.store().read(&id)?;
    tokio::spawn(async move {
        if let Err(e) = coordinator.process_pending(&id).await {
            tracing::warn!(request_id = %id, error = %e, "failed to process pending request");
        }
    });
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted" })),
    ))
}

#[tracing::instrument(level = "info", skip_all)]
async fn resolve_pending(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Path(id): Path<String>,
    Json(interaction): Json<Interaction>,
) -> ApiResult<Json<Outcome>> {
    // A missing file is a 404 here; the resolver itself reports it as expired.
    coordinator.store().read(&id)?;
    Ok(Json(coordinator.resolve_by_id(&id, interaction).await?))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn post_event(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Json(event): Json<LifecycleEvent>,
) -> (StatusCode, Json<serde_json::Value>) {
    tokio::spawn(async move {
        let target = event.terminal_target.as_deref();
        if let Err(e) = coordinator.handle_event(&event.event, target).await {
            tracing::warn!(event = event.event.name(), error = %e, "lifecycle event failed");
        }
    });
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted" })),
    )
}

#[tracing::instrument(level = "info", skip_all)]
async fn bind(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Json(request): Json<BindRequest>,
) -> ApiResult<Json<BindResponse>> {
    let sessions = coordinator.sessions();
    let target = if let Some(target) = request.target.clone() {
        Some(target)
    } else if let Some(session_id) = request.session_id.as_deref() {
        sessions.get(session_id).and_then(|s| s.terminal_target)
    } else if let Some(cwd) = request.cwd.as_deref() {
        sessions.find_by_cwd(cwd).and_then(|s| s.terminal_target)
    } else {
        return Err(RelayError::InvalidEvent {
            reason: "bind needs a target, session_id or cwd".into(),
        }
        .into());
    };
    let Some(target) = target else {
        return Err(RelayError::NoRoute {
            session_id: request
                .session_id
                .or(request.cwd)
                .unwrap_or_default(),
        }
        .into());
    };

    coordinator.bindings().bind(&target, request.chat_id);
    tracing::info!(%target, chat_id = request.chat_id, "target bound");
    Ok(Json(BindResponse {
        target,
        chat_id: request.chat_id,
    }))
}

#[tracing::instrument(level = "info", skip_all)]
async fn unbind(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Path(target): Path<String>,
) -> Json<serde_json::Value> {
    let removed = coordinator.bindings().unbind(&target).is_some();
    Json(serde_json::json!({ "status": if removed { "ok" } else { "not_found" } }))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_sessions(
    Extension(coordinator): Extension<Arc<Coordinator>>,
) -> Json<Vec<crate::session::SessionRecord>> {
    Json(coordinator.sessions().list())
}

#[tracing::instrument(level = "debug", skip_all)]
async fn session_alive(
    Extension(coordinator): Extension<Arc<Coordinator>>,
    Path(id): Path<String>,
) -> Json<LivenessResponse> {
    let record = coordinator.sessions().get(&id);
    let terminal_target = record.as_ref().and_then(|r| r.terminal_target.clone());
    let alive = match terminal_target.as_deref() {
        Some(target) => coordinator.target_exists(target).await,
        None => false,
    };
    Json(LivenessResponse {
        session_id: id,
        known: record.is_some(),
        alive,
        terminal_target,
    })
}
