use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

use crate::error::{DynError, StoreError};
use crate::models::{
    Blob, ConnectionStatus, DevicePatch, DeviceStatus, NewDevice, NewRecording, RecordingPatch,
    Subscription,
};
use crate::monitor::{ConnectionMonitor, MonitorState};
use crate::realtime::RealtimeHub;
use crate::registry::DeviceRegistry;
use crate::store::{RecordingStore, SqliteRecordingStore};
use crate::subscription::{days_remaining, is_active, SubscriptionStore};

/// Shared state of the API handlers
pub struct AppState {
    pub registry: Arc<dyn DeviceRegistry>,
    pub store: Arc<SqliteRecordingStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub hub: RealtimeHub,
    /// Present when this process also runs the connection monitor
    pub monitor: Option<ConnectionMonitor>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/devices", get(list_devices_handler).post(create_device_handler))
        .route(
            "/api/devices/{id}",
            patch(update_device_handler).delete(delete_device_handler),
        )
        .route("/api/devices/{id}/status", put(device_status_handler))
        .route(
            "/api/recordings",
            get(list_recordings_handler).post(create_recording_handler),
        )
        .route(
            "/api/recordings/{id}",
            get(get_recording_handler)
                .patch(update_recording_handler)
                .delete(delete_recording_handler),
        )
        .route("/api/recordings/{id}/file", put(attach_file_handler))
        .route("/api/recordings/{id}/download-url", get(download_url_handler))
        .route("/api/files/{token}", get(file_handler))
        .route("/api/subscription", get(subscription_handler))
        .route("/api/subscription/upgrade", post(upgrade_handler))
        .route("/api/connection", get(connection_handler))
        .route("/api/events", get(events_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on all interfaces until the process is stopped
pub async fn run_server(state: Arc<AppState>, port: u16) -> Result<(), DynError> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("[::]:{}", port))
        .await
        .map_err(|e| format!("Failed to bind to port {}: {}", port, e))?;
    log::info!("API listening on http://[::]:{} (IPv4 + IPv6)", port);
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;
    Ok(())
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(err: StoreError) -> Response {
    let status = match &err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Database(_) | StoreError::Storage(_) => {
            log::error!("API request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_devices_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.registry.list().await {
        Ok(devices) => Json(devices).into_response(),
        Err(e) => error_response(e),
    }
}

async fn create_device_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<NewDevice>,
) -> Response {
    match state.registry.create(data).await {
        Ok(device) => (StatusCode::CREATED, Json(device)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn update_device_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<DevicePatch>,
) -> Response {
    match state.registry.update(&id, patch).await {
        Ok(device) => Json(device).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_device_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.registry.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct StatusBody {
    status: DeviceStatus,
}

async fn device_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Response {
    match state.registry.set_status(&id, body.status).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_recordings_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.list().await {
        Ok(recordings) => Json(recordings).into_response(),
        Err(e) => error_response(e),
    }
}

async fn create_recording_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<NewRecording>,
) -> Response {
    match state.store.create(data, None).await {
        Ok(recording) => (StatusCode::CREATED, Json(recording)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_recording_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get(&id).await {
        Ok(recording) => Json(recording).into_response(),
        Err(e) => error_response(e),
    }
}

async fn update_recording_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<RecordingPatch>,
) -> Response {
    match state.store.update(&id, patch).await {
        Ok(recording) => Json(recording).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_recording_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// Request body is the raw file; its Content-Type is stored alongside
async fn attach_file_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    match state.store.attach_file(&id, Blob::new(body, content_type)).await {
        Ok(recording) => Json(recording).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Serialize)]
struct DownloadUrlResponse {
    url: String,
    expires_in: i64,
}

async fn download_url_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let recording = match state.store.get(&id).await {
        Ok(recording) => recording,
        Err(e) => return error_response(e),
    };
    let Some(file_path) = recording.file_path else {
        return error_response(StoreError::NotFound(format!(
            "recording '{}' has no file",
            id
        )));
    };
    match state.store.download_url(&file_path).await {
        Ok(url) => Json(DownloadUrlResponse {
            url,
            expires_in: state.store.url_ttl().num_seconds(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn file_handler(State(state): State<Arc<AppState>>, Path(token): Path<String>) -> Response {
    match state.store.open_download(&token).await {
        Ok((file_path, data)) => {
            let content_type = if file_path.ends_with(".json") {
                "application/json"
            } else {
                "video/webm"
            };
            let file_name = file_path.rsplit('/').next().unwrap_or(&file_path).to_string();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", file_name),
                    ),
                ],
                data,
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

#[derive(Serialize)]
struct SubscriptionResponse {
    subscription: Option<Subscription>,
    active: bool,
    days_remaining: i64,
}

impl SubscriptionResponse {
    fn new(subscription: Option<Subscription>) -> Self {
        let now = Utc::now();
        Self {
            active: is_active(subscription.as_ref(), now),
            days_remaining: days_remaining(subscription.as_ref(), now),
            subscription,
        }
    }
}

async fn subscription_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.subscriptions.get().await {
        Ok(subscription) => Json(SubscriptionResponse::new(subscription)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn upgrade_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.subscriptions.upgrade().await {
        Ok(subscription) => Json(SubscriptionResponse::new(Some(subscription))).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Serialize)]
struct ConnectionResponse {
    monitoring: bool,
    state: &'static str,
    panic_triggered: bool,
    status: Option<ConnectionStatus>,
}

async fn connection_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = match &state.monitor {
        Some(monitor) => {
            let monitor_state = monitor.state();
            ConnectionResponse {
                monitoring: monitor_state != MonitorState::Idle,
                state: match monitor_state {
                    MonitorState::Idle => "idle",
                    MonitorState::Watching => "watching",
                    MonitorState::PanicTriggered => "panic_triggered",
                },
                panic_triggered: monitor.is_panic_triggered(),
                status: Some(monitor.connection_status()),
            }
        }
        None => ConnectionResponse {
            monitoring: false,
            state: "idle",
            panic_triggered: false,
            status: None,
        },
    };
    Json(response)
}

/// Realtime events as server-sent events; lagging clients skip what they missed
async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.hub.subscribe()).filter_map(|event| {
        let event = event.ok()?;
        let data = serde_json::to_string(&event).ok()?;
        let kind = serde_json::to_value(event.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Some(Ok(Event::default().event(kind).data(data)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
