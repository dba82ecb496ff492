use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use courier_blob::{BlobError, BlobStore};
use courier_contract::{
    DownloadError, IdentityProvider, Session, Transfer, TransferError, TransferEvent,
    TransferRequest, TransferResponse,
};
use courier_storage::RecordStore;
use courier_transfer::{OrchestratorConfig, TransferOrchestrator, TransferQueryService};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, warn};

/// Slack on top of the base64-expanded payload for the JSON envelope.
const ENVELOPE_SLACK_BYTES: usize = 64 * 1024;

const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseUpdate {
    pub event_type: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct SendTransferRequest {
    pub recipient_email: String,
    pub file_name: String,
    pub file_type: Option<String>,
    pub payload_base64: String,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: TransferOrchestrator,
    pub queries: TransferQueryService,
    pub records: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub sse_bus: broadcast::Sender<SseUpdate>,
    pub max_object_bytes: u64,
}

impl AppState {
    /// Must be called inside a tokio runtime; spawns the event relay.
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        identity: Arc<dyn IdentityProvider>,
        transfers: OrchestratorConfig,
        max_object_bytes: u64,
    ) -> Self {
        let (sse_bus, _) = broadcast::channel(256);
        let orchestrator = TransferOrchestrator::new(blobs.clone(), records.clone(), transfers);
        let queries = TransferQueryService::new(records.clone());

        let state = Self {
            orchestrator,
            queries,
            records,
            blobs,
            identity,
            sse_bus,
            max_object_bytes,
        };
        state.spawn_event_relay();
        state
    }

    fn spawn_event_relay(&self) {
        let mut events = self.orchestrator.subscribe();
        let bus = self.sse_bus.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => publish(&bus, &event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event relay lagged behind orchestrator");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn body_limit(&self) -> usize {
        let encoded = self.max_object_bytes.saturating_mul(4) / 3 + 4;
        usize::try_from(encoded)
            .unwrap_or(usize::MAX)
            .saturating_add(ENVELOPE_SLACK_BYTES)
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.body_limit();
    Router::new()
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/v1/transfers", post(post_transfer))
        .route("/v1/transfers/sent", get(get_sent_transfers))
        .route("/v1/transfers/received", get(get_received_transfers))
        .route("/v1/transfers/{transfer_id}/download", get(get_download))
        .route("/v1/notifications/unread", get(get_unread_notifications))
        .route(
            "/v1/notifications/{notification_id}/read",
            post(mark_notification_read),
        )
        .route("/v1/events/stream", get(stream_events))
        .route("/blobs/{*key}", get(get_blob))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health_live() -> impl IntoResponse {
    Json(json!({
        "status": "live",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let records_ready = state.records.ping().await.is_ok();
    let blobs_ready = state.blobs.ensure_ready().await.is_ok();
    let ready = records_ready && blobs_ready;
    let payload = Json(json!({
        "status": if ready { "ready" } else { "degraded" },
        "records": records_ready,
        "blobs": blobs_ready,
        "timestamp": Utc::now().to_rfc3339()
    }));

    if ready {
        (StatusCode::OK, payload).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, payload).into_response()
    }
}

async fn post_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SendTransferRequest>,
) -> impl IntoResponse {
    let session = resolve_session(&state, &headers).await;

    if session.is_some() {
        if !looks_like_email(&payload.recipient_email) {
            return rejected("invalid recipient email");
        }
        if payload.file_name.trim().is_empty() {
            return rejected("file name is required");
        }
    }

    let bytes = match BASE64.decode(payload.payload_base64.as_bytes()) {
        Ok(decoded) => Bytes::from(decoded),
        Err(_) if session.is_none() => Bytes::new(),
        Err(err) => return rejected(&format!("invalid payload_base64: {err}")),
    };

    let request = TransferRequest {
        recipient_email: payload.recipient_email.trim().to_string(),
        file_name: payload.file_name,
        file_size: bytes.len() as u64,
        file_type: payload
            .file_type
            .unwrap_or_else(|| OCTET_STREAM.to_string()),
        bytes,
    };

    // Runs on its own task so a client disconnect cannot stop it between
    // upload and record insert. The compensation handle, if any, is detached.
    let orchestrator = state.orchestrator.clone();
    let task = tokio::spawn(async move {
        orchestrator
            .initiate_transfer(session.as_ref(), request)
            .await
    });
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(join_error) => {
            error!(error = %join_error, "transfer task did not finish");
            let result: Result<Transfer, TransferError> = Err(TransferError::Unknown(format!(
                "transfer task did not finish: {join_error}"
            )));
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TransferResponse::from(&result)),
            );
        }
    };

    let status = match &outcome.result {
        Ok(_) => StatusCode::CREATED,
        Err(err) => failure_status(err),
    };
    (status, Json(outcome.to_response()))
}

async fn get_sent_transfers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let session = require_session(&state, &headers).await?;
    let transfers = state.queries.get_sent_transfers(&session).await;
    Ok((StatusCode::OK, Json(json!({ "items": transfers }))))
}

async fn get_received_transfers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let session = require_session(&state, &headers).await?;
    let transfers = state.queries.get_received_transfers(&session.email).await;
    Ok((StatusCode::OK, Json(json!({ "items": transfers }))))
}

async fn get_unread_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let session = require_session(&state, &headers).await?;
    let notifications = state.queries.get_unread_notifications(&session.email).await;
    Ok((StatusCode::OK, Json(json!({ "items": notifications }))))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(notification_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    require_session(&state, &headers).await?;
    if state.queries.mark_notification_read(&notification_id).await {
        publish(
            &state.sse_bus,
            &TransferEvent::NotificationRead {
                notification_id: notification_id.clone(),
            },
        );
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn get_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(transfer_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    require_session(&state, &headers).await?;
    match state.queries.resolve_download_location(&transfer_id).await {
        Ok(url) => Ok((StatusCode::OK, Json(json!({ "url": url })))),
        Err(DownloadError::NotFound) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error":"transfer_not_found"})),
        )),
        Err(DownloadError::Unavailable) => Err((
            StatusCode::CONFLICT,
            Json(json!({"error":"file_url_unavailable"})),
        )),
    }
}

async fn get_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    match state.blobs.fetch(&key).await {
        Ok(bytes) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, OCTET_STREAM)],
            bytes,
        )),
        Err(BlobError::NotFound(_)) | Err(BlobError::InvalidKey(_)) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error":"object_not_found"})),
        )),
        Err(err) => Err(internal_error(err.into())),
    }
}

async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    let receiver = state.sse_bus.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|item| async move {
        match item {
            Ok(update) => {
                let data = serde_json::to_string(&update.data).unwrap_or_else(|_| "{}".to_string());
                Some(Ok(SseEvent::default().event(update.event_type).data(data)))
            }
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)))
}

async fn resolve_session(state: &AppState, headers: &HeaderMap) -> Option<Session> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))?;
    state.identity.resolve(token.trim()).await
}

async fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Session, (StatusCode, Json<Value>)> {
    resolve_session(state, headers).await.ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"invalid_or_missing_bearer_token"})),
        )
    })
}

fn failure_status(error: &TransferError) -> StatusCode {
    match error {
        TransferError::Unauthenticated => StatusCode::UNAUTHORIZED,
        TransferError::UploadFailed(_) | TransferError::RecordFailed(_) => StatusCode::BAD_GATEWAY,
        TransferError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn rejected(reason: &str) -> (StatusCode, Json<TransferResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(TransferResponse {
            success: false,
            transfer: None,
            error: Some(reason.to_string()),
        }),
    )
}

/// Shape check only; deliverability is not verified.
fn looks_like_email(candidate: &str) -> bool {
    let candidate = candidate.trim();
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !candidate.chars().any(char::is_whitespace)
}

fn internal_error(error: anyhow::Error) -> (StatusCode, Json<Value>) {
    error!(error = %error, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal_error", "detail": error.to_string() })),
    )
}

fn publish(bus: &broadcast::Sender<SseUpdate>, event: &TransferEvent) {
    let data = serde_json::to_value(event).unwrap_or_else(|_| json!({}));
    info!(event_type = event.event_type(), "publishing transfer event");
    let _ = bus.send(SseUpdate {
        event_type: event.event_type().to_string(),
        data,
    });
}

#[cfg(test)]
mod tests {
    use super::looks_like_email;

    #[test]
    fn email_shape_check() {
        assert!(looks_like_email("bob@example.com"));
        assert!(looks_like_email("  bob@example.com "));
        for bad in ["", "bob", "@example.com", "bob@", "bob@example", "bob@@example.com", "b ob@example.com", "bob@.com"] {
            assert!(!looks_like_email(bad), "{bad:?}");
        }
    }
}
