use crate::error::AppResult;
use crate::ingest::{CreateRequest, IngestQueue};
use crate::service::{AccessOutcome, SecretService, SubmitRequest, SubmittedSecret};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SecretService>,
    pub ingest: IngestQueue,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Secret creation request body
#[derive(Debug, Deserialize)]
pub struct CreateSecretRequest {
    pub text: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub expire_in_secs: Option<u64>,
}

impl From<CreateSecretRequest> for SubmitRequest {
    fn from(req: CreateSecretRequest) -> Self {
        Self {
            text: req.text,
            prompt: req.prompt,
            answer: req.answer,
            expire_in_secs: req.expire_in_secs,
        }
    }
}

/// Create a secret synchronously
pub async fn create_secret(
    State(state): State<AppState>,
    Json(request): Json<CreateSecretRequest>,
) -> AppResult<Json<SubmittedSecret>> {
    let created = state.service.submit(request.into()).await?;
    Ok(Json(created))
}

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    #[serde(default)]
    pub answer: Option<String>,
}

/// Reveal a secret, or return its challenge prompt.
///
/// The answer, when the reader has one, arrives as a query parameter and is
/// threaded all the way into the store's validate-and-consume step.
pub async fn reveal_secret(
    Path(id): Path<String>,
    Query(query): Query<AccessQuery>,
    State(state): State<AppState>,
) -> AppResult<Json<serde_json::Value>> {
    match state.service.access(&id, query.answer.as_deref()).await? {
        AccessOutcome::Revealed { text } => Ok(Json(json!({ "text": text }))),
        AccessOutcome::ChallengeRequired { prompt } => {
            Ok(Json(json!({ "challenge": true, "prompt": prompt })))
        }
    }
}

/// Producer-facing endpoint: enqueue a creation request and return
/// immediately. The created id is not reported here; producers needing it
/// attach a reply channel on the queue side instead.
pub async fn enqueue_secret(
    State(state): State<AppState>,
    Json(request): Json<CreateSecretRequest>,
) -> AppResult<impl IntoResponse> {
    let request = CreateRequest::new(request.into());
    let request_id = request.request_id;
    state.ingest.enqueue(request)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "request_id": request_id })),
    ))
}

/// Create the web router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/secrets", post(create_secret))
        .route("/api/secrets/{id}", get(reveal_secret))
        .route("/api/ingest", post(enqueue_secret))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
