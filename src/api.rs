//! HTTP surface for docvec.
//!
//! - `POST /embed`: submit a document as `application/json` (`{"text": "..."}`), `text/plain`,
//!   or `application/pdf`; returns `num_chunks`, `chunk_embedding_shape`, and the
//!   `document_embedding`.
//! - `POST /convert-text`: older name of `/embed`, kept for existing clients.
//! - `GET /health`: loaded model, vector width, token window, and worker count.
//! - `GET /metrics`: document, chunk, and failure counters.
//!
//! Failures answer `{"detail": "..."}` with 400 for bad input, 415 for unsupported media types,
//! and 500 for everything else. Every request passes through the access-log middleware.

use crate::access_log::{RequestContext, track_requests};
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{DocumentRequest, ModelInfo, PipelineApi, PipelineError, PipelineOutcome};
use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;

/// Build the HTTP router exposing the embedding API surface.
pub fn create_router<S>(service: Arc<S>, max_body_bytes: usize) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/embed", post(embed_document::<S>))
        .route("/convert-text", post(embed_document::<S>))
        .route("/health", get(get_health::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn(track_requests))
        .with_state(service)
}

/// Success response for `POST /embed`.
#[derive(Debug, Serialize)]
struct EmbedResponse {
    /// Number of chunks the document was split into.
    num_chunks: usize,
    /// `[num_chunks, dimension]`.
    chunk_embedding_shape: [usize; 2],
    /// Mean of all chunk vectors.
    document_embedding: Vec<f32>,
}

impl From<PipelineOutcome> for EmbedResponse {
    fn from(outcome: PipelineOutcome) -> Self {
        Self {
            num_chunks: outcome.num_chunks,
            chunk_embedding_shape: outcome.chunk_embedding_shape(),
            document_embedding: outcome.document_embedding.values,
        }
    }
}

/// Embed a whole document.
///
/// The declared `Content-Type` is handed to the pipeline untouched; it decides whether the type
/// is supported.
async fn embed_document<S>(
    State(service): State<Arc<S>>,
    Extension(context): Extension<RequestContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EmbedResponse>, AppError>
where
    S: PipelineApi,
{
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let outcome = service
        .embed_document(DocumentRequest::new(content_type, body), &context)
        .await?;
    Ok(Json(outcome.into()))
}

/// Report the loaded model.
async fn get_health<S>(State(service): State<Arc<S>>) -> Json<HealthResponse>
where
    S: PipelineApi,
{
    Json(HealthResponse {
        status: "ok",
        model: service.model_info(),
    })
}

/// Response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(flatten)]
    model: ModelInfo,
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: PipelineApi,
{
    Json(service.metrics_snapshot())
}

/// Error body shared by all failures.
#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

struct AppError(PipelineError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            detail: self.0.public_detail(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self(inner)
    }
}
