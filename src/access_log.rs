//! Structured access and error events.
//!
//! Events share one shape, `{phase, request_id, client_ip, method, path, status?, detail?}`, and
//! are emitted under the tracing target `access`, so a subscriber can route them separately from
//! diagnostic output. The HTTP middleware (or [`track_call`] for other callers) emits `incoming`
//! and `completed`; the pipeline emits `error` once per failed request. Nothing here affects control flow.

use crate::pipeline::{PipelineError, PipelineResult};
use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, Method, Uri},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Target used for every access event.
pub const ACCESS_TARGET: &str = "access";

const FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN_CLIENT: &str = "unknown";

/// Lifecycle phase of an access event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPhase {
    /// Request arrived.
    Incoming,
    /// Response produced (any status).
    Completed,
    /// Pipeline failed; carries the classified error.
    Error,
}

impl AccessPhase {
    /// Stable field value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Who asked for what. Travels with the request through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Correlates the events of one request.
    pub request_id: Uuid,
    /// Caller address, proxy-aware.
    pub client_ip: String,
    /// HTTP method, or the invoking tool for non-HTTP callers.
    pub method: String,
    /// Request path, or the input name for non-HTTP callers.
    pub path: String,
}

impl RequestContext {
    /// Build a context with a fresh request id.
    pub fn new(
        client_ip: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            client_ip: client_ip.into(),
            method: method.into(),
            path: path.into(),
        }
    }

    /// Derive a context from HTTP request parts.
    ///
    /// The client IP is the first `X-Forwarded-For` entry when present, otherwise the socket peer.
    pub fn from_http(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        method: &Method,
        uri: &Uri,
    ) -> Self {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let client_ip = forwarded
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
        Self::new(client_ip, method.as_str(), uri.path())
    }
}

/// Record the arrival of a request.
pub fn log_incoming(context: &RequestContext) {
    tracing::info!(
        target: ACCESS_TARGET,
        phase = AccessPhase::Incoming.as_str(),
        request_id = %context.request_id,
        client_ip = %context.client_ip,
        method = %context.method,
        path = %context.path,
        "Incoming request"
    );
}

/// Record the response status for a request.
pub fn log_completed(context: &RequestContext, status: u16, elapsed: Duration) {
    tracing::info!(
        target: ACCESS_TARGET,
        phase = AccessPhase::Completed.as_str(),
        request_id = %context.request_id,
        client_ip = %context.client_ip,
        method = %context.method,
        path = %context.path,
        status,
        elapsed_ms = elapsed.as_millis() as u64,
        "Completed request"
    );
}

/// Record a pipeline failure with its full internal detail.
///
/// Client errors are logged at `warn`, internal errors at `error`.
pub fn log_failure(context: &RequestContext, error: &PipelineError) {
    let kind = error.detail_kind();
    let status = error.status_code();
    let detail = error.to_string();
    if kind.is_client_error() {
        tracing::warn!(
            target: ACCESS_TARGET,
            phase = AccessPhase::Error.as_str(),
            request_id = %context.request_id,
            client_ip = %context.client_ip,
            method = %context.method,
            path = %context.path,
            status,
            error_kind = %kind,
            detail = %detail,
            "Request rejected"
        );
    } else {
        tracing::error!(
            target: ACCESS_TARGET,
            phase = AccessPhase::Error.as_str(),
            request_id = %context.request_id,
            client_ip = %context.client_ip,
            method = %context.method,
            path = %context.path,
            status,
            error_kind = %kind,
            detail = %detail,
            "Request failed"
        );
    }
}

/// Emit `incoming` and `completed` around a pipeline call made outside HTTP.
///
/// Successful calls complete with status 200, failures with their mapped status.
pub async fn track_call<F>(context: &RequestContext, call: F) -> PipelineResult
where
    F: Future<Output = PipelineResult>,
{
    log_incoming(context);
    let started = Instant::now();
    let result = call.await;
    let status = result
        .as_ref()
        .map_or_else(PipelineError::status_code, |_| 200);
    log_completed(context, status, started.elapsed());
    result
}

/// Axum middleware that emits `incoming`/`completed` events and attaches a [`RequestContext`].
pub async fn track_requests(mut request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let context =
        RequestContext::from_http(request.headers(), peer, request.method(), request.uri());
    log_incoming(&context);
    request.extensions_mut().insert(context.clone());

    let started = Instant::now();
    let response = next.run(request).await;
    log_completed(&context, response.status().as_u16(), started.elapsed());
    response
}
