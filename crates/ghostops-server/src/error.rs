//! Unified error type for HTTP responses.
//!
//! Errors flow through `anyhow` and are downcast at the edge: denials map to
//! 401/403 with their stable reason code, collaborator faults to 502/504,
//! configuration faults to 500, input problems to 400. Bodies are
//! `{ "ok": false, "error": ..., "reason"?: ..., "debug"?: ... }` and never
//! leak secrets or backtraces.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ghostops_core::DenyReason;
use serde_json::{json, Value};

use crate::collaborators::UpstreamError;
use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// Sentinel error types carried through the anyhow chain
// ---------------------------------------------------------------------------

/// An authorization denial with its machine-readable reason.
#[derive(Debug)]
pub struct Denied {
    pub reason: DenyReason,
    pub message: String,
    pub debug: Option<Value>,
}

impl Denied {
    pub fn new(reason: DenyReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: Value) -> Self {
        self.debug = Some(debug);
        self
    }
}

impl std::fmt::Display for Denied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.reason)
    }
}

impl std::error::Error for Denied {}

/// A malformed request, rejected before any collaborator is consulted.
#[derive(Debug)]
struct BadInput(String);

impl std::fmt::Display for BadInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadInput {}

/// Both generation attempts ran out the per-attempt clock.
#[derive(Debug)]
pub struct GenerationTimedOut {
    pub timeout_ms: u64,
    pub retried: bool,
}

impl std::fmt::Display for GenerationTimedOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "generation timed out after {}ms", self.timeout_ms)
    }
}

impl std::error::Error for GenerationTimedOut {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// 400 with a field-level message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadInput(msg.into()).into())
    }

    /// 401 (or 403 for quota) with a stable reason code.
    pub fn denied(denied: Denied) -> Self {
        Self(denied.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(b) = self.0.downcast_ref::<BadInput>() {
            let body = json!({ "ok": false, "error": b.0 });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }

        if let Some(d) = self.0.downcast_ref::<Denied>() {
            let status = if d.reason.is_quota() {
                StatusCode::FORBIDDEN
            } else {
                StatusCode::UNAUTHORIZED
            };
            let mut body = json!({
                "ok": false,
                "error": d.message,
                "reason": d.reason,
            });
            if let Some(debug) = &d.debug {
                body["debug"] = debug.clone();
            }
            return (status, axum::Json(body)).into_response();
        }

        if let Some(t) = self.0.downcast_ref::<GenerationTimedOut>() {
            let body = json!({
                "ok": false,
                "error": "The generation engine did not answer in time. Your session was not charged; please retry.",
                "debug": { "timeoutMs": t.timeout_ms, "retried": t.retried },
            });
            return (StatusCode::GATEWAY_TIMEOUT, axum::Json(body)).into_response();
        }

        if let Some(u) = self.0.downcast_ref::<UpstreamError>() {
            tracing::warn!(error = %u, "collaborator failure");
            let body = json!({ "ok": false, "error": u.to_string() });
            return (StatusCode::BAD_GATEWAY, axum::Json(body)).into_response();
        }

        if self.0.downcast_ref::<ConfigError>().is_some() {
            tracing::error!(error = %self.0, "configuration fault");
            let body = json!({ "ok": false, "error": "Server configuration is incomplete." });
            return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response();
        }

        tracing::error!(error = %self.0, "unhandled error");
        let body = json!({ "ok": false, "error": "An internal error occurred." });
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
