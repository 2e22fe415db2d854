use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::fmt;

use crate::pipeline::PipelineStep;
use crate::retry::{ErrorClass, Retryable};
use crate::validation::FieldViolation;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Request payload failed validation. Never reaches the network.
    Validation(Vec<FieldViolation>),
    /// Request body could not be read as JSON.
    BadRequest(String),
    /// A pipeline step failed against the remote API.
    Provisioning(ProvisioningFailure),
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(violations) => {
                write!(f, "Validation failed: ")?;
                for (i, v) in violations.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}: {}", v.field, v.reason)?;
                }
                Ok(())
            }
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Provisioning(failure) => write!(f, "Provisioning error: {}", failure),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Validation problems map to 400 with the full violation list; pipeline
    /// failures map to 500 with the remote message and trace id.
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(violations) => {
                tracing::info!("Rejected request with {} violation(s)", violations.len());
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "success": false,
                        "error": "Validation failed",
                        "violations": violations,
                    })),
                )
                    .into_response()
            }
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "success": false,
                    "error": "Bad request",
                    "details": msg,
                })),
            )
                .into_response(),
            AppError::Provisioning(failure) => {
                tracing::error!("Provisioning failed: {}", failure);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "success": false,
                        "error": failure.summary(),
                        "errorType": failure.error.kind,
                        "step": failure.step,
                        "details": failure.error.message,
                        "fbtrace_id": failure.error.fbtrace_id,
                    })),
                )
                    .into_response()
            }
        }
    }
}

impl From<ProvisioningFailure> for AppError {
    fn from(failure: ProvisioningFailure) -> Self {
        AppError::Provisioning(failure)
    }
}

impl From<Vec<FieldViolation>> for AppError {
    fn from(violations: Vec<FieldViolation>) -> Self {
        AppError::Validation(violations)
    }
}

// ============ Remote API errors ============

/// How the remote API (or the transport) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// Throttled by the remote API.
    RateLimited,
    /// Remote reported a temporary condition (5xx, `is_transient`).
    Transient,
    /// Rejected for a reason retrying will not fix.
    Permanent,
    /// Transport failure: connect, timeout, unreadable body.
    Network,
    /// The pipeline deadline expired before the call finished.
    DeadlineExceeded,
}

impl RemoteErrorKind {
    pub fn class(self) -> ErrorClass {
        match self {
            RemoteErrorKind::RateLimited
            | RemoteErrorKind::Transient
            | RemoteErrorKind::Network => ErrorClass::Transient,
            RemoteErrorKind::Permanent | RemoteErrorKind::DeadlineExceeded => {
                ErrorClass::Permanent
            }
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RemoteErrorKind::RateLimited => "rate limited",
            RemoteErrorKind::Transient => "transient remote error",
            RemoteErrorKind::Permanent => "remote error",
            RemoteErrorKind::Network => "network error",
            RemoteErrorKind::DeadlineExceeded => "deadline exceeded",
        };
        f.write_str(label)
    }
}

/// Failure of a single remote call, with whatever diagnostics the remote supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteApiError {
    pub kind: RemoteErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub code: Option<i64>,
    pub subcode: Option<i64>,
    pub fbtrace_id: Option<String>,
}

impl RemoteApiError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            code: None,
            subcode: None,
            fbtrace_id: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Permanent, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transient, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::RateLimited, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::DeadlineExceeded, message)
    }

    pub fn with_trace_id(mut self, fbtrace_id: impl Into<String>) -> Self {
        self.fbtrace_id = Some(fbtrace_id.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: Option<i64>, subcode: Option<i64>) -> Self {
        self.code = code;
        self.subcode = subcode;
        self
    }
}

impl fmt::Display for RemoteApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(code) = self.code {
            write!(f, " (code {})", code)?;
        }
        if let Some(ref trace) = self.fbtrace_id {
            write!(f, " [fbtrace_id {}]", trace)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteApiError {}

impl Retryable for RemoteApiError {
    fn classify(&self) -> ErrorClass {
        self.kind.class()
    }
}

/// The step that stopped the pipeline and the error it hit.
///
/// Resources created by earlier steps are left in place, paused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisioningFailure {
    pub step: PipelineStep,
    pub error: RemoteApiError,
}

impl ProvisioningFailure {
    pub fn new(step: PipelineStep, error: RemoteApiError) -> Self {
        Self { step, error }
    }

    /// Short human-readable summary, e.g. "Failed to create ad set".
    pub fn summary(&self) -> String {
        format!("Failed to {}", self.step.description())
    }
}

impl fmt::Display for ProvisioningFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.summary(), self.error)
    }
}

impl std::error::Error for ProvisioningFailure {}
