//! Error types for the backend client and the progress tracker.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Field name → messages, as returned by the backend on 400 responses.
/// Non-field messages (`detail`, `non_field_errors`) are kept under their own key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(pub BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Parse the backend's error body. Accepts `{"field": ["msg", ...]}`,
    /// `{"field": "msg"}`, `{"detail": "msg"}` and bare strings.
    pub fn from_body(body: &str) -> Self {
        let mut errors = FieldErrors::new();
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => {
                for (field, value) in map {
                    match value {
                        Value::Array(items) => {
                            for item in items {
                                match item {
                                    Value::String(s) => errors.push(&field, s),
                                    other => errors.push(&field, other.to_string()),
                                }
                            }
                        }
                        Value::String(s) => errors.push(field, s),
                        other => errors.push(field, other.to_string()),
                    }
                }
            }
            Ok(Value::String(s)) => errors.push("detail", s),
            _ => {
                let trimmed = body.trim();
                if !trimmed.is_empty() {
                    errors.push("detail", trimmed);
                }
            }
        }
        errors
    }

    /// All messages joined for a single inline line.
    pub fn summary(&self) -> String {
        self.0
            .values()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never completed (DNS, connect, timeout, TLS)
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("not signed in or session expired")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed: {}", .0.summary())]
    Validation(FieldErrors),

    #[error("not found")]
    NotFound,

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Map a non-success response to the error taxonomy.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 => ApiError::Validation(FieldErrors::from_body(&body)),
            401 => ApiError::Unauthorized,
            403 => {
                let errors = FieldErrors::from_body(&body);
                let message = if errors.is_empty() {
                    "forbidden".to_string()
                } else {
                    errors.summary()
                };
                ApiError::Forbidden(message)
            }
            404 => ApiError::NotFound,
            code => ApiError::Status { status: code, body },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Short message suitable for inline display next to the failed action.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Transport(_) => "Could not reach the server. Please try again.".into(),
            ApiError::Unauthorized => "Please sign in again.".into(),
            ApiError::Forbidden(m) => m.clone(),
            ApiError::Validation(errors) if !errors.is_empty() => errors.summary(),
            ApiError::Validation(_) => "The request was rejected.".into(),
            ApiError::NotFound => "Not found.".into(),
            ApiError::Status { .. } | ApiError::Decode(_) => {
                "Something went wrong on the server.".into()
            }
            ApiError::InvalidRequest(m) => m.clone(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// What the progress tracker reports upward. Cloneable so every caller
/// coalesced into one write receives the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("session expired, sign in again")]
    Unauthorized,

    #[error("progress not saved: {0}")]
    NotSaved(String),

    #[error("progress saved but library refresh failed: {0}")]
    RefreshFailed(String),

    #[error("reconciliation interrupted")]
    Interrupted,
}

impl SyncError {
    pub(crate) fn on_write(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => SyncError::Unauthorized,
            other => SyncError::NotSaved(other.user_message()),
        }
    }

    pub(crate) fn on_refresh(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => SyncError::Unauthorized,
            other => SyncError::RefreshFailed(other.user_message()),
        }
    }
}
