use axum::{http::{StatusCode, HeaderValue}, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

pub const ERROR_CODE_HEADER: &str = "X-Error-Code";

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub trace_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")] pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub details: Option<Value>,
}

/// Caller-facing error. `details` carries structured context (offending ids, counts)
/// and must never contain raw infrastructure error text.
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: &'static str, trace_id: Option<Uuid>, message: Option<String>, details: Option<Value> },
    NotFound { code: &'static str, trace_id: Option<Uuid>, message: Option<String>, details: Option<Value> },
    Conflict { code: &'static str, trace_id: Option<Uuid>, message: Option<String>, details: Option<Value> },
    Internal { code: &'static str, trace_id: Option<Uuid>, message: Option<String>, details: Option<Value> },
}

impl ApiError {
    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::Internal { code, trace_id: None, message: Some(message.into()), details: None }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::Conflict { code, .. }
            | ApiError::Internal { code, .. } => *code,
        }
    }

    pub fn with_trace_id(mut self, id: Uuid) -> Self {
        match &mut self {
            ApiError::BadRequest { trace_id, .. }
            | ApiError::NotFound { trace_id, .. }
            | ApiError::Conflict { trace_id, .. }
            | ApiError::Internal { trace_id, .. } => *trace_id = Some(id),
        }
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.code();
        let body = match self {
            ApiError::BadRequest { code, trace_id, message, details }
            | ApiError::NotFound { code, trace_id, message, details }
            | ApiError::Conflict { code, trace_id, message, details }
            | ApiError::Internal { code, trace_id, message, details } => {
                ErrorBody { code: code.into(), trace_id, message, details }
            }
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert(ERROR_CODE_HEADER, val);
        }
        resp
    }
}
