//! Standard JSON envelopes shared by every route.
//!
//! Success: `{ success: true, data, meta }`.
//! Failure: `{ success: false, error, details, meta }` with 400 / 502 / 500.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::okx::OkxError;

/// Request metadata attached to every envelope
pub fn build_meta(extra: Value) -> Value {
    let mut meta = Map::new();
    meta.insert(
        "timestamp".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    meta.insert("requestId".to_string(), Value::String(Uuid::new_v4().to_string()));
    if let Value::Object(extra) = extra {
        meta.extend(extra);
    }
    Value::Object(meta)
}

pub fn ok(data: Value) -> Json<Value> {
    ok_with_meta(data, Value::Null)
}

pub fn ok_with_meta(data: Value, extra_meta: Value) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": data,
        "meta": build_meta(extra_meta),
    }))
}

/// Route failure, rendered as an error envelope
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    External(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(details: impl Into<String>) -> Self {
        ApiError::BadRequest(details.into())
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            ApiError::External(_) => (StatusCode::BAD_GATEWAY, "External API Error"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, label) = self.parts();
        let body = json!({
            "success": false,
            "error": label,
            "details": self.to_string(),
            "meta": build_meta(Value::Null),
        });
        (status, Json(body)).into_response()
    }
}

impl From<OkxError> for ApiError {
    fn from(err: OkxError) -> Self {
        match err {
            OkxError::Network(e) => {
                warn!("OKX unreachable: {}", e);
                ApiError::External("Failed to connect to OKX API".to_string())
            }
            OkxError::HttpStatus { .. } | OkxError::Parse(_) => {
                warn!("OKX call failed: {}", err);
                ApiError::External(err.to_string())
            }
            OkxError::Serialization(_) | OkxError::QueueDropped => {
                error!("Request pipeline failure: {}", err);
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}
