// # Routes Module
//
// - Thin HTTP handlers over the signed OKX client.
// - Handlers only check presence/format of inputs, call the client and
//   reshape the JSON; queuing and retries belong to `okx::queue`.
//
//  ## Available Route Modules
// - `health`: liveness plus request queue counters
// - `tokens`: token catalog and bridge token listings
// - `bridge`: cross-chain build-tx, supported bridges and token pairs
// - `swap`: aggregator quote / swap transaction
// - `market_data`: generic signed proxy
// - `portfolio`: balances, total value, transaction history and detail

use axum::{Json, extract::rejection::JsonRejection};
use serde_json::{Map, Value};

use crate::okx::QueryParams;
use crate::routes::response::ApiError;

/// Health check and monitoring endpoints
pub mod health;

pub mod bridge;
pub mod market_data;
pub mod portfolio;
pub mod response;
pub mod swap;
pub mod tokens;

/// Loose JSON object body; anything else is a 400 envelope.
pub(crate) fn object_body(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Map<String, Value>, ApiError> {
    let Json(value) = payload?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::bad_request("Request body must be a JSON object")),
    }
}

/// String form of a JSON scalar; `None` for null and empty strings.
pub(crate) fn value_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

pub(crate) fn param(params: &Map<String, Value>, key: &str) -> Option<String> {
    params.get(key).and_then(value_string)
}

/// Fails with "Missing required parameter: <key>" on the first absent key.
pub(crate) fn require(params: &Map<String, Value>, keys: &[&str]) -> Result<(), ApiError> {
    match keys.iter().find(|key| param(params, key).is_none()) {
        Some(key) => Err(ApiError::bad_request(format!("Missing required parameter: {}", key))),
        None => Ok(()),
    }
}

/// Copy the listed keys into query params, skipping null and empty values.
pub(crate) fn compact(params: &Map<String, Value>, keys: &[(&str, &str)]) -> QueryParams {
    keys.iter()
        .filter_map(|(query_key, body_key)| {
            param(params, body_key).map(|value| (query_key.to_string(), value))
        })
        .collect()
}

/// Digits with an optional fractional part, e.g. `501` or `0.5`.
pub(crate) fn is_numeric(value: &str) -> bool {
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (value, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    digits(whole) && fraction.is_none_or(digits)
}
