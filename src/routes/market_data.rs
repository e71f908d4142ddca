use axum::{
    extract::{State, rejection::JsonRejection},
    response::Json,
};
use serde_json::{Map, Value};
use tracing::info;

use crate::okx::QueryParams;
use crate::routes::{
    object_body,
    response::{ApiError, ok},
    value_string,
};
use crate::server::AppState;

/// Generic signed proxy: `POST /api/market-data` with `{ method, path, data }`.
///
/// For GET, `data` (an object) becomes the query string; for POST it is sent
/// as the JSON body.
pub async fn market_data(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut body = object_body(payload)?;
    let method = body.get("method").and_then(value_string);
    let path = body.get("path").and_then(value_string);

    let (Some(method), Some(path)) = (method, path) else {
        return Err(ApiError::bad_request("Missing required parameters: method and path"));
    };
    if !path.starts_with('/') {
        return Err(ApiError::bad_request("path must start with '/'"));
    }
    let data = body.remove("data");

    info!("Proxying {} {}", method.to_uppercase(), path);
    let result = match method.to_uppercase().as_str() {
        "GET" => {
            let query = match &data {
                Some(Value::Object(map)) => object_query(map),
                _ => QueryParams::new(),
            };
            state.okx.signed_get(&path, query).await?
        }
        "POST" => state.okx.signed_post(&path, post_body(data).as_ref()).await?,
        _ => return Err(ApiError::bad_request("method must be GET or POST")),
    };

    Ok(ok(result))
}

/// `null`, `false`, `0` and `""` mean "no body": nothing is signed or sent.
fn post_body(data: Option<Value>) -> Option<Value> {
    data.filter(|value| match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

fn object_query(map: &Map<String, Value>) -> QueryParams {
    map.iter()
        .filter_map(|(key, value)| value_string(value).map(|v| (key.clone(), v)))
        .collect()
}
