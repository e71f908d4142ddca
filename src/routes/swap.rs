//! # Swap Routes
//!
//! Same-chain swaps through the OKX DEX aggregator:
//! - `quote`: best route and expected output for an amount
//! - `execute`: unsigned swap transaction for the user's wallet to sign

use axum::{
    extract::{State, rejection::JsonRejection},
    response::Json,
};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::okx::QueryParams;
use crate::routes::{
    compact, is_numeric, object_body, param, require,
    response::{ApiError, ok},
};
use crate::server::AppState;

const QUOTE_PATH: &str = "/api/v5/dex/aggregator/quote";
const SWAP_PATH: &str = "/api/v5/dex/aggregator/swap";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwapAction {
    Quote,
    Execute,
}

impl SwapAction {
    fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw {
            Some("quote") => Ok(SwapAction::Quote),
            Some("execute") => Ok(SwapAction::Execute),
            _ => Err(ApiError::bad_request("Action must be one of: quote, execute")),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            SwapAction::Quote => "quote",
            SwapAction::Execute => "execute",
        }
    }
}

fn validate_swap_params(params: &Map<String, Value>, require_wallet: bool) -> Result<(), ApiError> {
    let mut required = vec![
        "chainIndex",
        "chainId",
        "fromTokenAddress",
        "toTokenAddress",
        "amount",
        "slippage",
    ];
    if require_wallet {
        required.push("userWalletAddress");
    }
    require(params, &required)?;

    for key in ["chainIndex", "chainId", "amount", "slippage"] {
        if !param(params, key).is_some_and(|v| is_numeric(&v)) {
            return Err(ApiError::bad_request(format!(
                "Invalid {} format. Must be numeric",
                key
            )));
        }
    }

    let slippage: f64 = param(params, "slippage")
        .and_then(|s| s.parse().ok())
        .unwrap_or(f64::NAN);
    if !(0.0..=100.0).contains(&slippage) {
        return Err(ApiError::bad_request("Slippage must be between 0 and 100"));
    }
    Ok(())
}

const BASE_FIELDS: [(&str, &str); 6] = [
    ("chainIndex", "chainIndex"),
    ("chainId", "chainId"),
    ("fromTokenAddress", "fromTokenAddress"),
    ("toTokenAddress", "toTokenAddress"),
    ("amount", "amount"),
    ("slippage", "slippage"),
];

fn quote_query(params: &Map<String, Value>) -> QueryParams {
    let mut query = compact(params, &BASE_FIELDS);
    query.extend(compact(params, &[("userWalletAddress", "userWalletAddress")]));
    query
}

fn swap_query(params: &Map<String, Value>) -> QueryParams {
    let mut query = compact(params, &BASE_FIELDS);
    query.extend(compact(
        params,
        &[
            ("userWalletAddress", "userWalletAddress"),
            ("feePercent", "feePercent"),
            ("priceTolerance", "priceTolerance"),
            ("pathNum", "pathNum"),
        ],
    ));
    query.insert(
        "autoSlippage".to_string(),
        param(params, "autoSlippage").unwrap_or_else(|| "true".to_string()),
    );
    query
}

/// Upstream business error: a `code` other than `"0"`.
pub(crate) fn upstream_failure(result: &Value, fallback: &str) -> Option<String> {
    let code = match &result["code"] {
        Value::String(code) => code.clone(),
        Value::Number(code) => code.to_string(),
        _ => return None,
    };
    if code.is_empty() || code == "0" {
        return None;
    }
    Some(
        result["msg"]
            .as_str()
            .filter(|msg| !msg.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} failed with code {}", fallback, code)),
    )
}

/// `POST /api/swap` with `{ action: "quote" | "execute", ...params }`
pub async fn swap(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut params = object_body(payload)?;
    let action = SwapAction::parse(params.remove("action").as_ref().and_then(Value::as_str))?;
    validate_swap_params(&params, action == SwapAction::Execute)?;

    info!(
        "Swap {} on chain {:?}",
        action.as_str(),
        param(&params, "chainIndex")
    );

    let result = match action {
        SwapAction::Quote => {
            let quote = state.okx.signed_get(QUOTE_PATH, quote_query(&params)).await?;
            if let Some(msg) = upstream_failure(&quote, "Quote") {
                warn!("Quote rejected upstream: {}", msg);
                return Err(ApiError::BadRequest(msg));
            }
            if quote["data"].as_array().is_none_or(|data| data.is_empty()) {
                return Err(ApiError::bad_request("Insufficient liquidity for this pair"));
            }
            quote
        }
        SwapAction::Execute => {
            let swap = state.okx.signed_get(SWAP_PATH, swap_query(&params)).await?;
            if let Some(msg) = upstream_failure(&swap, "Execution") {
                warn!("Swap rejected upstream: {}", msg);
                return Err(ApiError::BadRequest(msg));
            }
            swap
        }
    };

    Ok(ok(json!({ "action": action.as_str(), "data": result })))
}
