//! # Token Routes
//!
//! Token catalog for a single chain and the bridge token listings used by
//! the cross-chain swap form.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde_json::{Map, Value, json};
use tracing::info;

use crate::okx::QueryParams;
use crate::routes::{
    is_numeric,
    response::{ApiError, ok_with_meta},
    value_string,
};
use crate::server::AppState;

const ALL_TOKENS_PATH: &str = "/api/v5/dex/aggregator/all-tokens";
const CROSS_CHAIN_TOKENS_PATH: &str = "/api/v5/dex/cross-chain/supported/tokens";

pub const SOLANA_CHAIN_INDEX: &str = "501";

fn chain_query(chain_index: &str) -> QueryParams {
    QueryParams::from([
        ("chainIndex".to_string(), chain_index.to_string()),
        ("chainId".to_string(), chain_index.to_string()),
    ])
}

fn check_chain_index(chain_index: &str) -> Result<(), ApiError> {
    if chain_index.bytes().all(|b| b.is_ascii_digit()) && !chain_index.is_empty() {
        Ok(())
    } else {
        Err(ApiError::bad_request("chainIndex must be a numeric string"))
    }
}

/// Flatten one upstream token record into the shape the UI renders
fn transform_token(raw: &Map<String, Value>) -> Map<String, Value> {
    let logo = raw.get("tokenLogoUrl").and_then(value_string);
    let decimals = raw
        .get("decimals")
        .and_then(value_string)
        .filter(|d| is_numeric(d))
        .and_then(|d| d.split('.').next().and_then(|whole| whole.parse::<u64>().ok()));

    let mut token = Map::new();
    token.insert("symbol".into(), raw.get("tokenSymbol").cloned().unwrap_or(Value::Null));
    token.insert("name".into(), raw.get("tokenName").cloned().unwrap_or(Value::Null));
    token.insert(
        "address".into(),
        raw.get("tokenContractAddress").cloned().unwrap_or(Value::Null),
    );
    token.insert("decimals".into(), decimals.map(Value::from).unwrap_or(Value::Null));
    token.insert("hasLogo".into(), Value::Bool(logo.is_some()));
    token.insert("logoUrl".into(), logo.map(Value::String).unwrap_or(Value::Null));
    token
}

fn upstream_tokens(result: &Value) -> Vec<Map<String, Value>> {
    result["data"]
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_object).map(transform_token).collect())
        .unwrap_or_default()
}

/// `GET /api/token-catalog?chainIndex=501`
pub async fn token_catalog(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let chain_index = params
        .get("chainIndex")
        .filter(|c| !c.is_empty())
        .map(String::as_str)
        .unwrap_or(SOLANA_CHAIN_INDEX);
    check_chain_index(chain_index)?;

    info!("Fetching token catalog for chain {}", chain_index);
    let result = state.okx.signed_get(ALL_TOKENS_PATH, chain_query(chain_index)).await?;
    let tokens = upstream_tokens(&result);

    let chain_name = if chain_index == SOLANA_CHAIN_INDEX {
        "Solana".to_string()
    } else {
        format!("Chain {}", chain_index)
    };

    Ok(ok_with_meta(
        json!({
            "chainIndex": chain_index,
            "chainName": chain_name,
            "totalTokens": tokens.len(),
            "tokens": tokens,
            "upstream": result,
        }),
        json!({ "chainIndex": chain_index }),
    ))
}

/// `GET /api/bridge-tokens?chainIndex=1&type=chain-tokens|cross-chain-supported`
pub async fn bridge_tokens(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let chain_index = params.get("chainIndex").filter(|c| !c.is_empty()).cloned();
    let kind = params
        .get("type")
        .filter(|t| !t.is_empty())
        .map(String::as_str)
        .unwrap_or("chain-tokens");

    if let Some(chain_index) = &chain_index {
        check_chain_index(chain_index)?;
    }

    let (result, api_type) = if kind == "cross-chain-supported" {
        let query = chain_index.as_deref().map(chain_query).unwrap_or_default();
        let result = state.okx.signed_get(CROSS_CHAIN_TOKENS_PATH, query).await?;
        (result, "Cross-Chain Supported Tokens")
    } else {
        let Some(chain_index) = chain_index.as_deref() else {
            return Err(ApiError::bad_request("chainIndex is required for chain-tokens type"));
        };
        let result = state.okx.signed_get(ALL_TOKENS_PATH, chain_query(chain_index)).await?;
        (result, "Chain Tokens")
    };

    let tokens: Vec<Map<String, Value>> = result["data"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|raw| {
                    let mut token = transform_token(raw);
                    let fallback = chain_index.clone().map(Value::String).unwrap_or(Value::Null);
                    for key in ["chainIndex", "chainId"] {
                        let value = raw
                            .get(key)
                            .filter(|v| value_string(v).is_some())
                            .cloned()
                            .unwrap_or_else(|| fallback.clone());
                        token.insert(key.to_string(), value);
                    }
                    token
                })
                .collect()
        })
        .unwrap_or_default();

    let scope = chain_index.as_deref().unwrap_or("all");
    Ok(ok_with_meta(
        json!({
            "type": api_type,
            "chainIndex": scope,
            "totalTokens": tokens.len(),
            "tokens": tokens,
            "upstream": result,
        }),
        json!({ "chainIndex": scope }),
    ))
}
