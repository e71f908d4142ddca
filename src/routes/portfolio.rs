//! # Portfolio Routes
//!
//! Wallet balances, total value and transaction history by address. All
//! endpoints take a JSON body and forward the relevant fields as query
//! parameters on a signed GET, except specific-token balances which are a
//! signed POST.

use axum::{
    extract::{State, rejection::JsonRejection},
    response::Json,
};
use serde_json::{Map, Value, json};
use tracing::info;

use crate::routes::{
    compact, object_body, param, require,
    response::{ApiError, ok},
    tokens::SOLANA_CHAIN_INDEX,
    value_string,
};
use crate::server::AppState;

const TOKEN_BALANCES_PATH: &str = "/api/v5/dex/balance/all-token-balances-by-address";
const TOTAL_VALUE_PATH: &str = "/api/v5/wallet/asset/total-value-by-address";
const HISTORY_PATH: &str = "/api/v5/dex/post-transaction/transactions-by-address";
const SPECIFIC_BALANCES_PATH: &str = "/api/v5/dex/balance/token-balances-by-address";
const TX_DETAIL_PATH: &str = "/api/v5/dex/post-transaction/transaction-detail-by-txhash";

/// Wrapped SOL mint, which the UI uses to mean native SOL
pub const SOL_TOKEN_ADDRESS: &str = "So11111111111111111111111111111111111111112";

fn number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) if s.trim().is_empty() => 0.0,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        _ => 0.0,
    }
}

/// Upper-case the symbol and make `balance` a human-readable amount,
/// deriving it from `nativeBalance / 10^decimals` when the API omits it.
fn normalise_asset(mut asset: Map<String, Value>) -> Map<String, Value> {
    let symbol = ["symbol", "tokenSymbol"]
        .iter()
        .find_map(|key| asset.get(*key).and_then(Value::as_str))
        .unwrap_or("")
        .to_uppercase();

    let mut balance = number(asset.get("balance"));
    if (balance == 0.0 || balance.is_nan()) && asset.contains_key("nativeBalance") {
        let native = number(asset.get("nativeBalance"));
        let decimals = number(asset.get("decimals"));
        if native != 0.0 && !native.is_nan() && decimals >= 0.0 {
            balance = native / 10f64.powf(decimals);
        }
    }

    asset.insert("symbol".to_string(), Value::String(symbol));
    asset.insert("balance".to_string(), Value::String(balance.to_string()));
    asset
}

/// `POST /api/portfolio/token-balances` with `{ address, chains, excludeRiskToken? }`
pub async fn token_balances(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = object_body(payload)?;
    require(&body, &["address", "chains"])?;

    let query = compact(
        &body,
        &[
            ("accountId", "address"),
            ("address", "address"),
            ("chains", "chains"),
            ("excludeRiskToken", "excludeRiskToken"),
        ],
    );
    info!("Fetching token balances for {:?}", param(&body, "address"));

    let mut upstream = state.okx.signed_get(TOKEN_BALANCES_PATH, query).await?;
    if let Some(chains) = upstream.get_mut("data").and_then(Value::as_array_mut) {
        for chain in chains.iter_mut() {
            if let Some(assets) = chain.get_mut("tokenAssets").and_then(Value::as_array_mut) {
                for asset in assets.iter_mut() {
                    if let Value::Object(map) = asset.take() {
                        *asset = Value::Object(normalise_asset(map));
                    }
                }
            }
        }
    }

    Ok(ok(upstream))
}

fn asset_symbol(asset: &Value) -> String {
    ["symbol", "tokenSymbol"]
        .iter()
        .find_map(|key| asset[*key].as_str())
        .unwrap_or("")
        .to_uppercase()
}

/// Exactly one requested token, and it is SOL on Solana
fn is_native_sol(addresses: &[Value]) -> bool {
    match addresses {
        [only] => {
            value_string(&only["chainIndex"]).as_deref() == Some(SOLANA_CHAIN_INDEX)
                && value_string(&only["tokenContractAddress"]).as_deref() == Some(SOL_TOKEN_ADDRESS)
        }
        _ => false,
    }
}

/// `POST /api/portfolio/token-balance` with
/// `{ address, tokenContractAddresses: [{ chainIndex, tokenContractAddress }], excludeRiskToken? }`
///
/// The specific-balance endpoint does not report native SOL, so a lone SOL
/// request is answered from the all-balances listing instead.
pub async fn token_balance(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = object_body(payload)?;
    let addresses = match body.get("tokenContractAddresses") {
        Some(Value::Array(items)) if !items.is_empty() => items.clone(),
        _ => Vec::new(),
    };
    let Some(address) = param(&body, "address").filter(|_| !addresses.is_empty()) else {
        return Err(ApiError::bad_request(
            "Missing or invalid required parameters: address and tokenContractAddresses",
        ));
    };

    if is_native_sol(&addresses) {
        info!("Fetching native SOL balance for {}", address);
        let mut query = compact(&body, &[("excludeRiskToken", "excludeRiskToken")]);
        query.insert("accountId".to_string(), address.clone());
        query.insert("address".to_string(), address);
        query.insert("chains".to_string(), SOLANA_CHAIN_INDEX.to_string());

        let upstream = state.okx.signed_get(TOKEN_BALANCES_PATH, query).await?;
        let mut first = match &upstream["data"][0] {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        let sol_assets: Vec<Value> = first
            .get("tokenAssets")
            .and_then(Value::as_array)
            .map(|assets| assets.iter().filter(|a| asset_symbol(a) == "SOL").cloned().collect())
            .unwrap_or_default();
        first.insert("tokenAssets".to_string(), Value::Array(sol_assets));

        return Ok(ok(json!({ "data": [first] })));
    }

    let mut payload = json!({ "address": address, "tokenContractAddresses": addresses });
    if let Some(exclude) = param(&body, "excludeRiskToken") {
        payload["excludeRiskToken"] = Value::String(exclude);
    }
    let data = state.okx.signed_post(SPECIFIC_BALANCES_PATH, Some(&payload)).await?;
    Ok(ok(data))
}

/// `POST /api/portfolio/token-value` with `{ address, chains?, assetType?, excludeRiskToken? }`
pub async fn token_value(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = object_body(payload)?;
    require(&body, &["address"])?;

    let query = compact(
        &body,
        &[
            ("address", "address"),
            ("chains", "chains"),
            ("assetType", "assetType"),
            ("excludeRiskToken", "excludeRiskToken"),
        ],
    );

    let result = state.okx.signed_get(TOTAL_VALUE_PATH, query).await?;
    let first = match &result["data"] {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };

    Ok(ok(json!({ "totalValue": first["totalValue"] })))
}

/// `POST /api/portfolio/history` with `{ address, chains?, tokenContractAddress?, begin?, end?, cursor?, limit? }`
pub async fn history(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = object_body(payload)?;
    require(&body, &["address"])?;

    let query = compact(
        &body,
        &[
            ("address", "address"),
            ("chains", "chains"),
            ("tokenContractAddress", "tokenContractAddress"),
            ("begin", "begin"),
            ("end", "end"),
            ("cursor", "cursor"),
            ("limit", "limit"),
        ],
    );

    let data = state.okx.signed_get(HISTORY_PATH, query).await?;
    Ok(ok(data))
}

/// `POST /api/portfolio/transaction-detail` with `{ chainIndex, txHash, itype? }`
pub async fn transaction_detail(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = object_body(payload)?;
    require(&body, &["chainIndex", "txHash"])?;

    let query = compact(
        &body,
        &[("chainIndex", "chainIndex"), ("txHash", "txHash"), ("itype", "itype")],
    );

    let data = state.okx.signed_get(TX_DETAIL_PATH, query).await?;
    Ok(ok(data))
}
