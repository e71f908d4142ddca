//! # Bridge Routes
//!
//! Cross-chain swaps through the OKX bridge aggregator:
//! - `bridge-swap`: unsigned cross-chain transaction (`build-tx`)
//! - `bridge-info`: supported bridges, flagged by Solana support
//! - `bridge-pairs`: supported token pairs, fanned out per source chain

use std::collections::HashMap;

use axum::{
    extract::{Query, State, rejection::JsonRejection},
    response::Json,
};
use futures::future::join_all;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::okx::QueryParams;
use crate::routes::{
    compact, is_numeric, object_body, param,
    response::{ApiError, ok, ok_with_meta},
    value_string,
};
use crate::routes::tokens::SOLANA_CHAIN_INDEX;
use crate::server::AppState;

const BUILD_TX_PATH: &str = "/api/v5/dex/cross-chain/build-tx";
const BRIDGES_PATH: &str = "/api/v5/dex/cross-chain/supported/bridges";
const PAIRS_PATH: &str = "/api/v5/dex/cross-chain/supported/bridge-tokens-pairs";

/// Source chains queried when `bridge-pairs` is called without a filter:
/// Ethereum, Solana, BNB Chain, Polygon, Arbitrum, Optimism, Avalanche, Fantom.
pub const PAIR_CHAINS: [&str; 8] = ["1", "501", "56", "137", "42161", "10", "43114", "250"];

const REQUIRED_FIELDS: [&str; 9] = [
    "fromChainIndex",
    "toChainIndex",
    "fromChainId",
    "toChainId",
    "fromTokenAddress",
    "toTokenAddress",
    "amount",
    "slippage",
    "userWalletAddress",
];

const NUMERIC_FIELDS: [&str; 4] = ["fromChainIndex", "toChainIndex", "amount", "slippage"];

const SLIPPAGE_MIN: f64 = 0.002;
const SLIPPAGE_MAX: f64 = 0.5;

/// Collect every problem with a build-tx request, joined with `"; "`.
fn validate_bridge_params(params: &Map<String, Value>) -> Result<(), ApiError> {
    let mut errors = Vec::new();

    for key in REQUIRED_FIELDS {
        let Some(value) = param(params, key) else {
            errors.push(format!("Missing required parameter: {}", key));
            continue;
        };
        if NUMERIC_FIELDS.contains(&key) && !is_numeric(&value) {
            errors.push(format!("Parameter {} must be numeric", key));
        }
        if key == "slippage" {
            match value.parse::<f64>() {
                Ok(s) if s < SLIPPAGE_MIN => {
                    errors.push(format!("Parameter slippage must be ≥ {}", SLIPPAGE_MIN))
                }
                Ok(s) if s > SLIPPAGE_MAX => {
                    errors.push(format!("Parameter slippage must be ≤ {}", SLIPPAGE_MAX))
                }
                _ => {}
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::BadRequest(errors.join("; ")))
    }
}

fn build_tx_query(params: &Map<String, Value>) -> QueryParams {
    let mut fields: Vec<(&str, &str)> = REQUIRED_FIELDS.iter().map(|k| (*k, *k)).collect();
    fields.extend(
        [
            "sort",
            "dexIds",
            "receiveAddress",
            "feePercent",
            "referrerAddress",
            "priceImpactProtectionPercentage",
            "onlyBridge",
            "memo",
        ]
        .iter()
        .map(|k| (*k, *k)),
    );
    let mut query = compact(params, &fields);

    // Bridge id lists go upstream as JSON arrays, e.g. `[211,235]`
    for key in ["allowBridge", "denyBridge"] {
        if let Some(Value::Array(ids)) = params.get(key) {
            if !ids.is_empty() {
                query.insert(key.to_string(), Value::Array(ids.clone()).to_string());
            }
        }
    }
    query
}

/// `POST /api/bridge-swap` with `{ action: "build-tx", ...params }`
pub async fn bridge_swap(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut params = object_body(payload)?;
    let action = params.remove("action");
    if action.as_ref().and_then(Value::as_str) != Some("build-tx") {
        return Err(ApiError::bad_request(
            "Action must be 'build-tx' for cross-chain swaps",
        ));
    }
    validate_bridge_params(&params)?;

    info!(
        "Building bridge tx {:?} -> {:?}",
        param(&params, "fromChainIndex"),
        param(&params, "toChainIndex")
    );
    let data = state.okx.signed_get(BUILD_TX_PATH, build_tx_query(&params)).await?;

    Ok(ok(json!({ "action": "build-tx", "data": data })))
}

fn chain_index_param(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params.get(key).filter(|v| !v.is_empty()).cloned()
}

fn text_field(raw: &Map<String, Value>, key: &str) -> String {
    raw.get(key).and_then(value_string).unwrap_or_default()
}

fn transform_bridge(raw: &Map<String, Value>) -> Value {
    let supported_chains = match raw.get("supportedChains") {
        Some(Value::Array(chains)) => chains.clone(),
        _ => Vec::new(),
    };
    let supports_solana = supported_chains
        .iter()
        .any(|chain| value_string(chain).as_deref() == Some(SOLANA_CHAIN_INDEX));
    let require_fee = ["requireOtherNativeFee", "requiredOtherNativeFee"]
        .iter()
        .find_map(|key| raw.get(*key).filter(|v| !v.is_null()).cloned())
        .unwrap_or(Value::Bool(false));
    let logo = ["logoUrl", "logo"]
        .iter()
        .find_map(|key| raw.get(*key).filter(|v| !v.is_null()).cloned())
        .unwrap_or(Value::Null);

    json!({
        "bridgeId": raw.get("bridgeId").cloned().unwrap_or(Value::Null),
        "bridgeName": raw.get("bridgeName").cloned().unwrap_or(Value::Null),
        "requireOtherNativeFee": require_fee,
        "logoUrl": logo,
        "supportedChains": supported_chains,
        "supportsSolana": supports_solana,
    })
}

/// `GET /api/bridge-info?chainIndex=501`
pub async fn bridge_info(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let chain_index = chain_index_param(&params, "chainIndex");
    if chain_index.as_deref().is_some_and(|c| !c.bytes().all(|b| b.is_ascii_digit())) {
        return Err(ApiError::bad_request("Invalid chainIndex; must be numeric"));
    }

    let query = match &chain_index {
        Some(chain) => QueryParams::from([
            ("chainIndex".to_string(), chain.clone()),
            ("chainId".to_string(), chain.clone()),
        ]),
        None => QueryParams::new(),
    };
    let result = state.okx.signed_get(BRIDGES_PATH, query).await?;

    let bridges: Vec<Value> = result["data"]
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_object).map(transform_bridge).collect())
        .unwrap_or_default();
    let solana_bridges: Vec<Value> = bridges
        .iter()
        .filter(|bridge| bridge["supportsSolana"] == true)
        .cloned()
        .collect();

    let mut data = Map::new();
    data.insert("totalBridges".into(), bridges.len().into());
    data.insert("solanaBridges".into(), solana_bridges.len().into());
    data.insert("bridges".into(), Value::Array(bridges));
    data.insert("solanaSupportedBridges".into(), Value::Array(solana_bridges));
    // Upstream envelope fields (code, msg, data) ride along
    if let Value::Object(upstream) = result {
        data.extend(upstream);
    }

    let scope = chain_index.as_deref().unwrap_or("all");
    Ok(ok_with_meta(Value::Object(data), json!({ "chainIndex": scope })))
}

fn is_success_code(result: &Value) -> bool {
    match &result["code"] {
        Value::String(code) => code == "0",
        Value::Number(code) => code.as_u64() == Some(0),
        _ => false,
    }
}

/// Pairs for one source chain; unsupported chains and failures count as empty
async fn pairs_for_chain(state: &AppState, from_chain_index: &str) -> Option<Value> {
    let query = QueryParams::from([("fromChainIndex".to_string(), from_chain_index.to_string())]);
    match state.okx.signed_get(PAIRS_PATH, query).await {
        Ok(result) if is_success_code(&result) => Some(result),
        Ok(result) => {
            debug!("No bridge pairs for chain {}: code {}", from_chain_index, result["code"]);
            None
        }
        Err(err) => {
            debug!("Bridge pairs for chain {} unavailable: {}", from_chain_index, err);
            None
        }
    }
}

fn transform_pair(raw: &Map<String, Value>) -> Value {
    let mut pair = Map::new();
    for key in [
        "fromChainIndex",
        "toChainIndex",
        "fromChainId",
        "toChainId",
        "fromTokenAddress",
        "toTokenAddress",
        "fromTokenSymbol",
        "toTokenSymbol",
    ] {
        pair.insert(key.to_string(), raw.get(key).cloned().unwrap_or(Value::Null));
    }
    let pair_id = format!(
        "{}-{}-{}-{}",
        text_field(raw, "fromChainIndex"),
        text_field(raw, "toChainIndex"),
        text_field(raw, "fromTokenSymbol"),
        text_field(raw, "toTokenSymbol"),
    );
    pair.insert("pairId".to_string(), Value::String(pair_id));
    Value::Object(pair)
}

/// `GET /api/bridge-pairs?fromChainIndex=501`
///
/// Without a filter, one request per chain in [`PAIR_CHAINS`] is issued at
/// once; the request queue still sends them upstream one by one.
pub async fn bridge_pairs(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let from_chain_index = chain_index_param(&params, "fromChainIndex");
    if from_chain_index.as_deref().is_some_and(|c| !is_numeric(c)) {
        return Err(ApiError::bad_request("Parameter fromChainIndex must be numeric"));
    }

    let indices: Vec<&str> = match &from_chain_index {
        Some(chain) => vec![chain.as_str()],
        None => PAIR_CHAINS.to_vec(),
    };
    info!("Fetching bridge pairs for {} chain(s)", indices.len());

    let results = join_all(indices.iter().map(|idx| pairs_for_chain(&state, idx))).await;
    let successful: Vec<Value> = results.into_iter().flatten().collect();

    let pairs: Vec<Value> = successful
        .iter()
        .filter_map(|res| res["data"].as_array())
        .flatten()
        .filter_map(Value::as_object)
        .map(transform_pair)
        .collect();

    let mut pairs_by_chain: Map<String, Value> = Map::new();
    for pair in &pairs {
        let key = format!(
            "{}-{}",
            value_string(&pair["fromChainIndex"]).unwrap_or_default(),
            value_string(&pair["toChainIndex"]).unwrap_or_default(),
        );
        if let Value::Array(group) = pairs_by_chain
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            group.push(pair.clone());
        }
    }

    let scope = from_chain_index.as_deref().unwrap_or("all");
    Ok(ok_with_meta(
        json!({
            "fromChainIndex": scope,
            "totalPairs": pairs.len(),
            "pairs": pairs,
            "pairsByChain": pairs_by_chain,
            "upstreamCount": successful.len(),
        }),
        json!({ "fromChainIndex": scope }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::okx::OkxError;
    use crate::routes::test_support::{app, get, post_json, send};
    use axum::http::StatusCode;

    fn build_tx_request() -> Value {
        json!({
            "action": "build-tx",
            "fromChainIndex": "501",
            "toChainIndex": "1",
            "fromChainId": "501",
            "toChainId": "1",
            "fromTokenAddress": "11111111111111111111111111111111",
            "toTokenAddress": "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee",
            "amount": "1000000000",
            "slippage": "0.01",
            "userWalletAddress": "Wallet111",
        })
    }

    #[tokio::test]
    async fn test_bridge_swap_builds_query() {
        let mut request = build_tx_request();
        request["sort"] = json!(1);
        request["onlyBridge"] = json!(false);
        request["allowBridge"] = json!([211, 235]);
        request["denyBridge"] = json!([]);
        request["memo"] = json!("");
        let (app, transport) = app(vec![Ok(json!({ "code": "0", "data": [{ "tx": {} }] }))]);

        let (status, body) = send(app, post_json("/api/bridge-swap", request)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["action"], "build-tx");
        let calls = transport.calls();
        assert_eq!(calls[0].path, BUILD_TX_PATH);
        assert_eq!(calls[0].query["slippage"], "0.01");
        assert_eq!(calls[0].query["sort"], "1");
        assert_eq!(calls[0].query["onlyBridge"], "false");
        assert_eq!(calls[0].query["allowBridge"], "[211,235]");
        assert!(!calls[0].query.contains_key("denyBridge"));
        assert!(!calls[0].query.contains_key("memo"));
        assert!(!calls[0].query.contains_key("action"));
    }

    #[tokio::test]
    async fn test_bridge_swap_rejects_bad_requests() {
        let (app, transport) = app(vec![]);

        let mut request = build_tx_request();
        request["action"] = json!("quote");
        let (status, body) = send(app.clone(), post_json("/api/bridge-swap", request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"], "Action must be 'build-tx' for cross-chain swaps");

        let mut request = build_tx_request();
        request["slippage"] = json!("0.9");
        request["amount"] = json!("ten");
        request.as_object_mut().unwrap().remove("toChainId");
        let (status, body) = send(app, post_json("/api/bridge-swap", request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["details"],
            "Missing required parameter: toChainId; Parameter amount must be numeric; \
             Parameter slippage must be ≤ 0.5"
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bridge_info_flags_solana_support() {
        let upstream = json!({
            "code": "0",
            "msg": "",
            "data": [
                { "bridgeId": 211, "bridgeName": "Wormhole", "logo": "w.png",
                  "requiredOtherNativeFee": true, "supportedChains": ["1", "501"] },
                { "bridgeId": 235, "bridgeName": "Stargate", "logoUrl": "s.png",
                  "supportedChains": ["1", "56"] }
            ]
        });
        let (app, transport) = app(vec![Ok(upstream)]);

        let (status, body) = send(app, get("/api/bridge-info")).await;

        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["totalBridges"], 2);
        assert_eq!(data["solanaBridges"], 1);
        assert_eq!(data["solanaSupportedBridges"][0]["bridgeName"], "Wormhole");
        assert_eq!(data["bridges"][0]["logoUrl"], "w.png");
        assert_eq!(data["bridges"][0]["requireOtherNativeFee"], true);
        assert_eq!(data["bridges"][1]["requireOtherNativeFee"], false);
        assert_eq!(data["code"], "0");
        assert_eq!(body["meta"]["chainIndex"], "all");
        assert!(transport.calls()[0].query.is_empty());
    }

    #[tokio::test]
    async fn test_bridge_info_rejects_non_numeric_chain() {
        let (app, transport) = app(vec![]);
        let (status, body) = send(app, get("/api/bridge-info?chainIndex=sol")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"], "Invalid chainIndex; must be numeric");
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bridge_pairs_fans_out_over_all_chains() {
        let pair = |from: &str, to: &str, sym: &str| {
            json!({ "fromChainIndex": from, "toChainIndex": to,
                    "fromTokenSymbol": sym, "toTokenSymbol": sym })
        };
        let (app, transport) = app(vec![
            Ok(json!({ "code": "0", "data": [pair("1", "501", "USDC"), pair("1", "501", "USDT")] })),
            Err(OkxError::HttpStatus { status: 500, reason: "Internal Server Error".into() }),
            Ok(json!({ "code": "51000", "msg": "Unsupported chain", "data": [] })),
            Ok(json!({ "code": "0", "data": [pair("137", "1", "USDC")] })),
        ]);

        let (status, body) = send(app, get("/api/bridge-pairs")).await;

        assert_eq!(status, StatusCode::OK);
        let data = &body["data"];
        assert_eq!(data["fromChainIndex"], "all");
        assert_eq!(data["upstreamCount"], PAIR_CHAINS.len() - 2);
        assert_eq!(data["totalPairs"], 3);
        assert_eq!(data["pairs"][0]["pairId"], "1-501-USDC-USDC");
        assert_eq!(data["pairsByChain"]["1-501"].as_array().unwrap().len(), 2);
        assert_eq!(data["pairsByChain"]["137-1"].as_array().unwrap().len(), 1);

        // One queued request per chain, issued in list order
        let chains: Vec<String> = transport
            .calls()
            .iter()
            .map(|call| call.query["fromChainIndex"].clone())
            .collect();
        assert_eq!(chains, PAIR_CHAINS.to_vec());
    }

    #[tokio::test]
    async fn test_bridge_pairs_single_chain() {
        let (app, transport) = app(vec![]);

        let (status, body) = send(app.clone(), get("/api/bridge-pairs?fromChainIndex=501")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["upstreamCount"], 1);
        assert_eq!(body["meta"]["fromChainIndex"], "501");
        assert_eq!(transport.calls().len(), 1);

        let (status, body) = send(app, get("/api/bridge-pairs?fromChainIndex=abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"], "Parameter fromChainIndex must be numeric");
    }
}
