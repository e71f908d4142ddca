//! One HTTP call against the OKX base URL, with no queuing and no retries.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::okx::error::OkxError;
use crate::okx::signer::Signer;

/// Query parameters. Sorted iteration keeps URL and signature stable.
pub type QueryParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        }
    }
}

/// Unsigned description of a call. Signed again on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: HttpMethod,
    pub path: String,
    pub query: QueryParams,
    /// Already-serialized JSON body (POST only)
    pub body: Option<String>,
    pub extra_headers: Vec<(String, String)>,
}

impl RequestSpec {
    pub fn get(path: impl Into<String>, query: QueryParams) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            query,
            body: None,
            extra_headers: Vec::new(),
        }
    }

    pub fn post(path: impl Into<String>, body: Option<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            query: QueryParams::new(),
            body,
            extra_headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }
}

/// Executes exactly one upstream call and normalizes the outcome
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, spec: &RequestSpec) -> Result<Value, OkxError>;
}

/// reqwest-backed transport for the real OKX endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    signer: Signer,
}

impl HttpTransport {
    /// `timeout` of `None` leaves calls unbounded; callers that need a bound
    /// can also wrap the queue ticket in `tokio::time::timeout`.
    pub fn new(base_url: impl Into<String>, signer: Signer, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signer,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, spec: &RequestSpec) -> Result<Value, OkxError> {
        let signed = self.signer.sign_request(spec, Utc::now());
        let url = format!("{}{}{}", self.base_url, signed.path, signed.query_string);
        debug!("{} {} at {}", signed.method.as_str(), url, signed.timestamp);

        let mut request = self.client.request(signed.method.into(), &url);
        for (name, value) in &signed.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if signed.method == HttpMethod::Post {
            request = request.body(signed.body.clone().unwrap_or_default());
        }

        let response = request.send().await.map_err(OkxError::Network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(OkxError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(OkxError::Network)?;
        serde_json::from_slice(&bytes).map_err(|e| OkxError::Parse(e.to_string()))
    }
}
