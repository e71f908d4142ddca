//! Request signing for the OKX Web3 API.
//!
//! Every call carries `OK-ACCESS-SIGN`, the base64 HMAC-SHA256 of
//! `timestamp + METHOD + path + queryString + body` keyed by the account
//! secret. The upstream recomputes it server-side, so the concatenation and
//! the encoding have to match byte for byte.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, Utc};
use ring::hmac;

use crate::okx::transport::{HttpMethod, QueryParams, RequestSpec};

pub const HEADER_API_KEY: &str = "OK-ACCESS-KEY";
pub const HEADER_SIGNATURE: &str = "OK-ACCESS-SIGN";
pub const HEADER_TIMESTAMP: &str = "OK-ACCESS-TIMESTAMP";
pub const HEADER_PASSPHRASE: &str = "OK-ACCESS-PASSPHRASE";
pub const HEADER_PROJECT: &str = "OK-ACCESS-PROJECT";

/// API credentials issued by the OKX developer portal
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// A fully signed request, ready to hand to the HTTP client.
///
/// Built fresh for every attempt: the signature is bound to the timestamp,
/// so a retried call must never reuse an older one.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: HttpMethod,
    pub path: String,
    /// `""` or `?k=v&...`
    pub query_string: String,
    pub body: Option<String>,
    pub timestamp: String,
    pub signature: String,
    pub headers: Vec<(String, String)>,
}

/// Stateless signer. Holds the credentials and the prepared HMAC key.
#[derive(Clone)]
pub struct Signer {
    credentials: Credentials,
    key: hmac::Key,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("credentials", &self.credentials).finish()
    }
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        let key = hmac::Key::new(hmac::HMAC_SHA256, credentials.secret_key.as_bytes());
        Self { credentials, key }
    }

    /// Compute the base64 signature over the canonical message.
    pub fn sign(
        &self,
        timestamp: &str,
        method: HttpMethod,
        path: &str,
        query_string: &str,
        body: &str,
    ) -> String {
        let message = format!("{}{}{}{}{}", timestamp, method.as_str(), path, query_string, body);
        let tag = hmac::sign(&self.key, message.as_bytes());
        STANDARD.encode(tag.as_ref())
    }

    /// Sign `spec` at `at`, producing the URL suffix, body and header set.
    ///
    /// Only the query parameters feed the signature's query component and
    /// only the POST body feeds its body component.
    pub fn sign_request(&self, spec: &RequestSpec, at: DateTime<Utc>) -> SignedRequest {
        let timestamp = format_timestamp(at);
        let query_string = encode_query(&spec.query);
        let body = match spec.method {
            HttpMethod::Post => spec.body.clone(),
            HttpMethod::Get => None,
        };
        let signature = self.sign(
            &timestamp,
            spec.method,
            &spec.path,
            &query_string,
            body.as_deref().unwrap_or(""),
        );

        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (HEADER_API_KEY.to_string(), self.credentials.api_key.clone()),
            (HEADER_SIGNATURE.to_string(), signature.clone()),
            (HEADER_TIMESTAMP.to_string(), timestamp.clone()),
            (HEADER_PASSPHRASE.to_string(), self.credentials.passphrase.clone()),
        ];
        headers.extend(spec.extra_headers.iter().cloned());

        SignedRequest {
            method: spec.method,
            path: spec.path.clone(),
            query_string,
            body,
            timestamp,
            signature,
            headers,
        }
    }
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-01-01T00:00:00.000Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Form-encode query parameters, prefixed with `?`; empty input yields `""`.
pub fn encode_query(query: &QueryParams) -> String {
    if query.is_empty() {
        return String::new();
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter())
        .finish();
    format!("?{}", encoded)
}
