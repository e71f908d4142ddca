//! Configuration module for environment variables and application settings

use std::env;
use std::str::FromStr;

use anyhow::{Result, anyhow};

#[derive(Debug, Clone)]
pub struct Config {
    /// OKX DEX API endpoint and credentials
    pub okx: OkxConfig,

    /// Upstream request pacing and retry thresholds
    pub request: RequestConfig,

    /// Server configuration
    pub server: ServerConfig,
}

#[derive(Clone)]
pub struct OkxConfig {
    pub base_url: String,
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
    pub project_id: Option<String>,
}

impl std::fmt::Debug for OkxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OkxConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    /// Minimum spacing between caller-side requests. Not applied by the queue.
    pub min_delay_ms: u64,
    /// First back-off delay; doubles per retry
    pub retry_delay_ms: u64,
    pub max_retries: u32,
    /// Per-call HTTP timeout, unbounded when unset
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("{} environment variable is required", key))
        };

        Ok(Self {
            okx: OkxConfig {
                base_url: lookup("OKX_DEX_BASE_URL")
                    .unwrap_or_else(|| "https://web3.okx.com".to_string()),
                api_key: required("OKX_DEX_API_KEY")?,
                secret_key: required("OKX_DEX_SECRET_KEY")?,
                passphrase: required("OKX_DEX_PASSPHRASE")?,
                project_id: lookup("OKX_DEX_PROJECT_ID").filter(|v| !v.is_empty()),
            },

            request: RequestConfig {
                min_delay_ms: parse_or(&lookup, "REQUEST_MIN_DELAY_MS", 1000)?,
                retry_delay_ms: parse_or(&lookup, "REQUEST_RETRY_DELAY_MS", 5000)?,
                max_retries: parse_or(&lookup, "REQUEST_MAX_RETRIES", 5)?,
                timeout_ms: lookup("REQUEST_TIMEOUT_MS")
                    .map(|raw| parse_value("REQUEST_TIMEOUT_MS", &raw))
                    .transpose()?,
            },

            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                // $PORT wins so PaaS hosts can assign it
                port: match lookup("PORT") {
                    Some(raw) => parse_value("PORT", &raw)?,
                    None => parse_or(&lookup, "SERVER_PORT", 3000)?,
                },
                cors_origins: lookup("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|| "http://localhost:3000".to_string())
                    .split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect(),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow!("{} must be a number, got {:?}", key, raw))
}
