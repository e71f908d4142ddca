//! # OKX Module
//!
//! Outbound access to the OKX Web3 DEX API. All calls are signed with the
//! account credentials and serialized through a single-flight
//! [`RequestQueue`] that retries rate-limit and server errors with
//! exponential back-off.
//!
//! - `signer`: HMAC-SHA256 request signatures and auth headers
//! - `transport`: one HTTP call, outcome normalized to JSON or `OkxError`
//! - `queue`: FIFO single-flight execution with retry/back-off
//! - `client`: signed GET/POST facade over queue + transport

pub mod client;
pub mod error;
pub mod queue;
pub mod signer;
pub mod transport;

pub use client::OkxClient;
pub use error::OkxError;
pub use queue::{RequestQueue, RetryPolicy};
pub use signer::{Credentials, Signer};
pub use transport::{HttpTransport, QueryParams};
