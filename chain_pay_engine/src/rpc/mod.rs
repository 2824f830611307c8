//! # RPC access to third-party chain nodes
//!
//! Public RPC endpoints are slow, flaky and rate limited. [`RpcClient`] hides that behind a simple request API:
//!
//! * Every attempt first waits for a token from the provider's bucket (see [`RateLimiters`]).
//! * Transport errors, HTTP 5xx and HTTP 429 are retried with exponential backoff.
//! * When the retry budget is spent, the client rotates to the next healthy endpoint. An endpoint is unhealthy while
//!   it has at least three failures, the most recent one inside the health window.
//! * Any success resets the endpoint's failure counter, and the endpoint stays current for later calls.
//!
//! The HTTP layer itself sits behind the [`RpcTransport`] trait, so tests can substitute scripted endpoints.
mod client;
mod errors;
mod json_rpc;
mod rate_limit;
mod transport;

pub use client::{RetryPolicy, RpcClient};
pub use errors::RpcError;
pub use json_rpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use rate_limit::{ProviderQuota, RateLimiters, GENERIC_QUOTA, PROVIDER_QUOTAS};
pub use transport::{ReqwestTransport, RpcResponse, RpcTransport, TransportError};
