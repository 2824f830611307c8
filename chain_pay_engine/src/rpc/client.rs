use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::*;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    db_types::Chain,
    metrics::ScanMetrics,
    rpc::{
        json_rpc::align_batch,
        JsonRpcRequest,
        JsonRpcResponse,
        RateLimiters,
        RpcError,
        RpcResponse,
        RpcTransport,
        TransportError,
    },
};

/// Retry and endpoint health settings.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries on the same endpoint after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry. Doubles on each subsequent retry.
    pub base_delay: Duration,
    /// Failures older than this no longer count against an endpoint.
    pub health_window: Duration,
    /// Number of recent failures that makes an endpoint unhealthy.
    pub unhealthy_after: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            health_window: Duration::from_secs(60),
            unhealthy_after: 3,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

#[derive(Debug, Clone, Default)]
struct EndpointHealth {
    failures: u32,
    last_failure: Option<Instant>,
}

#[derive(Debug)]
struct EndpointState {
    current: usize,
    health: Vec<EndpointHealth>,
}

enum Request<'a> {
    Get { path: &'a str },
    Post { path: &'a str, body: String },
}

pub struct RpcClient<T: RpcTransport> {
    chain: Chain,
    endpoints: Vec<String>,
    transport: T,
    limiters: Arc<RateLimiters>,
    metrics: Arc<ScanMetrics>,
    policy: RetryPolicy,
    state: RwLock<EndpointState>,
}

impl<T: RpcTransport> RpcClient<T> {
    pub fn new(
        chain: Chain,
        endpoints: Vec<String>,
        transport: T,
        limiters: Arc<RateLimiters>,
        metrics: Arc<ScanMetrics>,
        policy: RetryPolicy,
    ) -> Result<Self, RpcError> {
        if endpoints.is_empty() {
            return Err(RpcError::NoEndpoints(chain));
        }
        let state = EndpointState { current: 0, health: vec![EndpointHealth::default(); endpoints.len()] };
        Ok(Self { chain, endpoints, transport, limiters, metrics, policy, state: RwLock::new(state) })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// The endpoint that the next request will be sent to.
    pub fn current_endpoint(&self) -> &str {
        let index = self.state.read().current;
        &self.endpoints[index]
    }

    /// Recent failure count of the endpoint at `index`.
    pub fn failure_count(&self, index: usize) -> u32 {
        self.state.read().health.get(index).map(|h| h.failures).unwrap_or_default()
    }

    /// Issues a GET against `path`, relative to the current endpoint.
    pub async fn get(&self, path: &str) -> Result<RpcResponse, RpcError> {
        self.execute(Request::Get { path }).await
    }

    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, RpcError> {
        let response = self.get(path).await?;
        decode(response)
    }

    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<RpcResponse, RpcError> {
        let body = serde_json::to_string(body).map_err(|e| RpcError::Decode(e.to_string()))?;
        self.execute(Request::Post { path, body }).await
    }

    /// A single JSON-RPC call.
    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, RpcError> {
        let request = JsonRpcRequest::new(1, method, params);
        let response = self.post_json("", &request).await?;
        let response: JsonRpcResponse = decode(response)?;
        response.into_result()
    }

    /// Sends all requests in one JSON-RPC batch. The result has one response per request, in request order. Failed
    /// sub-requests carry their error in the response, and do not fail the batch.
    pub async fn batch_call(&self, requests: &[JsonRpcRequest]) -> Result<Vec<JsonRpcResponse>, RpcError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let response = self.post_json("", requests).await?;
        if !response.is_success() {
            return Err(RpcError::HttpStatus { status: response.status, body: response.body });
        }
        match serde_json::from_str::<Vec<JsonRpcResponse>>(&response.body) {
            Ok(responses) => Ok(align_batch(requests, responses)),
            // Some nodes reject the whole batch with a single error object
            Err(_) => {
                let single: JsonRpcResponse =
                    serde_json::from_str(&response.body).map_err(|e| RpcError::Decode(e.to_string()))?;
                match single.error {
                    Some(e) => Err(RpcError::JsonRpc(e)),
                    None => Err(RpcError::Decode("Expected an array of batch responses".to_string())),
                }
            },
        }
    }

    async fn execute(&self, request: Request<'_>) -> Result<RpcResponse, RpcError> {
        let mut retries = 0u32;
        let mut last_error = String::new();
        for _ in 0..self.endpoints.len() {
            let index = self.state.read().current;
            let endpoint = self.endpoints[index].as_str();
            for attempt in 0..=self.policy.max_retries {
                if attempt > 0 {
                    retries += 1;
                    tokio::time::sleep(self.policy.backoff(attempt - 1)).await;
                }
                self.limiters.until_ready(endpoint).await;
                match self.send(endpoint, &request).await {
                    Ok(response) if !response.is_retryable() => {
                        self.record_success(index);
                        self.metrics.record_rpc_call(self.chain, true, retries);
                        return Ok(response);
                    },
                    Ok(response) => last_error = format!("{endpoint} responded with HTTP {}", response.status),
                    Err(e) => last_error = format!("{endpoint}: {e}"),
                }
                debug!("🔄️ [{}] Attempt {} failed. {last_error}", self.chain, attempt + 1);
                self.record_failure(index);
            }
            if !self.rotate_from(index) {
                break;
            }
        }
        warn!("🔄️ [{}] Every RPC endpoint failed. Last error: {last_error}", self.chain);
        self.metrics.record_rpc_call(self.chain, false, retries);
        Err(RpcError::AllEndpointsExhausted { chain: self.chain, endpoints: self.endpoints.len(), last_error })
    }

    async fn send(&self, endpoint: &str, request: &Request<'_>) -> Result<RpcResponse, TransportError> {
        match request {
            Request::Get { path } => self.transport.get(&join_url(endpoint, path)).await,
            Request::Post { path, body } => self.transport.post_json(&join_url(endpoint, path), body.clone()).await,
        }
    }

    fn record_success(&self, index: usize) {
        let mut state = self.state.write();
        if let Some(health) = state.health.get_mut(index) {
            health.failures = 0;
            health.last_failure = None;
        }
    }

    fn record_failure(&self, index: usize) {
        let mut state = self.state.write();
        if let Some(health) = state.health.get_mut(index) {
            health.failures += 1;
            health.last_failure = Some(Instant::now());
        }
    }

    /// Makes the next healthy endpoint after `index` current. Returns false if there is none.
    fn rotate_from(&self, index: usize) -> bool {
        let len = self.endpoints.len();
        let now = Instant::now();
        let mut state = self.state.write();
        for offset in 1..len {
            let candidate = (index + offset) % len;
            if is_healthy(&mut state.health[candidate], now, &self.policy) {
                state.current = candidate;
                info!("🔄️ [{}] Switched RPC endpoint to {}", self.chain, self.endpoints[candidate]);
                return true;
            }
        }
        false
    }
}

fn is_healthy(health: &mut EndpointHealth, now: Instant, policy: &RetryPolicy) -> bool {
    if health.failures < policy.unhealthy_after {
        return true;
    }
    match health.last_failure {
        Some(at) if now.duration_since(at) <= policy.health_window => false,
        _ => {
            health.failures = 0;
            true
        },
    }
}

fn join_url(endpoint: &str, path: &str) -> String {
    if path.is_empty() {
        endpoint.to_string()
    } else {
        format!("{}/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

fn decode<R: DeserializeOwned>(response: RpcResponse) -> Result<R, RpcError> {
    if !response.is_success() {
        return Err(RpcError::HttpStatus { status: response.status, body: response.body });
    }
    serde_json::from_str(&response.body).map_err(|e| RpcError::Decode(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn unhealthy_endpoints_recover_after_the_window() {
        let policy = RetryPolicy { health_window: Duration::from_millis(10), ..Default::default() };
        let now = Instant::now();
        let mut health = EndpointHealth { failures: 3, last_failure: Some(now) };
        assert!(!is_healthy(&mut health, now, &policy));
        assert!(is_healthy(&mut health, now + Duration::from_millis(20), &policy));
        assert_eq!(health.failures, 0);
        let mut fresh = EndpointHealth { failures: 2, last_failure: Some(now) };
        assert!(is_healthy(&mut fresh, now, &policy));
    }

    #[test]
    fn urls_are_joined() {
        assert_eq!(join_url("https://api.trongrid.io/", "/v1/accounts"), "https://api.trongrid.io/v1/accounts");
        assert_eq!(join_url("https://rpc.example", ""), "https://rpc.example");
    }
}
