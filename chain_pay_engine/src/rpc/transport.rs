use std::{future::Future, time::Duration};

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResponse {
    pub status: u16,
    pub body: String,
}

impl RpcResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    /// Server errors and rate limiting are worth another attempt. Anything else is the final answer.
    pub fn is_retryable(&self) -> bool {
        self.status >= 500 || self.status == 429
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Transport error: {0}")]
pub struct TransportError(pub String);

pub trait RpcTransport: Clone + Send + Sync + 'static {
    fn get(&self, url: &str) -> impl Future<Output = Result<RpcResponse, TransportError>> + Send;

    fn post_json(&self, url: &str, body: String) -> impl Future<Output = Result<RpcResponse, TransportError>> + Send;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }

    async fn into_response(response: reqwest::Response) -> Result<RpcResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| TransportError(e.to_string()))?;
        Ok(RpcResponse { status, body })
    }
}

impl RpcTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<RpcResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        Self::into_response(response).await
    }

    async fn post_json(&self, url: &str, body: String) -> Result<RpcResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        Self::into_response(response).await
    }
}
