use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::rpc::RpcError;

/// JSON-RPC internal error code, used for batch entries the node silently dropped.
const MISSING_RESPONSE_CODE: i64 = -32603;

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self { jsonrpc: "2.0", id, method: method.to_string(), params }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("JSON-RPC error {code}: {message}")]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub(crate) fn missing(id: u64) -> Self {
        let error = JsonRpcError { code: MISSING_RESPONSE_CODE, message: "No response in batch".to_string() };
        Self { id: Some(id), result: None, error: Some(error) }
    }

    pub fn into_result<R: DeserializeOwned>(self) -> Result<R, RpcError> {
        if let Some(e) = self.error {
            return Err(RpcError::JsonRpc(e));
        }
        let result = self.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| RpcError::Decode(e.to_string()))
    }
}

/// Pairs batch responses with their requests. The output has one entry per request, in request order, whatever order
/// the node answered in.
pub(crate) fn align_batch(requests: &[JsonRpcRequest], responses: Vec<JsonRpcResponse>) -> Vec<JsonRpcResponse> {
    let mut responses = responses;
    requests
        .iter()
        .map(|req| match responses.iter().position(|r| r.id == Some(req.id)) {
            Some(pos) => responses.swap_remove(pos),
            None => JsonRpcResponse::missing(req.id),
        })
        .collect()
}
