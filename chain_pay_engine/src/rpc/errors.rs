use thiserror::Error;

use crate::{db_types::Chain, rpc::JsonRpcError};

#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("No RPC endpoints are configured for {0}")]
    NoEndpoints(Chain),
    #[error("All {endpoints} RPC endpoints for {chain} are exhausted. Last error: {last_error}")]
    AllEndpointsExhausted { chain: Chain, endpoints: usize, last_error: String },
    #[error("RPC endpoint responded with HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("{0}")]
    JsonRpc(#[from] JsonRpcError),
    #[error("Could not decode the RPC response: {0}")]
    Decode(String),
    #[error("Could not create the HTTP transport: {0}")]
    Transport(String),
}
