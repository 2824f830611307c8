use thiserror::Error;

use crate::{db_types::Chain, rpc::RpcError};

#[derive(Debug, Clone, Error)]
pub enum ScanError {
    #[error("RPC error. {0}")]
    Rpc(#[from] RpcError),
    #[error("Could not decode the scan response. {0}")]
    Decode(String),
    #[error("{chain} has no token contract configured")]
    MissingContract { chain: Chain },
    #[error("Scans of all {addresses} {chain} addresses failed. Last error: {last_error}")]
    AllAddressesFailed { chain: Chain, addresses: usize, last_error: String },
}
