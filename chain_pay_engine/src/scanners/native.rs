//! TRX transfers, read from the TronGrid account history of each watched address.
use std::collections::HashSet;

use log::*;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    db_types::Transfer,
    helpers::{from_subunits, hex_to_base58},
    rpc::{RpcClient, RpcTransport},
    scanners::{PerAddressScan, ScanError},
    watcher::ChainListener,
};

pub const PAGE_LIMIT: usize = 50;
const TRANSFER_CONTRACT: &str = "TransferContract";
const SUCCESS: &str = "SUCCESS";
const SUN_DECIMALS: u32 = 6;

#[derive(Debug, Deserialize)]
pub struct TronTransactionPage {
    #[serde(default)]
    pub data: Vec<TronTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct TronTransaction {
    #[serde(rename = "txID")]
    pub tx_id: String,
    #[serde(rename = "blockNumber", default)]
    pub block_number: u64,
    #[serde(default)]
    pub ret: Vec<TronResult>,
    pub raw_data: Option<TronRawData>,
}

#[derive(Debug, Deserialize)]
pub struct TronResult {
    #[serde(rename = "contractRet", default)]
    pub contract_ret: String,
}

#[derive(Debug, Deserialize)]
pub struct TronRawData {
    #[serde(default)]
    pub contract: Vec<TronContract>,
}

#[derive(Debug, Deserialize)]
pub struct TronContract {
    #[serde(rename = "type")]
    pub kind: String,
    /// The shape of the parameter depends on the contract type, so it is only decoded for transfers.
    #[serde(default)]
    pub parameter: Value,
}

#[derive(Debug, Deserialize)]
struct TransferValue {
    amount: i64,
    owner_address: String,
    to_address: String,
}

impl TronTransaction {
    fn succeeded(&self) -> bool {
        self.ret.first().map(|r| r.contract_ret == SUCCESS).unwrap_or(false)
    }
}

pub async fn scan<T: RpcTransport>(
    listener: &ChainListener,
    rpc: &RpcClient<T>,
    addresses: &HashSet<String>,
) -> Result<Vec<Transfer>, ScanError> {
    let chain = listener.chain();
    let mut scan = PerAddressScan::new(chain);
    for address in addresses {
        let path = format!("v1/accounts/{address}/transactions?only_confirmed=true&limit={PAGE_LIMIT}");
        let result = rpc.get_json::<TronTransactionPage>(&path).await;
        scan.record(address, result.map(|page| extract_transfers(listener, page, addresses)));
    }
    scan.finish()
}

/// Successful native transfers in `page` whose destination is one of `watched`.
pub fn extract_transfers(
    listener: &ChainListener,
    page: TronTransactionPage,
    watched: &HashSet<String>,
) -> Vec<Transfer> {
    let chain = listener.chain();
    let mut transfers = Vec::new();
    for tx in page.data {
        if !tx.succeeded() {
            continue;
        }
        let Some(contract) = tx.raw_data.as_ref().and_then(|r| r.contract.first()) else {
            continue;
        };
        if contract.kind != TRANSFER_CONTRACT {
            continue;
        }
        let value = match serde_json::from_value::<TransferValue>(contract.parameter["value"].clone()) {
            Ok(v) => v,
            Err(e) => {
                debug!("🔭️ [{chain}] Skipping {}. Unexpected transfer parameters. {e}", tx.tx_id);
                continue;
            },
        };
        let to_address = match hex_to_base58(&value.to_address) {
            Ok(a) => a,
            Err(e) => {
                debug!("🔭️ [{chain}] Skipping {}. {e}", tx.tx_id);
                continue;
            },
        };
        if !watched.contains(&to_address) {
            continue;
        }
        let from_address = hex_to_base58(&value.owner_address).unwrap_or(value.owner_address);
        let amount = match from_subunits(value.amount, SUN_DECIMALS) {
            Ok(a) => a,
            Err(e) => {
                debug!("🔭️ [{chain}] Skipping {}. {e}", tx.tx_id);
                continue;
            },
        };
        transfers.push(Transfer {
            chain,
            tx_hash: tx.tx_id,
            from_address,
            to_address,
            amount,
            block_number: tx.block_number,
        });
    }
    transfers
}
