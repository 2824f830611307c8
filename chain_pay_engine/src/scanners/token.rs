//! TRC20 transfers, read from the TronGrid token history of each watched address.
use std::collections::HashSet;

use log::*;
use serde::Deserialize;

use crate::{
    db_types::Transfer,
    helpers::{hex_to_base58, parse_token_amount},
    rpc::{RpcClient, RpcTransport},
    scanners::{PerAddressScan, ScanError},
    watcher::ChainListener,
};

pub const PAGE_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct Trc20TransferPage {
    #[serde(default)]
    pub data: Vec<Trc20Transfer>,
}

#[derive(Debug, Deserialize)]
pub struct Trc20Transfer {
    pub transaction_id: String,
    pub from: String,
    pub to: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub token_info: Option<TokenInfo>,
}

#[derive(Debug, Deserialize)]
pub struct TokenInfo {
    pub decimals: Option<u32>,
}

pub async fn scan<T: RpcTransport>(
    listener: &ChainListener,
    rpc: &RpcClient<T>,
    addresses: &HashSet<String>,
) -> Result<Vec<Transfer>, ScanError> {
    let chain = listener.chain();
    let contract = listener.contract_address().ok_or(ScanError::MissingContract { chain })?;
    let mut scan = PerAddressScan::new(chain);
    for address in addresses {
        let path = format!(
            "v1/accounts/{address}/transactions/trc20?only_confirmed=true&limit={PAGE_LIMIT}&contract_address={contract}"
        );
        let result = rpc.get_json::<Trc20TransferPage>(&path).await;
        scan.record(address, result.map(|page| extract_transfers(listener, page, addresses)));
    }
    scan.finish()
}

/// Token transfers in `page` whose destination is one of `watched`. The history does not carry block numbers, so
/// they are reported as zero.
pub fn extract_transfers(
    listener: &ChainListener,
    page: Trc20TransferPage,
    watched: &HashSet<String>,
) -> Vec<Transfer> {
    let chain = listener.chain();
    let mut transfers = Vec::new();
    for item in page.data {
        if item.kind.as_deref().map(|k| k != "Transfer").unwrap_or(false) {
            continue;
        }
        let to_address = match hex_to_base58(&item.to) {
            Ok(a) => a,
            Err(e) => {
                debug!("🔭️ [{chain}] Skipping {}. {e}", item.transaction_id);
                continue;
            },
        };
        if !watched.contains(&to_address) {
            continue;
        }
        let decimals = item.token_info.as_ref().and_then(|t| t.decimals).unwrap_or(listener.token_decimals());
        let amount = match parse_token_amount(&item.value, decimals) {
            Ok(a) => a,
            Err(e) => {
                debug!("🔭️ [{chain}] Skipping {}. {e}", item.transaction_id);
                continue;
            },
        };
        let from_address = hex_to_base58(&item.from).unwrap_or(item.from);
        transfers.push(Transfer {
            chain,
            tx_hash: item.transaction_id,
            from_address,
            to_address,
            amount,
            block_number: 0,
        });
    }
    transfers
}
