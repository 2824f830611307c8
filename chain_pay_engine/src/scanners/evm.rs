//! ERC20 `Transfer` logs on EVM chains.
//!
//! Each scan covers the blocks after the listener's cursor up to the confirmed head, `head - confirmations`. One
//! `eth_getLogs` request per watched address is sent as a single JSON-RPC batch, filtering on the token contract and
//! the recipient topic. The chain cursor advances once the batch comes back. An address whose request failed is
//! remembered by the listener and rescanned from its first missed block on later passes, so one bad query cannot
//! hold back the rest of the chain. The reported scan height is the lowest block every address has reached.
use std::collections::HashSet;

use log::*;
use serde::Deserialize;
use serde_json::json;

use crate::{
    db_types::Transfer,
    helpers::{parse_hex_amount, parse_hex_u64, to_hex_quantity},
    metrics::ScanMetrics,
    rpc::{JsonRpcRequest, RpcClient, RpcTransport},
    scanners::ScanError,
    watcher::ChainListener,
};

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
/// Blocks to look back on the first scan after start-up.
pub const INITIAL_LOOKBACK: u64 = 100;
/// Upper bound on the number of blocks covered by one scan. Most providers reject larger `eth_getLogs` ranges.
pub const MAX_BLOCK_RANGE: u64 = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct EvmLog {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

/// Left-pads a 20-byte address into a 32-byte topic.
pub fn address_topic(address: &str) -> Option<String> {
    let bare = address.trim().trim_start_matches("0x").to_ascii_lowercase();
    (bare.len() == 40 && bare.bytes().all(|b| b.is_ascii_hexdigit())).then(|| format!("0x{bare:0>64}"))
}

/// The address held in the last 20 bytes of a 32-byte topic.
pub fn topic_address(topic: &str) -> Option<String> {
    let bare = topic.trim_start_matches("0x");
    (bare.len() == 64 && bare.is_ascii()).then(|| format!("0x{}", bare[24..].to_ascii_lowercase()))
}

pub async fn scan<T: RpcTransport>(
    listener: &ChainListener,
    rpc: &RpcClient<T>,
    addresses: &HashSet<String>,
    metrics: &ScanMetrics,
) -> Result<Vec<Transfer>, ScanError> {
    let chain = listener.chain();
    let contract = listener.contract_address().ok_or(ScanError::MissingContract { chain })?;
    let head: String = rpc.call("eth_blockNumber", json!([])).await?;
    let head = parse_hex_u64(&head).map_err(|e| ScanError::Decode(e.to_string()))?;
    listener.detect_reorg(head);
    listener.retain_lagging(|address| addresses.contains(address));
    let confirmations = listener.confirmations();
    let safe = head.saturating_sub(confirmations);
    let mut last = listener.last_block();
    if last == 0 {
        last = safe.saturating_sub(INITIAL_LOOKBACK);
        listener.set_last_block(last);
        debug!("🔭️ [{chain}] First scan. Starting from block {last}");
    }
    metrics.record_block_heights(chain, head, listener.scanned_through(), confirmations);
    let from_block = last + 1;
    let to_block = safe.min(last + MAX_BLOCK_RANGE).max(last);
    if last >= safe && listener.scanned_through() >= last {
        trace!("🔭️ [{chain}] No new confirmed blocks. Head is {head}, cursor at {last}");
        return Ok(Vec::new());
    }

    let mut requests = Vec::with_capacity(addresses.len());
    let mut ranges = Vec::with_capacity(addresses.len());
    for address in addresses {
        let Some(topic) = address_topic(address) else {
            warn!("🔭️ [{chain}] {address} is not a valid EVM address. Skipping it");
            continue;
        };
        let from = listener.lagging_from(address).map_or(from_block, |b| b.min(from_block));
        let to = to_block.min(from + MAX_BLOCK_RANGE - 1);
        if from > to {
            continue;
        }
        let filter = json!({
            "fromBlock": to_hex_quantity(from),
            "toBlock": to_hex_quantity(to),
            "address": contract,
            "topics": [TRANSFER_TOPIC, null, topic],
        });
        requests.push(JsonRpcRequest::new(requests.len() as u64 + 1, "eth_getLogs", json!([filter])));
        ranges.push((address.as_str(), from, to));
    }
    if requests.is_empty() {
        listener.set_last_block(to_block);
        return Ok(Vec::new());
    }
    let responses = rpc.batch_call(&requests).await?;

    let mut transfers = Vec::new();
    let mut failed = 0usize;
    for ((address, from, to), response) in ranges.into_iter().zip(responses) {
        match response.into_result::<Vec<EvmLog>>() {
            Ok(logs) => {
                transfers.extend(logs.into_iter().filter_map(|log| decode_log(listener, log, addresses)));
                listener.record_address_progress(address, to, to_block);
            },
            Err(e) => {
                warn!("🔭️ [{chain}] eth_getLogs for {address} over blocks {from}-{to} failed. {e}");
                metrics.record_error(chain, &e.to_string());
                listener.record_address_failure(address, from);
                failed += 1;
            },
        }
    }
    listener.set_last_block(to_block);
    let scanned_through = listener.scanned_through();
    metrics.record_block_heights(chain, head, scanned_through, confirmations);
    if failed > 0 {
        // Rescanning a range is safe: already logged transfers are skipped.
        let resume = scanned_through + 1;
        info!("🔭️ [{chain}] {failed} log queries failed. Those addresses will be rescanned from block {resume}");
    }
    debug!("🔭️ [{chain}] Blocks {from_block}-{to_block}: {} transfers to watched wallets", transfers.len());
    Ok(transfers)
}

/// Decodes a `Transfer` log. Returns `None` for removed logs, malformed logs and logs to unwatched addresses.
pub fn decode_log(listener: &ChainListener, log: EvmLog, watched: &HashSet<String>) -> Option<Transfer> {
    let chain = listener.chain();
    if log.removed || log.topics.len() < 3 || !log.topics[0].eq_ignore_ascii_case(TRANSFER_TOPIC) {
        return None;
    }
    let from_address = topic_address(&log.topics[1])?;
    let to_address = topic_address(&log.topics[2])?;
    if !watched.contains(&to_address) {
        return None;
    }
    let amount = match parse_hex_amount(&log.data, listener.token_decimals()) {
        Ok(a) => a,
        Err(e) => {
            debug!("🔭️ [{chain}] Skipping log in {}. {e}", log.transaction_hash);
            return None;
        },
    };
    let block_number = log.block_number.as_deref().and_then(|b| parse_hex_u64(b).ok()).unwrap_or_default();
    Some(Transfer {
        chain,
        tx_hash: log.transaction_hash.to_ascii_lowercase(),
        from_address,
        to_address,
        amount,
        block_number,
    })
}
