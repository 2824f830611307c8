//! # Chain scanners
//!
//! A scanner turns one poll of a chain into a list of [`Transfer`]s addressed to watched wallets. There are three
//! strategies, chosen by [`Chain::strategy`]:
//!
//! * [`native`]: Tron account history, for TRX itself.
//! * [`token`]: Tron TRC20 transfer history, scoped to the configured contract.
//! * [`evm`]: `eth_getLogs` over the block range between the listener's cursor and the confirmed head, for every
//!   EVM chain.
//!
//! Passive channels never scan.
//!
//! Scanners only discover transfers. They drop transfers that are already in the transaction log, but recording and
//! matching are left to the [`TransferMatcher`](crate::matcher::TransferMatcher).
mod errors;
pub mod evm;
pub mod native;
pub mod token;

use std::{collections::HashSet, sync::Arc};

pub use errors::ScanError;
use log::*;

use crate::{
    db_types::{Chain, ScanStrategy, Transfer},
    metrics::ScanMetrics,
    rpc::{RpcClient, RpcTransport},
    traits::TransactionLogManagement,
    watcher::ChainListener,
};

#[derive(Clone)]
pub struct ChainScanner<B> {
    db: B,
    metrics: Arc<ScanMetrics>,
}

impl<B: TransactionLogManagement> ChainScanner<B> {
    pub fn new(db: B, metrics: Arc<ScanMetrics>) -> Self {
        Self { db, metrics }
    }

    /// Runs one scan of the listener's chain against the given set of watched addresses.
    pub async fn scan<T: RpcTransport>(
        &self,
        listener: &ChainListener,
        rpc: &RpcClient<T>,
        addresses: &HashSet<String>,
    ) -> Result<Vec<Transfer>, ScanError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let found = match listener.chain().strategy() {
            ScanStrategy::NativeCoin => native::scan(listener, rpc, addresses).await?,
            ScanStrategy::TokenTransfer => token::scan(listener, rpc, addresses).await?,
            ScanStrategy::GenericEvm => evm::scan(listener, rpc, addresses, &self.metrics).await?,
            ScanStrategy::Passive => return Ok(Vec::new()),
        };
        Ok(self.drop_known(listener.chain(), found).await)
    }

    /// Removes transfers that are already in the transaction log, and duplicates within the batch itself.
    async fn drop_known(&self, chain: Chain, transfers: Vec<Transfer>) -> Vec<Transfer> {
        let mut seen = HashSet::with_capacity(transfers.len());
        let mut result = Vec::with_capacity(transfers.len());
        for transfer in transfers {
            if !seen.insert(transfer.tx_hash.clone()) {
                continue;
            }
            match self.db.transaction_exists(&transfer.tx_hash).await {
                Ok(true) => trace!("🔭️ [{chain}] {} has already been processed", transfer.tx_hash),
                Ok(false) => result.push(transfer),
                // The matcher's insert is idempotent, so letting this one through is harmless
                Err(e) => {
                    warn!("🔭️ [{chain}] Could not check the transaction log for {}. {e}", transfer.tx_hash);
                    result.push(transfer);
                },
            }
        }
        result
    }
}

/// Outcome of scanning a set of addresses one by one.
///
/// A failing address is logged and skipped. The scan as a whole only fails if every address failed.
pub(crate) struct PerAddressScan {
    chain: Chain,
    transfers: Vec<Transfer>,
    attempted: usize,
    failed: usize,
    last_error: Option<String>,
}

impl PerAddressScan {
    pub(crate) fn new(chain: Chain) -> Self {
        Self { chain, transfers: Vec::new(), attempted: 0, failed: 0, last_error: None }
    }

    pub(crate) fn record<E: std::fmt::Display>(&mut self, address: &str, result: Result<Vec<Transfer>, E>) {
        self.attempted += 1;
        match result {
            Ok(mut found) => self.transfers.append(&mut found),
            Err(e) => {
                warn!("🔭️ [{}] Scan of {address} failed. {e}", self.chain);
                self.failed += 1;
                self.last_error = Some(e.to_string());
            },
        }
    }

    pub(crate) fn finish(self) -> Result<Vec<Transfer>, ScanError> {
        if self.attempted > 0 && self.failed == self.attempted {
            return Err(ScanError::AllAddressesFailed {
                chain: self.chain,
                addresses: self.attempted,
                last_error: self.last_error.unwrap_or_default(),
            });
        }
        Ok(self.transfers)
    }
}
