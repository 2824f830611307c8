use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::db_types::Chain;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GasPrice {
    pub gwei: f64,
    pub updated_at: DateTime<Utc>,
}

/// Latest known gas price of each EVM chain. Purely informational.
#[derive(Debug, Default)]
pub struct GasPriceBook {
    prices: RwLock<BTreeMap<Chain, GasPrice>>,
}

impl GasPriceBook {
    pub fn record(&self, chain: Chain, gwei: f64) {
        self.prices.write().insert(chain, GasPrice { gwei, updated_at: Utc::now() });
    }

    pub fn get(&self, chain: Chain) -> Option<GasPrice> {
        self.prices.read().get(&chain).copied()
    }

    pub fn all(&self) -> BTreeMap<Chain, GasPrice> {
        self.prices.read().clone()
    }
}
