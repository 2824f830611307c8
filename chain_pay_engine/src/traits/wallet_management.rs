use std::{collections::HashMap, future::Future};

use crate::{db_types::Chain, traits::StoreError};

pub trait WalletManagement: Clone + Send + Sync {
    /// All addresses on the given chain that are currently active and must be watched.
    fn fetch_active_addresses(&self, chain: Chain) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Number of active wallets per chain. Chains with no wallets may be absent from the map.
    fn count_active_wallets(&self) -> impl Future<Output = Result<HashMap<Chain, i64>, StoreError>> + Send;
}
