use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use log::*;
use parking_lot::RwLock;

use crate::{
    db_types::Chain,
    helpers::normalize_address,
    traits::{StoreError, WalletManagement},
};

#[derive(Debug, Clone)]
struct CacheEntry {
    addresses: Arc<HashSet<String>>,
    /// `None` once the entry has been invalidated.
    refreshed_at: Option<Instant>,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.refreshed_at.map(|t| t.elapsed() < ttl).unwrap_or(false)
    }
}

/// Per-chain set of watched addresses, refreshed from the database at most once per TTL.
///
/// Addresses are stored in their canonical form (see [`normalize_address`]) so that scanners can compare them
/// directly against decoded transfer destinations. If a refresh fails, the last known set is served instead.
pub struct WalletCache<B> {
    db: B,
    ttl: Duration,
    entries: RwLock<HashMap<Chain, CacheEntry>>,
}

impl<B: WalletManagement> WalletCache<B> {
    pub fn new(db: B, ttl: Duration) -> Self {
        Self { db, ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The watched addresses for `chain`.
    pub async fn addresses(&self, chain: Chain) -> Result<Arc<HashSet<String>>, StoreError> {
        let cached = self.entries.read().get(&chain).cloned();
        if let Some(entry) = &cached {
            if entry.is_fresh(self.ttl) {
                return Ok(Arc::clone(&entry.addresses));
            }
        }
        match self.db.fetch_active_addresses(chain).await {
            Ok(rows) => {
                let addresses = Arc::new(canonical_set(chain, rows));
                trace!("🔭️ [{chain}] Wallet cache refreshed with {} addresses", addresses.len());
                let entry = CacheEntry { addresses: Arc::clone(&addresses), refreshed_at: Some(Instant::now()) };
                self.entries.write().insert(chain, entry);
                Ok(addresses)
            },
            Err(e) => match cached {
                Some(entry) => {
                    warn!("🔭️ [{chain}] Could not refresh watched wallets. Using the previous set. {e}");
                    Ok(entry.addresses)
                },
                None => Err(e),
            },
        }
    }

    /// Forces the next lookup on every chain to go to the database. Cached sets are kept as a fallback.
    pub fn invalidate(&self) {
        let mut entries = self.entries.write();
        for entry in entries.values_mut() {
            entry.refreshed_at = None;
        }
        debug!("🔭️ Wallet cache invalidated");
    }

    /// Number of cached addresses for `chain`, without touching the database.
    pub fn cached_count(&self, chain: Chain) -> Option<usize> {
        self.entries.read().get(&chain).map(|e| e.addresses.len())
    }
}

fn canonical_set(chain: Chain, rows: Vec<String>) -> HashSet<String> {
    rows.into_iter()
        .filter_map(|address| match normalize_address(chain, &address) {
            Ok(a) => Some(a),
            Err(e) => {
                warn!("🔭️ [{chain}] Ignoring watched address {address}. {e}");
                None
            },
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    #[derive(Clone, Default)]
    struct FakeWallets {
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    impl WalletManagement for FakeWallets {
        async fn fetch_active_addresses(&self, _chain: Chain) -> Result<Vec<String>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::DatabaseError("offline".into()));
            }
            Ok(vec![
                "0xABCDEF0000000000000000000000000000000001".to_string(),
                " 0xabcdef0000000000000000000000000000000001".to_string(),
            ])
        }

        async fn count_active_wallets(&self) -> Result<HashMap<Chain, i64>, StoreError> {
            Ok(HashMap::new())
        }
    }

    #[tokio::test]
    async fn addresses_are_cached_and_normalized() {
        let db = FakeWallets::default();
        let cache = WalletCache::new(db.clone(), Duration::from_secs(60));
        let addresses = cache.addresses(Chain::Base).await.unwrap();
        assert_eq!(addresses.len(), 1);
        assert!(addresses.contains("0xabcdef0000000000000000000000000000000001"));
        let _ = cache.addresses(Chain::Base).await.unwrap();
        assert_eq!(db.calls.load(Ordering::SeqCst), 1);
        cache.invalidate();
        let _ = cache.addresses(Chain::Base).await.unwrap();
        assert_eq!(db.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stale_set_is_served_when_the_database_fails() {
        let db = FakeWallets::default();
        let cache = WalletCache::new(db.clone(), Duration::from_millis(1));
        assert!(cache.addresses(Chain::Polygon).await.is_ok());
        db.fail.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let addresses = cache.addresses(Chain::Polygon).await.unwrap();
        assert_eq!(addresses.len(), 1);
        assert!(cache.addresses(Chain::Erc20).await.is_err());
    }
}
