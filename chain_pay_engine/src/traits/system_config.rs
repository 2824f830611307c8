use std::future::Future;

use crate::{db_types::Chain, traits::StoreError};

pub trait SystemConfigManagement: Clone + Send + Sync {
    fn fetch_config_value(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Inserts or replaces a configuration value.
    fn store_config_value(&self, key: &str, value: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Whether a passive channel accepts push payments. Channels with no stored flag are enabled.
    fn passive_channel_enabled(&self, chain: Chain) -> impl Future<Output = Result<bool, StoreError>> + Send {
        async move {
            let Some(key) = chain.passive_flag_key() else {
                return Ok(false);
            };
            let value = self.fetch_config_value(&key).await?;
            Ok(value.map(|v| v == "1" || v == "true").unwrap_or(true))
        }
    }

    fn set_passive_channel_enabled(
        &self,
        chain: Chain,
        enabled: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            let key = chain
                .passive_flag_key()
                .ok_or_else(|| StoreError::InvalidData(format!("{chain} is not a passive channel")))?;
            self.store_config_value(&key, if enabled { "1" } else { "0" }).await
        }
    }
}
