use std::{collections::HashMap, num::NonZeroU32};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use log::trace;
use reqwest::Url;

/// Token bucket settings for one RPC provider, identified by substrings of the endpoint host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderQuota {
    pub name: &'static str,
    pub host_patterns: &'static [&'static str],
    pub per_second: u32,
    pub burst: u32,
}

impl ProviderQuota {
    fn matches(&self, host: &str) -> bool {
        self.host_patterns.iter().any(|p| host.contains(p))
    }

    fn limiter(&self) -> DefaultDirectRateLimiter {
        let rate = NonZeroU32::new(self.per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst).unwrap_or(rate);
        RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))
    }
}

pub const PROVIDER_QUOTAS: &[ProviderQuota] = &[
    ProviderQuota { name: "trongrid", host_patterns: &["trongrid.io"], per_second: 5, burst: 10 },
    ProviderQuota { name: "infura", host_patterns: &["infura.io"], per_second: 10, burst: 20 },
    ProviderQuota { name: "bsc", host_patterns: &["binance.org", "bsc-dataseed"], per_second: 10, burst: 20 },
    ProviderQuota { name: "polygon", host_patterns: &["polygon"], per_second: 10, burst: 20 },
    ProviderQuota { name: "optimism", host_patterns: &["optimism"], per_second: 10, burst: 20 },
    ProviderQuota { name: "arbitrum", host_patterns: &["arbitrum"], per_second: 10, burst: 20 },
    ProviderQuota { name: "base", host_patterns: &["base.org"], per_second: 10, burst: 20 },
];

/// Unknown hosts share one conservative bucket.
pub const GENERIC_QUOTA: ProviderQuota =
    ProviderQuota { name: "generic", host_patterns: &[], per_second: 5, burst: 10 };

/// One token bucket per provider, shared by every RPC client in the process.
pub struct RateLimiters {
    providers: Vec<ProviderQuota>,
    generic: ProviderQuota,
    buckets: HashMap<&'static str, DefaultDirectRateLimiter>,
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::with_quotas(PROVIDER_QUOTAS.to_vec(), GENERIC_QUOTA)
    }
}

impl RateLimiters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quotas(providers: Vec<ProviderQuota>, generic: ProviderQuota) -> Self {
        let mut buckets = HashMap::with_capacity(providers.len() + 1);
        for quota in providers.iter().chain(std::iter::once(&generic)) {
            buckets.entry(quota.name).or_insert_with(|| quota.limiter());
        }
        Self { providers, generic, buckets }
    }

    /// The quota that applies to an endpoint URL.
    pub fn quota_for(&self, endpoint: &str) -> &ProviderQuota {
        let host = Url::parse(endpoint)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .unwrap_or_else(|| endpoint.to_ascii_lowercase());
        self.providers.iter().find(|q| q.matches(&host)).unwrap_or(&self.generic)
    }

    /// Waits until the endpoint's provider has a token available.
    pub async fn until_ready(&self, endpoint: &str) {
        let quota = self.quota_for(endpoint);
        if let Some(bucket) = self.buckets.get(quota.name) {
            if bucket.check().is_err() {
                trace!("🔄️ Rate limit reached for {}. Waiting for a token", quota.name);
                bucket.until_ready().await;
            }
        }
    }
}
