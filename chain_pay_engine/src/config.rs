//! Watcher configuration.
//!
//! Every chain starts from a built-in default and can be overridden through environment variables named after the
//! chain, e.g. for BEP20:
//!
//! | variable | meaning |
//! |---|---|
//! | `CPG_BEP20_ENABLED` | `1`/`true` to poll the chain at start-up |
//! | `CPG_BEP20_RPC` | comma-separated list of RPC endpoints, tried in order |
//! | `CPG_BEP20_CONTRACT` | token contract address |
//! | `CPG_BEP20_CONFIRMATIONS` | confirmation depth |
//! | `CPG_BEP20_SCAN_INTERVAL` | base scan interval in seconds |
//! | `CPG_BEP20_TOKEN_DECIMALS` | token decimals |
//!
//! Global settings are `CPG_WALLET_CACHE_TTL` and `CPG_GAS_PRICE_INTERVAL` (seconds) and `CPG_RPC_TIMEOUT` (seconds).
//! Passive channels (WeChat, Alipay) are not configured here: their enabled flag lives in the database.
use std::{env, time::Duration};

use cpg_common::{parse_boolean_flag, parse_list, parse_seconds};
use log::*;

use crate::{db_types::Chain, rpc::RetryPolicy};

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_WALLET_CACHE_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_GAS_PRICE_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain: Chain,
    pub enabled: bool,
    pub rpc_endpoints: Vec<String>,
    pub contract_address: Option<String>,
    pub confirmations: u64,
    pub scan_interval: Duration,
    pub token_decimals: u32,
}

impl ChainConfig {
    fn new(chain: Chain, enabled: bool, rpc: &str, contract: Option<&str>, confirmations: u64, decimals: u32) -> Self {
        Self {
            chain,
            enabled,
            rpc_endpoints: vec![rpc.to_string()],
            contract_address: contract.map(String::from),
            confirmations,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            token_decimals: decimals,
        }
    }

    /// The built-in configuration for an actively polled chain. Passive channels have none.
    pub fn default_for(chain: Chain) -> Option<Self> {
        use Chain::*;
        let config = match chain {
            Trx => Self::new(Trx, true, "https://api.trongrid.io", None, 19, 6),
            Trc20 => {
                Self::new(Trc20, true, "https://api.trongrid.io", Some("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"), 19, 6)
            },
            Erc20 => Self::new(
                Erc20,
                false,
                "https://mainnet.infura.io/v3/YOUR-PROJECT-ID",
                Some("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
                12,
                6,
            ),
            // BSC-USD is an 18 decimal token
            Bep20 => Self::new(
                Bep20,
                true,
                "https://bsc-dataseed.binance.org",
                Some("0x55d398326f99059fF775485246999027B3197955"),
                15,
                18,
            ),
            Polygon => Self::new(
                Polygon,
                true,
                "https://polygon-rpc.com",
                Some("0xc2132D05D31c914a87C6611C10748AEb04B58e8F"),
                128,
                6,
            ),
            Optimism => Self::new(
                Optimism,
                true,
                "https://mainnet.optimism.io",
                Some("0x94b008aA00579c1307B0EF2c499aD98a8ce58e58"),
                10,
                6,
            ),
            Arbitrum => Self::new(
                Arbitrum,
                true,
                "https://arb1.arbitrum.io/rpc",
                Some("0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
                10,
                6,
            ),
            Avalanche => Self::new(
                Avalanche,
                false,
                "https://api.avax.network/ext/bc/C/rpc",
                Some("0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7"),
                12,
                6,
            ),
            Base => Self::new(
                Base,
                true,
                "https://mainnet.base.org",
                Some("0xfde4C96c8593536E31F229EA8f37b2ADa2699bb2"),
                10,
                6,
            ),
            Wechat | Alipay => return None,
        };
        Some(config)
    }

    fn env_prefix(chain: Chain) -> String {
        format!("CPG_{}", chain.as_str().to_ascii_uppercase())
    }

    /// Applies any overrides found through `var`. Invalid values are logged and ignored.
    fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, var: &F) {
        let prefix = Self::env_prefix(self.chain);
        self.enabled = parse_boolean_flag(var(&format!("{prefix}_ENABLED")), self.enabled);
        if let Some(rpc) = var(&format!("{prefix}_RPC")) {
            let endpoints = parse_list(&rpc);
            if endpoints.is_empty() {
                warn!("🪛️ {prefix}_RPC is empty. Keeping the default endpoints for {}", self.chain);
            } else {
                self.rpc_endpoints = endpoints;
            }
        }
        if let Some(contract) = var(&format!("{prefix}_CONTRACT")) {
            let contract = contract.trim();
            self.contract_address = (!contract.is_empty()).then(|| contract.to_string());
        }
        if let Some(s) = var(&format!("{prefix}_CONFIRMATIONS")) {
            match s.trim().parse::<u64>() {
                Ok(v) => self.confirmations = v,
                Err(e) => {
                    warn!("🪛️ {s} is not a valid value for {prefix}_CONFIRMATIONS. {e}. Using {}", self.confirmations)
                },
            }
        }
        if let Some(s) = var(&format!("{prefix}_SCAN_INTERVAL")) {
            match parse_seconds(&s) {
                Ok(v) => self.scan_interval = v,
                Err(e) => warn!("🪛️ {prefix}_SCAN_INTERVAL: {e}. Using {}s", self.scan_interval.as_secs()),
            }
        }
        if let Some(s) = var(&format!("{prefix}_TOKEN_DECIMALS")) {
            match s.trim().parse::<u32>() {
                Ok(v) if v <= 28 => self.token_decimals = v,
                _ => warn!("🪛️ {s} is not a valid value for {prefix}_TOKEN_DECIMALS. Using {}", self.token_decimals),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Actively polled chains. Passive channels are never listed here.
    pub chains: Vec<ChainConfig>,
    pub wallet_cache_ttl: Duration,
    pub gas_price_interval: Duration,
    pub rpc_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            chains: Chain::ALL.iter().filter_map(|c| ChainConfig::default_for(*c)).collect(),
            wallet_cache_ttl: DEFAULT_WALLET_CACHE_TTL,
            gas_price_interval: DEFAULT_GAS_PRICE_INTERVAL,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl WatcherConfig {
    pub fn from_env_or_default() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_vars<F: Fn(&str) -> Option<String>>(var: F) -> Self {
        let mut config = Self::default();
        for chain in config.chains.iter_mut() {
            chain.apply_overrides(&var);
        }
        let seconds = |name: &str, default: Duration| match var(name) {
            Some(s) => parse_seconds(&s).unwrap_or_else(|e| {
                warn!("🪛️ {name}: {e}. Using the default of {}s", default.as_secs());
                default
            }),
            None => default,
        };
        config.wallet_cache_ttl = seconds("CPG_WALLET_CACHE_TTL", DEFAULT_WALLET_CACHE_TTL);
        config.gas_price_interval = seconds("CPG_GAS_PRICE_INTERVAL", DEFAULT_GAS_PRICE_INTERVAL);
        config.rpc_timeout = seconds("CPG_RPC_TIMEOUT", DEFAULT_RPC_TIMEOUT);
        let enabled = config.chains.iter().filter(|c| c.enabled).map(|c| c.chain.as_str()).collect::<Vec<_>>();
        info!("🪛️ Chains enabled at start-up: {}", enabled.join(", "));
        config
    }

    pub fn chain(&self, chain: Chain) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain == chain)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_cover_every_active_chain() {
        let config = WatcherConfig::default();
        assert_eq!(config.chains.len(), 9);
        assert!(config.chain(Chain::Wechat).is_none());
        let polygon = config.chain(Chain::Polygon).unwrap();
        assert_eq!(polygon.confirmations, 128);
        assert_eq!(polygon.scan_interval, Duration::from_secs(15));
        assert!(!config.chain(Chain::Erc20).unwrap().enabled);
        assert_eq!(config.chain(Chain::Bep20).unwrap().token_decimals, 18);
        assert_eq!(config.chain(Chain::Trx).unwrap().contract_address, None);
        assert_eq!(config.wallet_cache_ttl, Duration::from_secs(30));
    }

    #[test]
    fn overrides_from_variables() {
        let config = WatcherConfig::from_vars(vars(&[
            ("CPG_ERC20_ENABLED", "true"),
            ("CPG_ERC20_RPC", "https://a.example, https://b.example"),
            ("CPG_ERC20_CONFIRMATIONS", "6"),
            ("CPG_ERC20_SCAN_INTERVAL", "30"),
            ("CPG_BASE_CONTRACT", "0xabc"),
            ("CPG_WALLET_CACHE_TTL", "5"),
        ]));
        let erc20 = config.chain(Chain::Erc20).unwrap();
        assert!(erc20.enabled);
        assert_eq!(erc20.rpc_endpoints, vec!["https://a.example", "https://b.example"]);
        assert_eq!(erc20.confirmations, 6);
        assert_eq!(erc20.scan_interval, Duration::from_secs(30));
        assert_eq!(config.chain(Chain::Base).unwrap().contract_address.as_deref(), Some("0xabc"));
        assert_eq!(config.wallet_cache_ttl, Duration::from_secs(5));
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let config = WatcherConfig::from_vars(vars(&[
            ("CPG_TRX_CONFIRMATIONS", "many"),
            ("CPG_TRX_SCAN_INTERVAL", "0"),
            ("CPG_TRX_RPC", " , "),
            ("CPG_GAS_PRICE_INTERVAL", "soon"),
        ]));
        let trx = config.chain(Chain::Trx).unwrap();
        assert_eq!(trx.confirmations, 19);
        assert_eq!(trx.scan_interval, DEFAULT_SCAN_INTERVAL);
        assert_eq!(trx.rpc_endpoints, vec!["https://api.trongrid.io"]);
        assert_eq!(config.gas_price_interval, DEFAULT_GAS_PRICE_INTERVAL);
    }
}
