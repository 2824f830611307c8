use std::{env, time::Duration};

use chain_pay_engine::WatcherConfig;
use cpg_common::{parse_boolean_flag, parse_seconds, Secret};
use log::*;

const DEFAULT_CPG_HOST: &str = "127.0.0.1";
const DEFAULT_CPG_PORT: u16 = 6088;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/chain_pay.db";
const DEFAULT_ORDER_EXPIRY_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub push: PushConfig,
    /// How often pending orders past their expiry time are swept.
    pub order_expiry_interval: Duration,
    pub watcher: WatcherConfig,
}

/// Settings for the passive channel push endpoint.
#[derive(Clone, Debug, Default)]
pub struct PushConfig {
    /// Shared with the payment-app companion. Pushes are signed with HMAC-SHA256 over the request body.
    pub hmac_secret: Secret<String>,
    /// If false, push signatures are not checked. **DANGER**
    pub hmac_checks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CPG_HOST.to_string(),
            port: DEFAULT_CPG_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            push: PushConfig { hmac_secret: Secret::default(), hmac_checks: true },
            order_expiry_interval: DEFAULT_ORDER_EXPIRY_CHECK_INTERVAL,
            watcher: WatcherConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    pub fn from_vars<F: Fn(&str) -> Option<String>>(var: F) -> Self {
        let host = var("CPG_HOST").unwrap_or_else(|| DEFAULT_CPG_HOST.into());
        let port = var("CPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for CPG_PORT. {e} Using the default, {DEFAULT_CPG_PORT}, instead."
                    );
                    DEFAULT_CPG_PORT
                })
            })
            .unwrap_or(DEFAULT_CPG_PORT);
        let database_url = var("CPG_DATABASE_URL").unwrap_or_else(|| {
            warn!("🪛️ CPG_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        let push = PushConfig::from_vars(&var);
        let order_expiry_interval = match var("CPG_ORDER_EXPIRY_CHECK_INTERVAL") {
            Some(s) => parse_seconds(&s).unwrap_or_else(|e| {
                warn!(
                    "🪛️ CPG_ORDER_EXPIRY_CHECK_INTERVAL: {e}. Using the default of {}s",
                    DEFAULT_ORDER_EXPIRY_CHECK_INTERVAL.as_secs()
                );
                DEFAULT_ORDER_EXPIRY_CHECK_INTERVAL
            }),
            None => DEFAULT_ORDER_EXPIRY_CHECK_INTERVAL,
        };
        let watcher = WatcherConfig::from_vars(&var);
        Self { host, port, database_url, push, order_expiry_interval, watcher }
    }
}

impl PushConfig {
    fn from_vars<F: Fn(&str) -> Option<String>>(var: &F) -> Self {
        let hmac_checks = parse_boolean_flag(var("CPG_PUSH_HMAC_CHECKS"), true);
        let hmac_secret = Secret::new(var("CPG_PUSH_HMAC_SECRET").unwrap_or_default());
        match (hmac_checks, hmac_secret.is_empty()) {
            (true, true) => error!(
                "🪛️ CPG_PUSH_HMAC_SECRET is not set. Every push notification will be rejected until it is configured."
            ),
            (false, _) => warn!("🚨️ Push signature checks are DISABLED. Anyone can mark passive orders as paid."),
            (true, false) => info!("🪛️ Push notifications must carry a valid X-Push-Signature"),
        }
        Self { hmac_secret, hmac_checks }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use chain_pay_engine::db_types::Chain;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::from_vars(vars(&[]));
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6088);
        assert_eq!(config.database_url, "sqlite://data/chain_pay.db");
        assert!(config.push.hmac_checks);
        assert!(config.push.hmac_secret.is_empty());
        assert_eq!(config.order_expiry_interval, Duration::from_secs(60));
    }

    #[test]
    fn values_from_variables() {
        let config = ServerConfig::from_vars(vars(&[
            ("CPG_HOST", "0.0.0.0"),
            ("CPG_PORT", "9000"),
            ("CPG_DATABASE_URL", "sqlite://tmp/x.db"),
            ("CPG_PUSH_HMAC_SECRET", "s3cr3t"),
            ("CPG_PUSH_HMAC_CHECKS", "0"),
            ("CPG_ORDER_EXPIRY_CHECK_INTERVAL", "5"),
            ("CPG_POLYGON_ENABLED", "false"),
        ]));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_url, "sqlite://tmp/x.db");
        assert_eq!(config.push.hmac_secret.reveal(), "s3cr3t");
        assert!(!config.push.hmac_checks);
        assert_eq!(config.order_expiry_interval, Duration::from_secs(5));
        assert!(!config.watcher.chain(Chain::Polygon).unwrap().enabled);
    }

    #[test]
    fn bad_values_are_ignored() {
        let config = ServerConfig::from_vars(vars(&[("CPG_PORT", "http"), ("CPG_ORDER_EXPIRY_CHECK_INTERVAL", "0")]));
        assert_eq!(config.port, 6088);
        assert_eq!(config.order_expiry_interval, Duration::from_secs(60));
    }
}
