//! # Blockchain watcher
//!
//! The [`BlockchainWatcher`] owns one [`ChainListener`] and one [`RpcClient`] per actively polled chain, and runs a
//! scan loop for every enabled chain on the tokio runtime. Each iteration of a loop is one scan cycle:
//!
//! 1. Fetch the watched addresses from the [`WalletCache`]. With no addresses, the cycle is skipped.
//! 2. Scan the chain with the [`ChainScanner`].
//! 3. Feed every transfer found through the [`TransferMatcher`].
//! 4. Adapt the listener's interval and sleep.
//!
//! Every cycle is recorded in [`ScanMetrics`]. After each one the alert rules are evaluated, and when a chain
//! crosses a new threshold a [`ChainAlertEvent`] is published. The same condition is not raised again until it has
//! cleared. The loop itself never stops on errors; only disabling the chain or stopping the watcher ends it.
//!
//! Passive channels have no loop. Enabling or disabling them flips a flag in the database, which the push payment
//! path checks.
mod errors;
mod gas_prices;
mod listener;
mod wallet_cache;

use std::{
    collections::BTreeMap,
    mem::{discriminant, Discriminant},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use chrono::Utc;
pub use errors::WatcherError;
use futures_util::future::join_all;
pub use gas_prices::{GasPrice, GasPriceBook};
pub use listener::{ChainListener, ListenerSnapshot, BLOCK_HISTORY_LEN, MIN_SCAN_INTERVAL, REORG_DEPTH};
use log::*;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::{sync::watch, task::JoinHandle};
pub use wallet_cache::WalletCache;

use crate::{
    config::WatcherConfig,
    db_types::Chain,
    events::{ChainAlertEvent, EventProducers},
    helpers::wei_to_gwei,
    matcher::{MatchError, MatchOutcome, MatchSummary, PushPayment, TransferMatcher},
    metrics::{AlertCondition, ChainMetricsSnapshot, ScanMetrics},
    rpc::{RateLimiters, ReqwestTransport, RpcClient, RpcTransport},
    scanners::ChainScanner,
    traits::ChainPayDatabase,
};

struct ChainHandle<T: RpcTransport> {
    listener: Arc<ChainListener>,
    rpc: Arc<RpcClient<T>>,
}

struct WatcherInner<B, T: RpcTransport> {
    db: B,
    chains: BTreeMap<Chain, ChainHandle<T>>,
    wallet_cache: WalletCache<B>,
    scanner: ChainScanner<B>,
    matcher: TransferMatcher<B>,
    metrics: Arc<ScanMetrics>,
    gas_prices: GasPriceBook,
    config: WatcherConfig,
    producers: EventProducers,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    raised_alerts: Mutex<BTreeMap<Chain, Discriminant<AlertCondition>>>,
    gas_monitor_running: Arc<AtomicBool>,
}

/// Status of one chain or channel, as reported to operators.
#[derive(Debug, Clone, Serialize)]
pub struct ListenerStatus {
    pub chain: Chain,
    pub enabled: bool,
    pub running: bool,
    pub passive: bool,
    pub wallet_count: i64,
    pub interval_secs: Option<u64>,
    pub last_block: Option<u64>,
    pub rpc_endpoint: Option<String>,
    pub contract_address: Option<String>,
    pub gas_price_gwei: Option<f64>,
}

/// The result of one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub addresses: usize,
    pub transfers_found: usize,
    pub matches: MatchSummary,
    /// False if there were no watched addresses and nothing was scanned.
    pub scanned: bool,
}

pub struct BlockchainWatcher<B, T: RpcTransport = ReqwestTransport> {
    inner: Arc<WatcherInner<B, T>>,
}

impl<B, T: RpcTransport> Clone for BlockchainWatcher<B, T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<B: ChainPayDatabase> BlockchainWatcher<B, ReqwestTransport> {
    pub fn new(config: WatcherConfig, db: B, producers: EventProducers) -> Result<Self, WatcherError> {
        let transport =
            ReqwestTransport::new(config.rpc_timeout).map_err(|e| WatcherError::Initialization(e.to_string()))?;
        Self::with_transport(config, db, producers, transport)
    }
}

impl<B: ChainPayDatabase, T: RpcTransport> BlockchainWatcher<B, T> {
    /// Builds a watcher that sends every RPC request through `transport`.
    pub fn with_transport(
        config: WatcherConfig,
        db: B,
        producers: EventProducers,
        transport: T,
    ) -> Result<Self, WatcherError> {
        Self::with_rate_limiters(config, db, producers, transport, RateLimiters::new())
    }

    pub fn with_rate_limiters(
        config: WatcherConfig,
        db: B,
        producers: EventProducers,
        transport: T,
        limiters: RateLimiters,
    ) -> Result<Self, WatcherError> {
        let metrics = Arc::new(ScanMetrics::new());
        let limiters = Arc::new(limiters);
        let mut chains = BTreeMap::new();
        for chain_config in config.chains.iter().filter(|c| !c.chain.is_passive()) {
            let chain = chain_config.chain;
            let rpc = RpcClient::new(
                chain,
                chain_config.rpc_endpoints.clone(),
                transport.clone(),
                Arc::clone(&limiters),
                Arc::clone(&metrics),
                config.retry_policy,
            );
            let rpc = match rpc {
                Ok(rpc) => rpc,
                Err(e) => {
                    warn!("🕰️ [{chain}] {e}. The chain cannot be watched");
                    continue;
                },
            };
            let listener = Arc::new(ChainListener::new(chain_config));
            chains.insert(chain, ChainHandle { listener, rpc: Arc::new(rpc) });
        }
        let (shutdown, _) = watch::channel(false);
        let inner = WatcherInner {
            wallet_cache: WalletCache::new(db.clone(), config.wallet_cache_ttl),
            scanner: ChainScanner::new(db.clone(), Arc::clone(&metrics)),
            matcher: TransferMatcher::new(db.clone(), Arc::clone(&metrics), producers.clone()),
            db,
            chains,
            metrics,
            gas_prices: GasPriceBook::default(),
            config,
            producers,
            shutdown,
            tasks: Mutex::new(Vec::new()),
            raised_alerts: Mutex::new(BTreeMap::new()),
            gas_monitor_running: Arc::new(AtomicBool::new(false)),
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Starts a scan loop for every chain that is enabled, and the gas price monitor.
    pub fn start(&self) {
        self.inner.shutdown.send_replace(false);
        let mut started = Vec::new();
        for (chain, handle) in &self.inner.chains {
            if handle.listener.is_enabled() && self.spawn_scan_loop(*chain) {
                started.push(chain.as_str());
            }
        }
        if !self.spawn_gas_monitor() {
            trace!("🕰️ Gas price monitor not started. It is already running or there are no EVM chains");
        }
        let scanning = if started.is_empty() { "nothing".to_string() } else { started.join(", ") };
        info!("🕰️ Blockchain watcher started. Scanning {scanning}");
    }

    /// Signals every loop to stop and waits for them to exit.
    pub async fn stop(&self) {
        self.inner.shutdown.send_replace(true);
        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        let count = tasks.len();
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("🕰️ A watcher task ended abnormally. {e}");
            }
        }
        info!("🕰️ Blockchain watcher stopped. {count} tasks joined");
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Enables a chain by name. Active chains start scanning straight away.
    pub async fn enable_chain(&self, name: &str) -> Result<(), WatcherError> {
        let chain = parse_chain(name)?;
        if chain.is_passive() {
            self.inner.db.set_passive_channel_enabled(chain, true).await?;
            info!("🕰️ [{chain}] Passive channel enabled");
            return Ok(());
        }
        let handle = self.handle(chain)?;
        if self.is_shutting_down() {
            return Err(WatcherError::ShuttingDown);
        }
        if self.spawn_scan_loop(chain) {
            info!("🕰️ [{chain}] Enabled");
        } else {
            debug!("🕰️ [{chain}] Already running. Interval {:?}", handle.listener.scan_interval());
        }
        Ok(())
    }

    /// Disables a chain by name. Its scan loop exits before its next cycle.
    pub async fn disable_chain(&self, name: &str) -> Result<(), WatcherError> {
        let chain = parse_chain(name)?;
        if chain.is_passive() {
            self.inner.db.set_passive_channel_enabled(chain, false).await?;
            info!("🕰️ [{chain}] Passive channel disabled");
            return Ok(());
        }
        let handle = self.handle(chain)?;
        if handle.listener.request_stop() {
            info!("🕰️ [{chain}] Disabled. Scan loop signalled to stop");
        } else {
            debug!("🕰️ [{chain}] Disabled. It was not running");
        }
        Ok(())
    }

    /// Status of every known chain and channel, including passive ones.
    pub async fn listener_status(&self) -> Result<BTreeMap<Chain, ListenerStatus>, WatcherError> {
        let counts = self.inner.db.count_active_wallets().await?;
        let mut result = BTreeMap::new();
        for (chain, handle) in &self.inner.chains {
            let snapshot = handle.listener.snapshot();
            let status = ListenerStatus {
                chain: *chain,
                enabled: snapshot.enabled,
                running: snapshot.running,
                passive: false,
                wallet_count: counts.get(chain).copied().unwrap_or_default(),
                interval_secs: Some(snapshot.scan_interval.as_secs()),
                last_block: chain.is_evm().then_some(snapshot.last_block),
                rpc_endpoint: Some(handle.rpc.current_endpoint().to_string()),
                contract_address: handle.listener.contract_address().map(String::from),
                gas_price_gwei: self.inner.gas_prices.get(*chain).map(|g| g.gwei),
            };
            result.insert(*chain, status);
        }
        for chain in Chain::ALL.into_iter().filter(Chain::is_passive) {
            let status = ListenerStatus {
                chain,
                enabled: self.inner.db.passive_channel_enabled(chain).await?,
                running: false,
                passive: true,
                wallet_count: counts.get(&chain).copied().unwrap_or_default(),
                interval_secs: None,
                last_block: None,
                rpc_endpoint: None,
                contract_address: None,
                gas_price_gwei: None,
            };
            result.insert(chain, status);
        }
        Ok(result)
    }

    pub fn metrics(&self) -> BTreeMap<Chain, ChainMetricsSnapshot> {
        self.inner.metrics.snapshot()
    }

    pub fn chain_metrics(&self, name: &str) -> Result<Option<ChainMetricsSnapshot>, WatcherError> {
        let chain = parse_chain(name)?;
        Ok(self.inner.metrics.chain_snapshot(chain))
    }

    pub fn scan_metrics(&self) -> Arc<ScanMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Makes new or removed wallets visible on the next scan cycle.
    pub fn invalidate_wallet_cache(&self) {
        self.inner.wallet_cache.invalidate();
    }

    pub fn gas_price(&self, chain: Chain) -> Option<GasPrice> {
        self.inner.gas_prices.get(chain)
    }

    pub fn gas_prices(&self) -> BTreeMap<Chain, GasPrice> {
        self.inner.gas_prices.all()
    }

    pub fn listener(&self, chain: Chain) -> Option<Arc<ChainListener>> {
        self.inner.chains.get(&chain).map(|h| Arc::clone(&h.listener))
    }

    pub fn rpc_client(&self, chain: Chain) -> Option<Arc<RpcClient<T>>> {
        self.inner.chains.get(&chain).map(|h| Arc::clone(&h.rpc))
    }

    pub fn matcher(&self) -> &TransferMatcher<B> {
        &self.inner.matcher
    }

    pub async fn process_push_payment(&self, push: PushPayment) -> Result<MatchOutcome, MatchError> {
        self.inner.matcher.process_push_payment(push).await
    }

    /// Runs a single scan cycle for `chain`, whether or not its loop is running.
    pub async fn run_scan_cycle(&self, chain: Chain) -> Result<CycleReport, WatcherError> {
        let handle = self.handle(chain)?;
        let metrics = &self.inner.metrics;
        let addresses = match self.inner.wallet_cache.addresses(chain).await {
            Ok(a) => a,
            Err(e) => {
                metrics.record_error(chain, &e.to_string());
                return Err(e.into());
            },
        };
        if addresses.is_empty() {
            trace!("🔭️ [{chain}] No watched wallets. Skipping scan");
            return Ok(CycleReport::default());
        }
        metrics.record_scan_start(chain);
        let started = Instant::now();
        match self.inner.scanner.scan(&handle.listener, &handle.rpc, &addresses).await {
            Ok(transfers) => {
                let transfers_found = transfers.len();
                metrics.record_scan_success(chain, started.elapsed(), transfers_found);
                let matches = self.inner.matcher.process_batch(transfers).await;
                handle.listener.adjust_interval(transfers_found);
                if transfers_found > 0 {
                    info!("🔭️ [{chain}] Scan found {transfers_found} transfers. {matches:?}");
                }
                self.check_alerts(chain).await;
                Ok(CycleReport { addresses: addresses.len(), transfers_found, matches, scanned: true })
            },
            Err(e) => {
                metrics.record_scan_failure(chain, started.elapsed(), &e.to_string());
                warn!("🔭️ [{chain}] Scan failed. {e}");
                self.check_alerts(chain).await;
                Err(e.into())
            },
        }
    }

    /// Publishes an alert when `chain` trips a rule it was not already alerting on.
    async fn check_alerts(&self, chain: Chain) {
        let condition = self.inner.metrics.should_alert(chain);
        let is_new = {
            let mut raised = self.inner.raised_alerts.lock();
            match &condition {
                Some(c) => raised.insert(chain, discriminant(c)) != Some(discriminant(c)),
                None => {
                    if raised.remove(&chain).is_some() {
                        info!("🔭️ [{chain}] Alert condition has cleared");
                    }
                    false
                },
            }
        };
        if let Some(condition) = condition.filter(|_| is_new) {
            error!("🔭️ [{chain}] ALERT: {condition}");
            let event = ChainAlertEvent { chain, condition, raised_at: Utc::now() };
            self.inner.producers.publish_chain_alert(event).await;
        }
    }

    /// Queries the gas price of every enabled EVM chain.
    pub async fn refresh_gas_prices(&self) {
        for (chain, handle) in self.inner.chains.iter().filter(|(c, h)| c.is_evm() && h.listener.is_enabled()) {
            let price = handle.rpc.call::<String>("eth_gasPrice", json!([])).await;
            match price.map(|p| wei_to_gwei(&p)) {
                Ok(Ok(gwei)) => {
                    trace!("🔭️ [{chain}] Gas price is {gwei:.3} gwei");
                    self.inner.gas_prices.record(*chain, gwei);
                },
                Ok(Err(e)) => warn!("🔭️ [{chain}] Could not read the gas price. {e}"),
                Err(e) => warn!("🔭️ [{chain}] Could not fetch the gas price. {e}"),
            }
        }
    }

    fn handle(&self, chain: Chain) -> Result<&ChainHandle<T>, WatcherError> {
        self.inner.chains.get(&chain).ok_or(WatcherError::ChainUnavailable(chain))
    }

    /// Spawns the scan loop for `chain`. Returns false if a loop is already running.
    fn spawn_scan_loop(&self, chain: Chain) -> bool {
        let Some(handle) = self.inner.chains.get(&chain) else {
            return false;
        };
        let Some((generation, mut stop)) = handle.listener.begin_run() else {
            return false;
        };
        let listener = Arc::clone(&handle.listener);
        let watcher = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        let task = tokio::spawn(async move {
            info!("🕰️ [{chain}] Scan loop started. Interval {:?}", listener.scan_interval());
            loop {
                if *shutdown.borrow_and_update() {
                    break;
                }
                if let Err(e) = watcher.run_scan_cycle(chain).await {
                    debug!("🕰️ [{chain}] Scan cycle ended with an error. {e}");
                }
                let interval = listener.scan_interval();
                tokio::select! {
                    _ = shutdown.changed() => {},
                    _ = &mut stop => break,
                    _ = tokio::time::sleep(interval) => {},
                }
            }
            listener.finish_run(generation);
            info!("🕰️ [{chain}] Scan loop stopped");
        });
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
        true
    }

    /// Spawns the gas price monitor. Returns false if one is already running or there are no EVM chains.
    fn spawn_gas_monitor(&self) -> bool {
        if !self.inner.chains.keys().any(Chain::is_evm) {
            return false;
        }
        let running = Arc::clone(&self.inner.gas_monitor_running);
        if running.swap(true, Ordering::SeqCst) {
            return false;
        }
        let watcher = self.clone();
        let interval = self.inner.config.gas_price_interval;
        let mut shutdown = self.inner.shutdown.subscribe();
        let task = tokio::spawn(async move {
            loop {
                if *shutdown.borrow_and_update() {
                    break;
                }
                watcher.refresh_gas_prices().await;
                tokio::select! {
                    _ = shutdown.changed() => {},
                    _ = tokio::time::sleep(interval) => {},
                }
            }
            running.store(false, Ordering::SeqCst);
            debug!("🕰️ Gas price monitor stopped");
        });
        self.inner.tasks.lock().push(task);
        true
    }

    pub fn is_gas_monitor_running(&self) -> bool {
        self.inner.gas_monitor_running.load(Ordering::SeqCst)
    }
}

fn parse_chain(name: &str) -> Result<Chain, WatcherError> {
    name.parse::<Chain>().map_err(|_| WatcherError::UnknownChain(name.to_string()))
}
