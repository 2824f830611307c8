//! Per-chain scan counters and the alert check that runs on them.
use std::{collections::BTreeMap, fmt::Display, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use parking_lot::RwLock;
use serde::Serialize;

use crate::db_types::Chain;

/// Rates are only meaningful once there are at least this many samples.
pub const ALERT_MIN_SAMPLES: u64 = 10;
pub const SCAN_FAILURE_RATE_THRESHOLD: f64 = 0.5;
pub const RPC_FAILURE_RATE_THRESHOLD: f64 = 0.3;
pub const MAX_BLOCKS_BEHIND: u64 = 100;
pub const STALL_THRESHOLD: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertCondition {
    ScanFailureRate { rate: f64, scans: u64 },
    RpcFailureRate { rate: f64, calls: u64 },
    BlocksBehind { blocks: u64 },
    Stalled { seconds: u64 },
}

impl Display for AlertCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertCondition::ScanFailureRate { rate, scans } => {
                write!(f, "Scan failure rate is {:.1}% over {scans} scans", rate * 100.0)
            },
            AlertCondition::RpcFailureRate { rate, calls } => {
                write!(f, "RPC failure rate is {:.1}% over {calls} calls", rate * 100.0)
            },
            AlertCondition::BlocksBehind { blocks } => write!(f, "Scanner is {blocks} blocks behind the chain head"),
            AlertCondition::Stalled { seconds } => write!(f, "No successful scan in the last {seconds} seconds"),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ChainCounters {
    scan_count: u64,
    scan_success: u64,
    scan_failure: u64,
    first_scan_at: Option<DateTime<Utc>>,
    last_scan_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    last_scan_duration: Duration,
    transfers_found: u64,
    orders_matched: u64,
    duplicate_tx: u64,
    error_count: u64,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
    rpc_calls: u64,
    rpc_failures: u64,
    rpc_retries: u64,
    current_block: u64,
    last_block: u64,
    confirmations: u64,
}

impl ChainCounters {
    /// Distance from the last scanned block to the confirmed head. Unconfirmed blocks are never scanned and do not
    /// count.
    fn blocks_behind(&self) -> u64 {
        self.current_block.saturating_sub(self.confirmations).saturating_sub(self.last_block)
    }

    fn record_error(&mut self, error: &str, at: DateTime<Utc>) {
        self.error_count += 1;
        self.last_error = Some(error.to_string());
        self.last_error_at = Some(at);
    }
}

/// A point-in-time copy of one chain's counters.
#[derive(Debug, Clone, Serialize)]
pub struct ChainMetricsSnapshot {
    pub chain: Chain,
    pub scan_count: u64,
    pub scan_success: u64,
    pub scan_failure: u64,
    /// Percentage of successful scans
    pub success_rate: f64,
    pub last_scan_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub scan_duration_ms: u64,
    pub transfers_found: u64,
    pub orders_matched: u64,
    pub duplicate_tx: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    pub rpc_calls: u64,
    pub rpc_failures: u64,
    pub rpc_retries: u64,
    pub current_block: u64,
    pub last_block: u64,
    pub blocks_behind: u64,
}

impl ChainMetricsSnapshot {
    fn new(chain: Chain, c: &ChainCounters) -> Self {
        let success_rate =
            if c.scan_count == 0 { 0.0 } else { c.scan_success as f64 / c.scan_count as f64 * 100.0 };
        Self {
            chain,
            scan_count: c.scan_count,
            scan_success: c.scan_success,
            scan_failure: c.scan_failure,
            success_rate,
            last_scan_time: c.last_scan_at,
            last_success_time: c.last_success_at,
            scan_duration_ms: u64::try_from(c.last_scan_duration.as_millis()).unwrap_or(u64::MAX),
            transfers_found: c.transfers_found,
            orders_matched: c.orders_matched,
            duplicate_tx: c.duplicate_tx,
            error_count: c.error_count,
            last_error: c.last_error.clone(),
            last_error_time: c.last_error_at,
            rpc_calls: c.rpc_calls,
            rpc_failures: c.rpc_failures,
            rpc_retries: c.rpc_retries,
            current_block: c.current_block,
            last_block: c.last_block,
            blocks_behind: c.blocks_behind(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanMetrics {
    chains: RwLock<BTreeMap<Chain, ChainCounters>>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F: FnOnce(&mut ChainCounters)>(&self, chain: Chain, f: F) {
        let mut chains = self.chains.write();
        f(chains.entry(chain).or_default());
    }

    pub fn record_scan_start(&self, chain: Chain) {
        let now = Utc::now();
        self.update(chain, |c| {
            c.scan_count += 1;
            c.last_scan_at = Some(now);
            c.first_scan_at.get_or_insert(now);
        });
    }

    pub fn record_scan_success(&self, chain: Chain, duration: Duration, transfers_found: usize) {
        let now = Utc::now();
        self.update(chain, |c| {
            c.scan_success += 1;
            c.last_success_at = Some(now);
            c.last_scan_duration = duration;
            c.transfers_found += transfers_found as u64;
        });
    }

    pub fn record_scan_failure(&self, chain: Chain, duration: Duration, error: &str) {
        let now = Utc::now();
        self.update(chain, |c| {
            c.scan_failure += 1;
            c.last_scan_duration = duration;
            c.record_error(error, now);
        });
    }

    /// Errors that do not fail the whole scan, such as a single address lookup or a settlement failure.
    pub fn record_error(&self, chain: Chain, error: &str) {
        let now = Utc::now();
        self.update(chain, |c| c.record_error(error, now));
    }

    pub fn record_order_matched(&self, chain: Chain) {
        self.update(chain, |c| c.orders_matched += 1);
    }

    pub fn record_duplicate_tx(&self, chain: Chain) {
        self.update(chain, |c| c.duplicate_tx += 1);
    }

    pub fn record_rpc_call(&self, chain: Chain, success: bool, retries: u32) {
        self.update(chain, |c| {
            c.rpc_calls += 1;
            c.rpc_retries += u64::from(retries);
            if !success {
                c.rpc_failures += 1;
            }
        });
    }

    pub fn record_block_heights(&self, chain: Chain, current_block: u64, last_block: u64, confirmations: u64) {
        self.update(chain, |c| {
            c.current_block = current_block;
            c.last_block = last_block;
            c.confirmations = confirmations;
        });
    }

    pub fn snapshot(&self) -> BTreeMap<Chain, ChainMetricsSnapshot> {
        self.chains.read().iter().map(|(chain, c)| (*chain, ChainMetricsSnapshot::new(*chain, c))).collect()
    }

    pub fn chain_snapshot(&self, chain: Chain) -> Option<ChainMetricsSnapshot> {
        self.chains.read().get(&chain).map(|c| ChainMetricsSnapshot::new(chain, c))
    }

    pub fn reset(&self) {
        self.chains.write().clear();
        info!("📊️ Scan metrics reset");
    }

    pub fn should_alert(&self, chain: Chain) -> Option<AlertCondition> {
        self.should_alert_at(chain, Utc::now())
    }

    /// Evaluates the alert rules in priority order and returns the first one that trips.
    pub fn should_alert_at(&self, chain: Chain, now: DateTime<Utc>) -> Option<AlertCondition> {
        let chains = self.chains.read();
        let c = chains.get(&chain)?;
        if c.scan_count >= ALERT_MIN_SAMPLES {
            let rate = c.scan_failure as f64 / c.scan_count as f64;
            if rate > SCAN_FAILURE_RATE_THRESHOLD {
                return Some(AlertCondition::ScanFailureRate { rate, scans: c.scan_count });
            }
        }
        if c.rpc_calls >= ALERT_MIN_SAMPLES {
            let rate = c.rpc_failures as f64 / c.rpc_calls as f64;
            if rate > RPC_FAILURE_RATE_THRESHOLD {
                return Some(AlertCondition::RpcFailureRate { rate, calls: c.rpc_calls });
            }
        }
        let behind = c.blocks_behind();
        if behind > MAX_BLOCKS_BEHIND {
            return Some(AlertCondition::BlocksBehind { blocks: behind });
        }
        // A chain that has never succeeded is measured from its first attempt.
        let reference = c.last_success_at.or(c.first_scan_at)?;
        let idle = (now - reference).to_std().unwrap_or_default();
        (idle > STALL_THRESHOLD).then(|| AlertCondition::Stalled { seconds: idle.as_secs() })
    }
}
