use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use log::*;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{config::ChainConfig, db_types::Chain};

/// The scan interval never drops below this, however busy a chain is.
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_secs(5);
/// Blocks to rewind when the head is seen to go backwards.
pub const REORG_DEPTH: u64 = 10;
/// Number of recently observed head heights kept for reorg detection.
pub const BLOCK_HISTORY_LEN: usize = 20;

#[derive(Debug)]
struct ListenerState {
    enabled: bool,
    running: bool,
    generation: u64,
    base_interval: Duration,
    scan_interval: Duration,
    last_block: u64,
    block_history: VecDeque<u64>,
    // Addresses whose last log query failed, and the first block each one still needs
    lagging: HashMap<String, u64>,
    stop: Option<oneshot::Sender<()>>,
}

/// The polling state of a single chain.
///
/// `enabled` is operator intent. `running` is true only while a scan loop owns the listener. A loop claims the
/// listener with [`ChainListener::begin_run`] and releases it with [`ChainListener::finish_run`], passing back the
/// generation it was given, so that a stale loop can never clear the running flag of its successor.
#[derive(Debug)]
pub struct ChainListener {
    chain: Chain,
    contract_address: Option<String>,
    confirmations: u64,
    token_decimals: u32,
    reorg_depth: u64,
    state: Mutex<ListenerState>,
}

/// Point-in-time copy of a listener's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSnapshot {
    pub enabled: bool,
    pub running: bool,
    pub scan_interval: Duration,
    pub last_block: u64,
}

impl ChainListener {
    pub fn new(config: &ChainConfig) -> Self {
        let state = ListenerState {
            enabled: config.enabled,
            running: false,
            generation: 0,
            base_interval: config.scan_interval,
            scan_interval: config.scan_interval,
            last_block: 0,
            block_history: VecDeque::with_capacity(BLOCK_HISTORY_LEN + 1),
            lagging: HashMap::new(),
            stop: None,
        };
        Self {
            chain: config.chain,
            contract_address: config.contract_address.clone(),
            confirmations: config.confirmations,
            token_decimals: config.token_decimals,
            reorg_depth: REORG_DEPTH,
            state: Mutex::new(state),
        }
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn contract_address(&self) -> Option<&str> {
        self.contract_address.as_deref()
    }

    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    pub fn token_decimals(&self) -> u32 {
        self.token_decimals
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn scan_interval(&self) -> Duration {
        self.state.lock().scan_interval
    }

    pub fn base_interval(&self) -> Duration {
        self.state.lock().base_interval
    }

    /// The highest block that has been fully scanned. Zero means no block has been scanned yet.
    pub fn last_block(&self) -> u64 {
        self.state.lock().last_block
    }

    pub fn set_last_block(&self, block: u64) {
        self.state.lock().last_block = block;
    }

    /// The first block still to be scanned for `address`, if it has fallen behind the chain cursor.
    pub fn lagging_from(&self, address: &str) -> Option<u64> {
        self.state.lock().lagging.get(address).copied()
    }

    /// Records that `address` has been scanned up to `scanned_to`. An address that has reached the cursor is no
    /// longer lagging.
    pub fn record_address_progress(&self, address: &str, scanned_to: u64, cursor: u64) {
        let mut state = self.state.lock();
        if scanned_to >= cursor {
            state.lagging.remove(address);
        } else {
            state.lagging.insert(address.to_string(), scanned_to + 1);
        }
    }

    /// Records a failed query for `address` over a range starting at `from`.
    pub fn record_address_failure(&self, address: &str, from: u64) {
        let mut state = self.state.lock();
        let next = state.lagging.entry(address.to_string()).or_insert(from);
        *next = (*next).min(from);
    }

    /// Drops lagging entries for addresses that are no longer watched.
    pub fn retain_lagging<F: Fn(&str) -> bool>(&self, watched: F) {
        self.state.lock().lagging.retain(|address, _| watched(address));
    }

    /// The highest block below which every watched address has been scanned.
    pub fn scanned_through(&self) -> u64 {
        let state = self.state.lock();
        let lowest_lagging = state.lagging.values().min().map(|b| b.saturating_sub(1));
        lowest_lagging.map_or(state.last_block, |b| b.min(state.last_block))
    }

    pub fn block_history(&self) -> Vec<u64> {
        self.state.lock().block_history.iter().copied().collect()
    }

    pub fn snapshot(&self) -> ListenerSnapshot {
        let state = self.state.lock();
        ListenerSnapshot {
            enabled: state.enabled,
            running: state.running,
            scan_interval: state.scan_interval,
            last_block: state.last_block,
        }
    }

    /// Adapts the scan interval to the outcome of the last scan. Finding transfers halves the interval, down to
    /// [`MIN_SCAN_INTERVAL`]. A quiet scan restores the base interval. Returns the new interval.
    pub fn adjust_interval(&self, transfers_found: usize) -> Duration {
        let mut state = self.state.lock();
        let next = if transfers_found > 0 {
            Duration::from_secs(state.scan_interval.as_secs() / 2).max(MIN_SCAN_INTERVAL)
        } else {
            state.base_interval
        };
        if next != state.scan_interval {
            debug!("🔭️ [{}] Scan interval changed from {:?} to {next:?}", self.chain, state.scan_interval);
        }
        state.scan_interval = next;
        next
    }

    /// Records a newly observed head height and reports whether it indicates a reorganisation.
    ///
    /// A head at or below the previously observed one is treated as a reorg: the history restarts from `head` and
    /// the scan cursor is rewound to `head - reorg_depth`, unless it already sits below that point.
    pub fn detect_reorg(&self, head: u64) -> bool {
        let mut state = self.state.lock();
        let previous = state.block_history.back().copied();
        match previous {
            Some(prev) if head <= prev => {
                let rewind_to = head.saturating_sub(self.reorg_depth);
                warn!(
                    "🔭️ [{}] Possible reorg. Head went from {prev} to {head}. Rewinding scan cursor to {}",
                    self.chain,
                    rewind_to.min(state.last_block)
                );
                state.block_history.clear();
                state.block_history.push_back(head);
                // Never move the cursor forward here. Blocks between it and the rewind point have not been scanned.
                state.last_block = state.last_block.min(rewind_to);
                let resume = state.last_block + 1;
                state.lagging.values_mut().for_each(|b| *b = (*b).min(resume));
                true
            },
            _ => {
                state.block_history.push_back(head);
                while state.block_history.len() > BLOCK_HISTORY_LEN {
                    state.block_history.pop_front();
                }
                false
            },
        }
    }

    /// Marks the listener enabled and, unless a live loop already owns it, claims it for a new scan loop. A loop that
    /// has been told to stop no longer counts as live. Returns the loop's generation and the receiver that signals it
    /// to stop.
    pub(crate) fn begin_run(&self) -> Option<(u64, oneshot::Receiver<()>)> {
        let mut state = self.state.lock();
        state.enabled = true;
        if state.running && state.stop.is_some() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        state.running = true;
        state.generation += 1;
        state.stop = Some(tx);
        Some((state.generation, rx))
    }

    /// Marks the listener disabled and signals its scan loop, if any, to stop. Returns true if a loop was signalled.
    pub(crate) fn request_stop(&self) -> bool {
        let mut state = self.state.lock();
        state.enabled = false;
        match state.stop.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            },
            None => false,
        }
    }

    /// Releases the listener after a scan loop exits.
    pub(crate) fn finish_run(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.running = false;
            state.stop = None;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn listener(interval: u64) -> ChainListener {
        let mut config = ChainConfig::default_for(Chain::Bep20).unwrap();
        config.scan_interval = Duration::from_secs(interval);
        ChainListener::new(&config)
    }

    #[test]
    fn interval_halves_when_busy_and_resets_when_quiet() {
        let listener = listener(15);
        assert_eq!(listener.adjust_interval(3), Duration::from_secs(7));
        assert_eq!(listener.adjust_interval(1), Duration::from_secs(5));
        assert_eq!(listener.adjust_interval(1), Duration::from_secs(5));
        assert_eq!(listener.adjust_interval(0), Duration::from_secs(15));
        assert_eq!(listener.scan_interval(), Duration::from_secs(15));
    }

    #[test]
    fn short_base_intervals_respect_the_floor() {
        let listener = listener(6);
        assert_eq!(listener.adjust_interval(2), MIN_SCAN_INTERVAL);
    }

    #[test]
    fn reorg_rewinds_the_cursor() {
        let listener = listener(15);
        assert!(!listener.detect_reorg(100));
        listener.set_last_block(100);
        assert!(!listener.detect_reorg(105));
        assert!(listener.detect_reorg(103));
        assert_eq!(listener.last_block(), 93);
        assert_eq!(listener.block_history(), vec![103]);
        // A cursor already behind the rewind point is left alone
        listener.set_last_block(50);
        assert!(listener.detect_reorg(103));
        assert_eq!(listener.last_block(), 50);
    }

    #[test]
    fn lagging_addresses_hold_back_the_scanned_height() {
        let listener = listener(15);
        listener.set_last_block(500);
        assert_eq!(listener.scanned_through(), 500);
        listener.record_address_failure("0xaa", 401);
        listener.record_address_failure("0xaa", 451);
        assert_eq!(listener.lagging_from("0xaa"), Some(401));
        assert_eq!(listener.scanned_through(), 400);

        listener.record_address_progress("0xaa", 480, 500);
        assert_eq!(listener.lagging_from("0xaa"), Some(481));
        listener.record_address_progress("0xaa", 500, 500);
        assert_eq!(listener.lagging_from("0xaa"), None);
        assert_eq!(listener.scanned_through(), 500);

        listener.record_address_failure("0xbb", 300);
        listener.retain_lagging(|a| a != "0xbb");
        assert_eq!(listener.scanned_through(), 500);
    }

    #[test]
    fn reorg_pulls_lagging_addresses_back() {
        let listener = listener(15);
        assert!(!listener.detect_reorg(200));
        listener.set_last_block(190);
        listener.record_address_failure("0xaa", 188);
        listener.record_address_progress("0xbb", 185, 190);
        assert!(listener.detect_reorg(195));
        assert_eq!(listener.last_block(), 185);
        assert_eq!(listener.lagging_from("0xaa"), Some(186));
        assert_eq!(listener.lagging_from("0xbb"), Some(186));
    }

    #[test]
    fn history_is_bounded() {
        let listener = listener(15);
        for head in 1..=50 {
            assert!(!listener.detect_reorg(head));
        }
        let history = listener.block_history();
        assert_eq!(history.len(), BLOCK_HISTORY_LEN);
        assert_eq!(history.first(), Some(&31));
        assert_eq!(history.last(), Some(&50));
    }

    #[test]
    fn run_lifecycle() {
        let listener = listener(15);
        let (generation, mut stop) = listener.begin_run().unwrap();
        assert!(listener.is_running());
        assert!(listener.begin_run().is_none());
        assert!(listener.request_stop());
        assert!(!listener.is_enabled());
        assert!(stop.try_recv().is_ok());
        // Still running until the loop acknowledges
        assert!(listener.is_running());
        listener.finish_run(generation);
        assert!(!listener.is_running());
        assert!(!listener.request_stop());
    }

    #[test]
    fn stale_loops_do_not_clear_the_running_flag() {
        let listener = listener(15);
        let (first, _rx1) = listener.begin_run().unwrap();
        listener.request_stop();
        // Re-enabled before the first loop noticed the stop signal
        let (second, _rx2) = listener.begin_run().unwrap();
        listener.finish_run(first);
        assert!(listener.is_running());
        listener.finish_run(second);
        assert!(!listener.is_running());
    }
}
