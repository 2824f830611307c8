//! ChainPay Engine
//!
//! The ChainPay Engine watches blockchains (and a couple of push-based fiat rails) for transfers to merchant wallets,
//! and settles the pending payment orders those transfers pay for.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`mod@traits`] and the SQLite backend, [`SqliteDatabase`]). The engine only talks to storage through
//!    the traits; the data types it stores are in [`mod@db_types`].
//! 2. Chain access ([`mod@rpc`] and [`mod@scanners`]). The RPC client rotates across endpoints, retries and respects
//!    provider rate limits. The scanners turn raw chain data into [`db_types::Transfer`]s.
//! 3. Matching ([`mod@matcher`]). Orders are given a unique expected amount when they are placed, and incoming
//!    transfers are matched to orders by that amount. Every transaction settles at most one order, exactly once.
//! 4. Orchestration ([`mod@watcher`]). The [`BlockchainWatcher`] runs one scan loop per enabled chain, and exposes
//!    operator controls and [`mod@metrics`].
//!
//! The engine also emits events when orders are paid and when a chain needs attention. Hook into them with
//! [`events::EventHooks`].
mod db;

pub mod config;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod matcher;
pub mod metrics;
pub mod rpc;
pub mod scanners;
pub mod traits;
pub mod watcher;

pub use config::{ChainConfig, WatcherConfig};
#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use matcher::{MatchOutcome, PushPayment, TransferMatcher, UniqueAmountAllocator};
pub use traits::{
    ChainPayDatabase,
    MerchantBalances,
    OrderManagement,
    StoreError,
    SystemConfigManagement,
    TransactionLogManagement,
    WalletManagement,
};
pub use watcher::{BlockchainWatcher, ListenerStatus, WatcherError};
