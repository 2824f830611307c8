//! # Backend contracts
//!
//! The engine never talks to a database directly. Everything it needs from persistent storage is expressed by the
//! traits in this module, and a backend (currently only SQLite) implements them.
//!
//! * [`WalletManagement`] lists the addresses being watched on each chain. It backs the wallet cache.
//! * [`OrderManagement`] finds and settles pending orders, and feeds the unique-amount allocator.
//! * [`TransactionLogManagement`] is the idempotency boundary: every observed transfer is logged exactly once.
//! * [`SystemConfigManagement`] stores runtime switches, such as the enabled flag of passive channels.
//! * [`MerchantBalances`] credits merchants once an order settles.
//!
//! [`ChainPayDatabase`] is the union of all of the above, and is what the watcher is generic over.
mod merchant_balances;
mod order_management;
mod store_error;
mod system_config;
mod transaction_logs;
mod wallet_management;

pub use merchant_balances::{MerchantBalance, MerchantBalances};
pub use order_management::OrderManagement;
pub use store_error::StoreError;
pub use system_config::SystemConfigManagement;
pub use transaction_logs::{InsertLogResult, TransactionLogManagement};
pub use wallet_management::WalletManagement;

pub trait ChainPayDatabase:
    WalletManagement
    + OrderManagement
    + TransactionLogManagement
    + SystemConfigManagement
    + MerchantBalances
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> ChainPayDatabase for T where T: WalletManagement
        + OrderManagement
        + TransactionLogManagement
        + SystemConfigManagement
        + MerchantBalances
        + Clone
        + Send
        + Sync
        + 'static
{
}
