use std::future::Future;

use crate::{
    db_types::{TransactionLog, Transfer},
    traits::StoreError,
};

#[derive(Debug, Clone)]
pub enum InsertLogResult {
    Inserted(TransactionLog),
    AlreadyExists(String),
}

pub trait TransactionLogManagement: Clone + Send + Sync {
    /// Logs an observed transfer, keyed by its transaction hash. A hash that has already been logged is reported as
    /// [`InsertLogResult::AlreadyExists`] and nothing is written.
    fn insert_transaction_log(
        &self,
        transfer: &Transfer,
    ) -> impl Future<Output = Result<InsertLogResult, StoreError>> + Send;

    fn transaction_exists(&self, tx_hash: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn fetch_transaction_log(
        &self,
        tx_hash: &str,
    ) -> impl Future<Output = Result<Option<TransactionLog>, StoreError>> + Send;

    /// Links the log entry to the order it settled.
    fn mark_transaction_matched(
        &self,
        tx_hash: &str,
        order_id: i64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
