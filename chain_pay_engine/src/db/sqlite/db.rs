use std::{collections::HashMap, fmt::Debug};

use chrono::{DateTime, Utc};
use log::*;
use rust_decimal::Decimal;
use sqlx::SqlitePool;

use super::{db_url, merchants, new_pool, orders, orders::AmountColumn, system_config, transaction_logs, wallets};
use crate::{
    db_types::{Chain, FeeType, NewOrder, Order, OrderStatusType, SettlementFields, TransactionLog, Transfer},
    traits::{
        InsertLogResult,
        MerchantBalance,
        MerchantBalances,
        OrderManagement,
        StoreError,
        SystemConfigManagement,
        TransactionLogManagement,
        WalletManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the URL in `CPG_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, StoreError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = new_pool(url, max_connections).await?;
        trace!("🗃️ Created new database connection pool for {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./src/db/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Migration failed: {e}")))?;
        debug!("🗃️ Migrations complete");
        Ok(())
    }

    pub async fn insert_merchant(&self, name: &str) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let id = merchants::insert_merchant(name, &mut tx).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Adds a watched wallet. Callers must invalidate the watcher's wallet cache afterwards.
    pub async fn insert_wallet(
        &self,
        chain: Chain,
        address: &str,
        merchant_id: Option<i64>,
        label: Option<&str>,
    ) -> Result<i64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let id = wallets::insert_wallet(chain, address, merchant_id, label, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Wallet #{id} ({chain}:{address}) added");
        Ok(id)
    }

    pub async fn set_wallet_active(&self, id: i64, active: bool) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        wallets::set_wallet_active(id, active, &mut conn).await
    }

    pub async fn delete_wallet(&self, id: i64) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        wallets::soft_delete_wallet(id, &mut conn).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl WalletManagement for SqliteDatabase {
    async fn fetch_active_addresses(&self, chain: Chain) -> Result<Vec<String>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        wallets::fetch_active_addresses(chain, &mut conn).await
    }

    async fn count_active_wallets(&self) -> Result<HashMap<Chain, i64>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        wallets::count_active_wallets(&mut conn).await
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        let expecting = order.unique_amount.unwrap_or(order.amount);
        debug!("🗃️ Order #{} [{}] saved. Expecting {expecting} on {}", order.id, order.trade_no, order.chain);
        Ok(order)
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(id, &mut conn).await
    }

    async fn find_pending_by_unique_amount(
        &self,
        chain: Chain,
        address: Option<&str>,
        amount: Decimal,
    ) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::find_pending_by_amount(chain, address, amount, AmountColumn::Unique, &mut conn).await
    }

    async fn find_pending_by_legacy_amount(
        &self,
        chain: Chain,
        address: Option<&str>,
        amount: Decimal,
    ) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::find_pending_by_amount(chain, address, amount, AmountColumn::Legacy, &mut conn).await
    }

    async fn conditional_settle(
        &self,
        order_id: i64,
        expected: OrderStatusType,
        fields: SettlementFields,
    ) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::conditional_settle(order_id, expected, fields, &mut conn).await
    }

    async fn list_pending_amounts(&self, chain: Chain) -> Result<Vec<Decimal>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::list_pending_amounts(chain, &mut conn).await
    }

    async fn expire_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let expired = orders::expire_pending_orders(now, &mut tx).await?;
        tx.commit().await?;
        Ok(expired)
    }
}

impl TransactionLogManagement for SqliteDatabase {
    async fn insert_transaction_log(&self, transfer: &Transfer) -> Result<InsertLogResult, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = transaction_logs::idempotent_insert(transfer, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn transaction_exists(&self, tx_hash: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        transaction_logs::exists(tx_hash, &mut conn).await
    }

    async fn fetch_transaction_log(&self, tx_hash: &str) -> Result<Option<TransactionLog>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        transaction_logs::fetch_log(tx_hash, &mut conn).await
    }

    async fn mark_transaction_matched(&self, tx_hash: &str, order_id: i64) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        transaction_logs::mark_matched(tx_hash, order_id, &mut conn).await
    }
}

impl SystemConfigManagement for SqliteDatabase {
    async fn fetch_config_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        system_config::fetch_value(key, &mut conn).await
    }

    async fn store_config_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        system_config::upsert_value(key, value, &mut conn).await
    }
}

impl MerchantBalances for SqliteDatabase {
    async fn credit_merchant_balance(
        &self,
        merchant_id: i64,
        settlement_amount: Decimal,
        fee: Decimal,
        fee_type: FeeType,
    ) -> Result<MerchantBalance, StoreError> {
        let mut tx = self.pool.begin().await?;
        let balance = merchants::credit_balance(merchant_id, settlement_amount, fee, fee_type, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Merchant #{merchant_id} credited {settlement_amount} less {fee} fee ({fee_type:?}). Balance is now {}",
            balance.balance
        );
        Ok(balance)
    }

    async fn fetch_merchant_balance(&self, merchant_id: i64) -> Result<Option<MerchantBalance>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        merchants::fetch_balance(merchant_id, &mut conn).await
    }
}
