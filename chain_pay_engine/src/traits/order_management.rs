use std::future::Future;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    db_types::{Chain, NewOrder, Order, OrderStatusType, SettlementFields},
    traits::StoreError,
};

pub trait OrderManagement: Clone + Send + Sync {
    /// Stores a new pending order.
    ///
    /// Fails with [`StoreError::AmountCollision`] if another pending order on the same chain and address already
    /// expects the same amount, and with [`StoreError::OrderAlreadyExists`] if the trade number is taken.
    fn insert_order(&self, order: NewOrder) -> impl Future<Output = Result<Order, StoreError>> + Send;

    fn fetch_order(&self, id: i64) -> impl Future<Output = Result<Option<Order>, StoreError>> + Send;

    /// The earliest pending order on `chain` whose unique amount equals `amount`.
    ///
    /// When `address` is `None` the recipient is not part of the match. Passive rails rely on this, since push
    /// notifications do not always carry the receiving account.
    fn find_pending_by_unique_amount(
        &self,
        chain: Chain,
        address: Option<&str>,
        amount: Decimal,
    ) -> impl Future<Output = Result<Option<Order>, StoreError>> + Send;

    /// As [`OrderManagement::find_pending_by_unique_amount`], but matching the legacy `amount` column.
    fn find_pending_by_legacy_amount(
        &self,
        chain: Chain,
        address: Option<&str>,
        amount: Decimal,
    ) -> impl Future<Output = Result<Option<Order>, StoreError>> + Send;

    /// Moves the order to `Paid`, but only if its status is still `expected`. Returns the number of rows affected,
    /// so zero means that somebody else changed the order first.
    fn conditional_settle(
        &self,
        order_id: i64,
        expected: OrderStatusType,
        fields: SettlementFields,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// The unique amounts of every pending order on the chain.
    fn list_pending_amounts(&self, chain: Chain) -> impl Future<Output = Result<Vec<Decimal>, StoreError>> + Send;

    /// Marks all pending orders whose expiry time is before `now` as expired and returns them.
    fn expire_pending_orders(&self, now: DateTime<Utc>) -> impl Future<Output = Result<Vec<Order>, StoreError>> + Send;
}
