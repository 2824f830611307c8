use chrono::{DateTime, Utc};
use log::trace;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

use super::rows;
use crate::{
    db_types::{Chain, NewOrder, Order, OrderStatusType, SettlementFields},
    helpers::canonical_amount,
    traits::StoreError,
};

/// Settlement amounts and fees are kept at crypto precision regardless of the chain.
const SETTLEMENT_PRECISION: u32 = 6;

pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, StoreError> {
    let precision = order.chain.precision();
    let now = Utc::now();
    let unique_amount = order.unique_amount.map(|a| canonical_amount(a, precision));
    let result = sqlx::query_as::<_, Order>(
        r#"INSERT INTO orders (trade_no, merchant_id, chain, to_address, amount, unique_amount, settlement_amount, fee,
            fee_type, status, created_at, expires_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *"#,
    )
    .bind(&order.trade_no)
    .bind(order.merchant_id)
    .bind(order.chain)
    .bind(&order.to_address)
    .bind(canonical_amount(order.amount, precision))
    .bind(&unique_amount)
    .bind(canonical_amount(order.settlement_amount, SETTLEMENT_PRECISION))
    .bind(canonical_amount(order.fee, SETTLEMENT_PRECISION))
    .bind(order.fee_type.code())
    .bind(OrderStatusType::Pending)
    .bind(now)
    .bind(order.expires_at)
    .bind(now)
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => Ok(order),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            if e.message().contains("unique_amount") {
                Err(StoreError::AmountCollision {
                    chain: order.chain.to_string(),
                    address: order.to_address,
                    amount: unique_amount.unwrap_or_default(),
                })
            } else {
                Err(StoreError::OrderAlreadyExists(order.trade_no))
            }
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, StoreError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = ?").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

/// Which column a pending-order lookup compares the observed amount against.
#[derive(Debug, Clone, Copy)]
pub enum AmountColumn {
    Unique,
    Legacy,
}

pub async fn find_pending_by_amount(
    chain: Chain,
    address: Option<&str>,
    amount: Decimal,
    column: AmountColumn,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StoreError> {
    let amount = canonical_amount(amount, chain.precision());
    let q = match column {
        AmountColumn::Unique => {
            r#"SELECT * FROM orders WHERE chain = ? AND status = ? AND unique_amount = ?
            AND (? IS NULL OR to_address = ?) ORDER BY created_at ASC, id ASC LIMIT 1"#
        },
        AmountColumn::Legacy => {
            r#"SELECT * FROM orders WHERE chain = ? AND status = ? AND amount = ?
            AND (? IS NULL OR to_address = ?) ORDER BY created_at ASC, id ASC LIMIT 1"#
        },
    };
    trace!("🗃️ Looking for a pending {chain} order of {amount} ({column:?}) at {address:?}");
    let order = sqlx::query_as(q)
        .bind(chain)
        .bind(OrderStatusType::Pending)
        .bind(amount)
        .bind(address)
        .bind(address)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// The optimistic settlement update. The `status = ?` guard is what makes the transition happen at most once.
pub async fn conditional_settle(
    order_id: i64,
    expected: OrderStatusType,
    fields: SettlementFields,
    conn: &mut SqliteConnection,
) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"UPDATE orders SET status = ?, tx_hash = ?, from_address = ?, actual_amount = ?, paid_at = ?, updated_at = ?
        WHERE id = ? AND status = ?"#,
    )
    .bind(OrderStatusType::Paid)
    .bind(fields.tx_hash)
    .bind(fields.from_address)
    .bind(fields.actual_amount.to_string())
    .bind(fields.paid_at)
    .bind(Utc::now())
    .bind(order_id)
    .bind(expected)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn list_pending_amounts(chain: Chain, conn: &mut SqliteConnection) -> Result<Vec<Decimal>, StoreError> {
    let rows = sqlx::query(
        "SELECT unique_amount FROM orders WHERE chain = ? AND status = ? AND unique_amount IS NOT NULL",
    )
    .bind(chain)
    .bind(OrderStatusType::Pending)
    .fetch_all(conn)
    .await?;
    let amounts = rows.iter().map(|row| rows::decimal(row, "unique_amount")).collect::<Result<Vec<_>, _>>()?;
    Ok(amounts)
}

pub async fn expire_pending_orders(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<Order>, StoreError> {
    let orders = sqlx::query_as(
        "UPDATE orders SET status = ?, updated_at = ? WHERE status = ? AND expires_at < ? RETURNING *",
    )
    .bind(OrderStatusType::Expired)
    .bind(now)
    .bind(OrderStatusType::Pending)
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}
