//! Row mapping. Amounts live in TEXT columns, so the mapping is done by hand rather than with `#[derive(FromRow)]`.
use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use crate::db_types::{FeeType, Order, TransactionLog};

fn decode_error<E: std::error::Error + Send + Sync + 'static>(column: &str, e: E) -> sqlx::Error {
    sqlx::Error::ColumnDecode { index: column.to_string(), source: Box::new(e) }
}

pub(crate) fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| decode_error(column, e))
}

pub(crate) fn optional_decimal(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|e| decode_error(column, e))).transpose()
}

impl FromRow<'_, SqliteRow> for Order {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let fee_type = FeeType::try_from(row.try_get::<i64, _>("fee_type")?).map_err(|e| decode_error("fee_type", e))?;
        Ok(Order {
            id: row.try_get("id")?,
            trade_no: row.try_get("trade_no")?,
            merchant_id: row.try_get("merchant_id")?,
            chain: row.try_get("chain")?,
            to_address: row.try_get("to_address")?,
            amount: decimal(row, "amount")?,
            unique_amount: optional_decimal(row, "unique_amount")?,
            actual_amount: optional_decimal(row, "actual_amount")?,
            settlement_amount: decimal(row, "settlement_amount")?,
            fee: decimal(row, "fee")?,
            fee_type,
            status: row.try_get("status")?,
            tx_hash: row.try_get("tx_hash")?,
            from_address: row.try_get("from_address")?,
            created_at: row.try_get("created_at")?,
            paid_at: row.try_get("paid_at")?,
            expires_at: row.try_get("expires_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for TransactionLog {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let block_number: i64 = row.try_get("block_number")?;
        Ok(TransactionLog {
            id: row.try_get("id")?,
            tx_hash: row.try_get("tx_hash")?,
            chain: row.try_get("chain")?,
            from_address: row.try_get("from_address")?,
            to_address: row.try_get("to_address")?,
            amount: decimal(row, "amount")?,
            block_number: u64::try_from(block_number).unwrap_or_default(),
            matched: row.try_get("matched")?,
            order_id: row.try_get("order_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
