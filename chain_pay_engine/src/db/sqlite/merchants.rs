use chrono::Utc;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use crate::{
    db_types::FeeType,
    traits::{MerchantBalance, StoreError},
};

const MICROS_PER_UNIT: i64 = 1_000_000;

fn to_micros(amount: Decimal) -> Result<i64, StoreError> {
    (amount * Decimal::from(MICROS_PER_UNIT))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| StoreError::InvalidData(format!("{amount} cannot be stored as a balance")))
}

fn from_micros(micros: i64) -> Decimal {
    Decimal::new(micros, 6)
}

fn balance_from_row(row: &SqliteRow) -> Result<MerchantBalance, sqlx::Error> {
    Ok(MerchantBalance {
        merchant_id: row.try_get("id")?,
        balance: from_micros(row.try_get("balance")?),
        frozen_balance: from_micros(row.try_get("frozen_balance")?),
    })
}

pub async fn insert_merchant(name: &str, conn: &mut SqliteConnection) -> Result<i64, StoreError> {
    let now = Utc::now();
    let result = sqlx::query("INSERT INTO merchants (name, created_at, updated_at) VALUES (?, ?, ?)")
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(result.last_insert_rowid())
}

/// The balance and frozen balance movements for a settled order.
pub fn balance_deltas(settlement_amount: Decimal, fee: Decimal, fee_type: FeeType) -> (Decimal, Decimal) {
    match fee_type {
        FeeType::Balance => (settlement_amount - fee, -fee),
        FeeType::Deduction => (settlement_amount - fee, Decimal::ZERO),
    }
}

pub async fn credit_balance(
    merchant_id: i64,
    settlement_amount: Decimal,
    fee: Decimal,
    fee_type: FeeType,
    conn: &mut SqliteConnection,
) -> Result<MerchantBalance, StoreError> {
    let (balance, frozen) = balance_deltas(settlement_amount, fee, fee_type);
    let row = sqlx::query(
        r#"UPDATE merchants SET balance = balance + ?, frozen_balance = frozen_balance + ?, updated_at = ?
        WHERE id = ? RETURNING id, balance, frozen_balance"#,
    )
    .bind(to_micros(balance)?)
    .bind(to_micros(frozen)?)
    .bind(Utc::now())
    .bind(merchant_id)
    .fetch_optional(conn)
    .await?
    .ok_or(StoreError::MerchantNotFound(merchant_id))?;
    Ok(balance_from_row(&row)?)
}

pub async fn fetch_balance(
    merchant_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<MerchantBalance>, StoreError> {
    let row = sqlx::query("SELECT id, balance, frozen_balance FROM merchants WHERE id = ?")
        .bind(merchant_id)
        .fetch_optional(conn)
        .await?;
    let balance = row.as_ref().map(balance_from_row).transpose()?;
    Ok(balance)
}
