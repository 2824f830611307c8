use chrono::Utc;
use sqlx::SqliteConnection;

use crate::{
    db_types::{TransactionLog, Transfer},
    traits::{InsertLogResult, StoreError},
};

pub async fn idempotent_insert(
    transfer: &Transfer,
    conn: &mut SqliteConnection,
) -> Result<InsertLogResult, StoreError> {
    let block_number = i64::try_from(transfer.block_number).unwrap_or(i64::MAX);
    match sqlx::query_as::<_, TransactionLog>(
        r#"INSERT INTO transaction_logs (tx_hash, chain, from_address, to_address, amount, block_number, matched,
            created_at)
        VALUES (?, ?, ?, ?, ?, ?, FALSE, ?)
        RETURNING *"#,
    )
    .bind(&transfer.tx_hash)
    .bind(transfer.chain)
    .bind(&transfer.from_address)
    .bind(&transfer.to_address)
    .bind(transfer.amount.to_string())
    .bind(block_number)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
    {
        Ok(log) => Ok(InsertLogResult::Inserted(log)),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Ok(InsertLogResult::AlreadyExists(transfer.tx_hash.clone()))
        },
        Err(e) => Err(StoreError::from(e)),
    }
}

pub async fn exists(tx_hash: &str, conn: &mut SqliteConnection) -> Result<bool, StoreError> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM transaction_logs WHERE tx_hash = ?")
        .bind(tx_hash)
        .fetch_optional(conn)
        .await?;
    Ok(found.is_some())
}

pub async fn fetch_log(tx_hash: &str, conn: &mut SqliteConnection) -> Result<Option<TransactionLog>, StoreError> {
    let log =
        sqlx::query_as("SELECT * FROM transaction_logs WHERE tx_hash = ?").bind(tx_hash).fetch_optional(conn).await?;
    Ok(log)
}

pub async fn mark_matched(tx_hash: &str, order_id: i64, conn: &mut SqliteConnection) -> Result<(), StoreError> {
    sqlx::query("UPDATE transaction_logs SET matched = TRUE, order_id = ? WHERE tx_hash = ?")
        .bind(order_id)
        .bind(tx_hash)
        .execute(conn)
        .await?;
    Ok(())
}
