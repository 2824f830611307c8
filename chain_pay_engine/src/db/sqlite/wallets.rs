use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use crate::{db_types::Chain, traits::StoreError};

const ACTIVE: i64 = 1;
const INACTIVE: i64 = 0;

pub async fn insert_wallet(
    chain: Chain,
    address: &str,
    merchant_id: Option<i64>,
    label: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<i64, StoreError> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"INSERT INTO wallets (merchant_id, chain, address, label, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(merchant_id)
    .bind(chain)
    .bind(address)
    .bind(label)
    .bind(ACTIVE)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn set_wallet_active(id: i64, active: bool, conn: &mut SqliteConnection) -> Result<(), StoreError> {
    let status = if active { ACTIVE } else { INACTIVE };
    sqlx::query("UPDATE wallets SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn soft_delete_wallet(id: i64, conn: &mut SqliteConnection) -> Result<(), StoreError> {
    let now = Utc::now();
    sqlx::query("UPDATE wallets SET deleted_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_active_addresses(chain: Chain, conn: &mut SqliteConnection) -> Result<Vec<String>, StoreError> {
    let addresses = sqlx::query_scalar(
        "SELECT address FROM wallets WHERE chain = ? AND status = ? AND deleted_at IS NULL ORDER BY id",
    )
    .bind(chain)
    .bind(ACTIVE)
    .fetch_all(conn)
    .await?;
    Ok(addresses)
}

pub async fn count_active_wallets(conn: &mut SqliteConnection) -> Result<HashMap<Chain, i64>, StoreError> {
    let rows = sqlx::query(
        "SELECT chain, COUNT(*) AS wallets FROM wallets WHERE status = ? AND deleted_at IS NULL GROUP BY chain",
    )
    .bind(ACTIVE)
    .fetch_all(conn)
    .await?;
    let mut result = HashMap::with_capacity(rows.len());
    for row in rows {
        let chain: Chain = row.try_get("chain")?;
        let count: i64 = row.try_get("wallets")?;
        result.insert(chain, count);
    }
    Ok(result)
}
