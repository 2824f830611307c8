use chrono::Utc;
use sqlx::SqliteConnection;

use crate::traits::StoreError;

pub async fn fetch_value(key: &str, conn: &mut SqliteConnection) -> Result<Option<String>, StoreError> {
    let value = sqlx::query_scalar("SELECT value FROM system_config WHERE key = ?")
        .bind(key)
        .fetch_optional(conn)
        .await?;
    Ok(value)
}

pub async fn upsert_value(key: &str, value: &str, conn: &mut SqliteConnection) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO system_config (key, value, updated_at) VALUES (?, ?, ?)
        ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}
