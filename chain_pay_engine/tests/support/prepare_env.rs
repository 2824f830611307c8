use chain_pay_engine::{db_types::Chain, SqliteDatabase};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/cpg_test_{}.db", dir.display(), rand::random::<u64>())
}

/// Creates a fresh, migrated database at `url`.
pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    if let Err(e) = Sqlite::drop_database(url).await {
        trace!("🚀️ Nothing to drop at {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.run_migrations().await.expect("Error running DB migrations");
    debug!("🚀️ Test database ready at {url}");
    db
}

pub async fn tear_down(db: SqliteDatabase) {
    db.close().await;
    if let Err(e) = Sqlite::drop_database(db.url()).await {
        warn!("🚀️ Could not drop {}: {e:?}", db.url());
    }
}

/// A merchant with one watched wallet on `chain`.
pub async fn seed_merchant(db: &SqliteDatabase, chain: Chain, address: &str) -> i64 {
    let merchant = db.insert_merchant("Test merchant").await.expect("Error creating merchant");
    db.insert_wallet(chain, address, Some(merchant), Some("checkout")).await.expect("Error creating wallet");
    merchant
}
