use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The order {0} does not exist")]
    OrderNotFound(i64),
    #[error("An order with trade number {0} already exists")]
    OrderAlreadyExists(String),
    #[error("Another pending order on {chain}:{address} already expects {amount}")]
    AmountCollision { chain: String, address: String, amount: String },
    #[error("The merchant {0} does not exist")]
    MerchantNotFound(i64),
    #[error("Stored data could not be interpreted: {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}
