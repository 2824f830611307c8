use thiserror::Error;

use crate::{db_types::Chain, traits::StoreError};

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0} is not a passive channel and does not accept push payments")]
    NotPassive(Chain),
    #[error("The {0} channel is disabled")]
    ChannelDisabled(Chain),
    #[error("Invalid payment amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid payment reference: {0}")]
    InvalidReference(String),
}
