use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use chain_pay_engine::{matcher::MatchError, StoreError, WatcherError};
use log::error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    ChainUnavailable(String),
    #[error("Refused. {0}")]
    Forbidden(String),
    #[error("The watcher is shutting down. Try again once the server has restarted.")]
    ShuttingDown,
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) | Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            // A chain that exists but is not scanned here is reported like a missing resource
            Self::NoRecordFound(_) | Self::ChainUnavailable(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::InitializeError(_) | Self::BackendError(_) | Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            error!("💻️ {self}");
        }
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        Self::BackendError(format!("Database error: {e}"))
    }
}

impl From<WatcherError> for ServerError {
    fn from(e: WatcherError) -> Self {
        match e {
            WatcherError::UnknownChain(_) => Self::InvalidRequestPath(e.to_string()),
            WatcherError::ChainUnavailable(_) => Self::ChainUnavailable(e.to_string()),
            WatcherError::ShuttingDown => Self::ShuttingDown,
            WatcherError::Store(e) => e.into(),
            WatcherError::Initialization(_) | WatcherError::Scan(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<MatchError> for ServerError {
    fn from(e: MatchError) -> Self {
        match e {
            MatchError::NotPassive(_) => Self::ChainUnavailable(e.to_string()),
            MatchError::ChannelDisabled(_) => Self::Forbidden(e.to_string()),
            MatchError::InvalidAmount(_) | MatchError::InvalidReference(_) => Self::InvalidRequestBody(e.to_string()),
            MatchError::Store(e) => e.into(),
        }
    }
}
