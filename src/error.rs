use thiserror::Error;

#[derive(Error, Debug)]
pub enum WithdrawError {
    #[error("Invalid amount: {0} (must be a positive integer)")]
    InvalidAmount(i64),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Corrupt value at key '{key}': {value:?}")]
    CorruptValue { key: String, value: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WithdrawError {
    /// A key holding a different kind of value than the operation expects.
    pub fn wrong_type(key: &str) -> Self {
        WithdrawError::CorruptValue {
            key: key.to_string(),
            value: "<wrong type>".to_string(),
        }
    }
}

#[cfg(feature = "storage-redis")]
impl From<redis::RedisError> for WithdrawError {
    fn from(err: redis::RedisError) -> Self {
        WithdrawError::StoreUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WithdrawError>;
