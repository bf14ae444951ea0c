use thiserror::Error;

#[derive(Debug, Error)]
pub enum VestguardError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type VestguardResult<T> = Result<T, VestguardError>;
