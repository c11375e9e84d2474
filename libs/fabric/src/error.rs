use conduit_core::Status;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or truncated frame
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Protocol-policy failure or aborted call
    #[error(transparent)]
    Status(#[from] Status),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// The status a call ends with when this error reaches the call boundary
    pub fn to_status(&self) -> Status {
        match self {
            Self::Status(status) => status.clone(),
            Self::InvalidData(msg) => Status::internal(msg.clone()),
            Self::Codec(msg) => Status::internal(msg.clone()),
            Self::Io(e) => Status::unavailable(e.to_string()),
            Self::Custom(msg) => Status::unknown(msg.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
