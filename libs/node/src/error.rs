use conduit_core::Status;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Fabric(#[from] conduit_fabric::Error),

    /// Status raised by service or interceptor code
    #[error(transparent)]
    Status(#[from] Status),

    #[error("Value cannot be null. (Parameter '{0}')")]
    ArgumentNull(&'static str),

    #[error("{0}")]
    InvalidOperation(String),

    /// Service instance could not be resolved or constructed
    #[error("Activation error: {0}")]
    Activation(String),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn activation(msg: impl Into<String>) -> Self {
        Self::Activation(msg.into())
    }

    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// The status a call ends with when this error escapes the handler
    ///
    /// Errors that carry a status keep it. Anything else is reported as
    /// `Unknown`, with the error text appended when `detailed` is set.
    pub fn to_status(&self, detailed: bool) -> Status {
        match self {
            Self::Status(status) => status.clone(),
            Self::Fabric(e) => e.to_status(),
            e if detailed => Status::unknown(format!("Exception was thrown by handler. {}", e)),
            _ => Status::unknown("Exception was thrown by handler."),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
