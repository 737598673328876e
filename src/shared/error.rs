use std::time::Duration;

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// Service error codes that indicate a transient DynamoDB condition
const RETRYABLE_SERVICE_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ThrottlingException",
    "InternalServerError",
    "ServiceUnavailable",
    "LimitExceededException",
];

/// Errors raised by a store backend
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Store rejected the write: {0}")]
    Rejected(String),

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether the failed call may succeed if repeated
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// Classification of pipeline failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Setup problem; the process must stop
    Configuration,
    /// Transient I/O failure; the cycle is retried after a backoff
    StoreIo,
    /// The store refused or corrupted data for one cycle
    DataIntegrity,
    /// The terminal could not be written
    Output,
}

/// Main error type for the producer and dashboard loops
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

impl TelemetryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TelemetryError::Configuration(_) => ErrorKind::Configuration,
            TelemetryError::Store(e) if e.is_retryable() => ErrorKind::StoreIo,
            TelemetryError::Store(_) => ErrorKind::DataIntegrity,
            TelemetryError::Output(_) => ErrorKind::Output,
        }
    }

    /// Fatal errors end the loop; everything else is logged and retried
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration | ErrorKind::Output)
    }
}

impl<E, R> From<SdkError<E, R>> for StoreError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
    R: std::fmt::Debug,
{
    fn from(err: SdkError<E, R>) -> Self {
        match &err {
            SdkError::ServiceError(service_err) => {
                let code = service_err.err().code().unwrap_or_default();
                if RETRYABLE_SERVICE_CODES.contains(&code) {
                    StoreError::Unavailable(format!("{:?}", err))
                } else {
                    StoreError::Rejected(format!("{:?}", err))
                }
            }
            SdkError::ConstructionFailure(_) => StoreError::Rejected(format!("{:?}", err)),
            _ => StoreError::Unavailable(format!("{:?}", err)),
        }
    }
}

impl From<serde_dynamo::Error> for StoreError {
    fn from(err: serde_dynamo::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
