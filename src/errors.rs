use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalculationError {
    #[error("invalid parameter: {message}")]
    InvalidParameter {
        message: String,
    },

    #[error("arithmetic overflow: {message}")]
    ArithmeticOverflow {
        message: String,
    },

    #[error("invalid date: {message}")]
    DateOverflow {
        message: String,
    },

    #[error("batch initialization failed: {message}")]
    BatchInitialization {
        message: String,
    },

    #[error("worker failure at position {index}: {message}")]
    WorkerFailure {
        index: usize,
        message: String,
    },

    #[error("deadline {deadline} passed before the account was evaluated")]
    Timeout {
        deadline: DateTime<Utc>,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

impl CalculationError {
    pub(crate) fn invalid_parameter(message: impl Into<String>) -> Self {
        CalculationError::InvalidParameter {
            message: message.into(),
        }
    }

    pub(crate) fn overflow(message: impl Into<String>) -> Self {
        CalculationError::ArithmeticOverflow {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CalculationError>;
