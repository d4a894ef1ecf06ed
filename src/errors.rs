use crate::core::controls::dispatch::Operation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LesaError {
    #[error("Request was considered invalid due to error: {0}")]
    InvalidRequest(#[from] anyhow::Error),
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Error identified during LESA calculation: {0}")]
    FailureInCalculation(#[from] LesaCoreError),
    #[error("Dispatch committed more energy than was available: {0}")]
    InvariantViolation(#[from] InvariantViolation),
    #[error("Error during postprocessing: {0}")]
    ErrorInPostprocessing(PostprocessingError),
    #[error("{0}")]
    NotImplemented(#[from] NotImplementedError),
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct LesaCoreError {
    error: anyhow::Error,
}

impl LesaCoreError {
    pub(crate) fn new(error: anyhow::Error) -> Self {
        Self { error }
    }
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct PostprocessingError {
    error: anyhow::Error,
}

impl PostprocessingError {
    pub fn new(error: anyhow::Error) -> Self {
        Self { error }
    }
}

/// Problems with the supplied configuration, all detected before the first hour is simulated.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("Unknown {kind} '{value}', expected one of: {expected}")]
    UnknownVariant {
        kind: &'static str,
        value: String,
        expected: String,
    },
    #[error("The final timestep is {final_hour} which is beyond the end of the year ({hours_per_year})")]
    WindowOutOfRange {
        final_hour: usize,
        hours_per_year: usize,
    },
    #[error("Dispatch order {name} must be a permutation of the ranks 1 to {expected_len}, got {ranks:?}")]
    InvalidDispatchOrder {
        name: &'static str,
        expected_len: usize,
        ranks: Vec<usize>,
    },
    #[error("Time series '{name}' has {len} values but {required} are needed for the simulated window")]
    TimeSeriesTooShort {
        name: &'static str,
        len: usize,
        required: usize,
    },
    #[error("Time series '{name}' is required by this configuration but was not provided")]
    MissingTimeSeries { name: &'static str },
    #[error("{0}")]
    Invalid(String),
}

/// A running check went materially negative after an operation committed its quantity.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("operation '{operation}' at hour {hour} left running check '{check}' at {value}")]
pub struct InvariantViolation {
    pub hour: usize,
    pub operation: Operation,
    pub check: &'static str,
    pub value: f64,
}

/// An error representing that an area of functionality has not been implemented.
#[derive(Clone, Debug, Error)]
#[error("Not implemented: {0}")]
pub struct NotImplementedError(String);

impl NotImplementedError {
    pub(crate) fn new(message: &str) -> Self {
        NotImplementedError(message.to_string())
    }
}
