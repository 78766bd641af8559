//! Setup engine error types

use crate::state::{Availability, InstanceStatus};
use std::fmt;
use thiserror::Error;

/// Errors raised by the poller, the setup engine and the wrapped API
#[derive(Error, Debug)]
pub enum IaasError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("max retry count exceeded: no resource became available after {attempts} attempts")]
    MaxRetryExceeded { attempts: u32 },

    #[error(
        "unexpected state: availability={}, instance_status={}",
        display_or_none(.availability),
        display_or_none(.instance_status)
    )]
    UnexpectedState {
        availability: Option<Availability>,
        instance_status: Option<InstanceStatus>,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl IaasError {
    pub fn is_max_retry_exceeded(&self) -> bool {
        matches!(self, IaasError::MaxRetryExceeded { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, IaasError::Cancelled)
    }
}

fn display_or_none<T: fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "none".to_string())
}

pub type Result<T> = std::result::Result<T, IaasError>;

/// Error returned by `RetryableSetup::setup`.
///
/// Carries the resource that was created before the failure, if any, so the
/// caller can decide whether to clean it up or keep it.
#[derive(Debug)]
pub struct SetupFailure<S> {
    pub resource: Option<S>,
    pub source: IaasError,
}

impl<S> SetupFailure<S> {
    pub fn new(source: IaasError) -> Self {
        Self {
            resource: None,
            source,
        }
    }

    pub fn with_resource(source: IaasError, resource: S) -> Self {
        Self {
            resource: Some(resource),
            source,
        }
    }

    pub fn is_max_retry_exceeded(&self) -> bool {
        self.source.is_max_retry_exceeded()
    }

    pub fn into_parts(self) -> (Option<S>, IaasError) {
        (self.resource, self.source)
    }
}

impl<S> fmt::Display for SetupFailure<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource setup failed: {}", self.source)
    }
}

impl<S: fmt::Debug> std::error::Error for SetupFailure<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl<S> From<IaasError> for SetupFailure<S> {
    fn from(source: IaasError) -> Self {
        Self::new(source)
    }
}
