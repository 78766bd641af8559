//! Builder error types

use iaas_setup::{IaasError, Resource, ResourceId, SetupFailure};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The resource exists but did not reach its final configuration
    #[error("resource {id} was created but not completed: {source}")]
    Incomplete {
        id: ResourceId,
        #[source]
        source: IaasError,
    },

    #[error(transparent)]
    Iaas(#[from] IaasError),
}

impl BuilderError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        BuilderError::Validation(msg.into())
    }

    pub(crate) fn incomplete(id: ResourceId, source: IaasError) -> Self {
        BuilderError::Incomplete { id, source }
    }

    /// ID of a resource left behind by a failed build
    pub fn partial_resource_id(&self) -> Option<ResourceId> {
        match self {
            BuilderError::Incomplete { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl<S: Resource> From<SetupFailure<S>> for BuilderError {
    fn from(failure: SetupFailure<S>) -> Self {
        match failure.into_parts() {
            (Some(resource), source) => BuilderError::incomplete(resource.id(), source),
            (None, source) => BuilderError::Iaas(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuilderError>;
