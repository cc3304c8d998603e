use thiserror::Error;
use uuid::Uuid;

use crate::breaker::BreakerError;
use crate::generation::GenerationError;
use crate::models::{OutlineError, TransitionError};

#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("no persona may write as '{0}'")]
    UnknownPersona(String),

    #[error("chapter {0} has no brief")]
    MissingBrief(Uuid),

    #[error("chapter {0} has no content")]
    MissingContent(Uuid),

    #[error("project {0} has no written chapters")]
    NoContent(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("invalid output: {0}")]
    InvalidOutput(String),

    #[error("invalid outline: {0}")]
    Outline(#[from] OutlineError),

    #[error("upstream unavailable; circuit open")]
    UpstreamUnavailable,

    #[error(transparent)]
    Generation(GenerationError),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl PhaseError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// The service answered but the answer was unusable.
    pub fn is_business_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidOutput(_) | Self::Outline(_) | Self::Precondition(_)
        )
    }
}

impl From<rusqlite::Error> for PhaseError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.into())
    }
}

impl From<GenerationError> for PhaseError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::InvalidOutput(msg) => Self::InvalidOutput(msg),
            other => Self::Generation(other),
        }
    }
}

impl From<BreakerError<GenerationError>> for PhaseError {
    fn from(e: BreakerError<GenerationError>) -> Self {
        match e {
            BreakerError::Open => Self::UpstreamUnavailable,
            BreakerError::Inner(inner) => inner.into(),
        }
    }
}
