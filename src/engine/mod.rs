//! Orchestration engine.
//!
//! Each phase handler follows the same protocol: load the target entity and
//! its ancestors, check preconditions, call the generation service through the
//! circuit breaker, validate the output, then write results, status and usage
//! in one transaction. The public handler methods never return an error; they
//! record a failure status on the owning entity and report a [`PhaseOutcome`].
//!
//! The two human checkpoints and chapter review live in [`checkpoints`]. They
//! make no generation calls and report plain `Result`s to the request layer.

mod checkpoints;
mod chapter_content;
mod chapter_detailing;
mod error;
mod finalization;
mod part_generation;
pub mod prompts;
mod transition_analysis;

pub use error::PhaseError;
pub use finalization::FinalizationTask;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, Transaction};
use serde::Serialize;
use uuid::Uuid;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::db::Database;
use crate::generation::{GenerationError, GenerationRequest, GenerationResult, GenerationService};
use crate::ledger::{PriceTable, UsageLedger};
use crate::personas::{Persona, PersonaRegistry};

/// Name a phase is logged and billed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PartGeneration,
    ChapterDetailing,
    ChapterContent,
    TransitionAnalysis,
    Finalization,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PartGeneration => "part_generation",
            Self::ChapterDetailing => "chapter_detailing",
            Self::ChapterContent => "chapter_content",
            Self::TransitionAnalysis => "transition_analysis",
            Self::Finalization => "finalization",
        }
    }
}

/// Result of one phase handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PhaseOutcome {
    Success,
    /// The circuit was open; no call was made.
    UpstreamUnavailable,
    Failure { reason: String },
}

impl PhaseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<&PhaseError> for PhaseOutcome {
    fn from(err: &PhaseError) -> Self {
        match err {
            PhaseError::UpstreamUnavailable => Self::UpstreamUnavailable,
            other => Self::Failure {
                reason: other.to_string(),
            },
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    db: Database,
    generator: Arc<dyn GenerationService>,
    personas: Arc<PersonaRegistry>,
    breaker: Arc<CircuitBreaker>,
    ledger: Arc<UsageLedger>,
    call_timeout: Duration,
}

impl Engine {
    pub fn new(
        db: Database,
        generator: Arc<dyn GenerationService>,
        personas: Arc<PersonaRegistry>,
    ) -> Self {
        Self {
            db,
            generator,
            personas,
            breaker: Arc::new(CircuitBreaker::new(BreakerConfig::default())),
            ledger: Arc::new(UsageLedger::new(PriceTable::default(), "gpt-4-turbo")),
            call_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_ledger(mut self, ledger: UsageLedger) -> Self {
        self.ledger = Arc::new(ledger);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn persona(&self, role: &str) -> Result<&Persona, PhaseError> {
        self.personas
            .get(role)
            .ok_or_else(|| PhaseError::UnknownPersona(role.to_string()))
    }

    /// The single suspension point of every phase: one guarded, time-bounded
    /// call to the generation service.
    async fn generate(
        &self,
        persona: &Persona,
        request: GenerationRequest,
    ) -> Result<GenerationResult, PhaseError> {
        let timeout = self.call_timeout;
        let generator = &self.generator;
        let result = self
            .breaker
            .call(move || async move {
                match tokio::time::timeout(timeout, generator.run(persona, request)).await {
                    Ok(result) => result,
                    Err(_) => Err(GenerationError::Timeout(timeout)),
                }
            })
            .await?;
        Ok(result)
    }

    /// Record usage and apply `write` in one transaction. If the transaction
    /// fails the usage entry is retried on its own, so every answered call
    /// stays billed.
    fn commit<T>(
        &self,
        project_id: Uuid,
        phase: Phase,
        result: &GenerationResult,
        write: impl FnOnce(&Transaction<'_>) -> Result<T, PhaseError>,
    ) -> Result<T, PhaseError> {
        let outcome = self.db.transaction(|tx| {
            self.ledger.record(tx, project_id, phase.as_str(), result)?;
            write(tx)
        });

        if outcome.is_err() {
            let billed = self
                .db
                .transaction(|tx| self.ledger.record(tx, project_id, phase.as_str(), result));
            if let Err(e) = billed {
                tracing::error!(
                    project_id = %project_id,
                    phase = phase.as_str(),
                    "Usage for an answered call could not be recorded: {:#}",
                    e
                );
            }
        }
        outcome
    }

    /// Convert a handler result into an outcome, recording the failure status
    /// chosen by `failure_status` on the entity.
    fn finish<S: Copy + Debug>(
        &self,
        phase: Phase,
        entity_id: Uuid,
        result: Result<(), PhaseError>,
        failure_status: impl FnOnce(&PhaseError) -> Option<S>,
        mark: impl FnOnce(&Connection, Uuid, S) -> anyhow::Result<bool>,
    ) -> PhaseOutcome {
        let err = match result {
            Ok(()) => {
                tracing::info!(phase = phase.as_str(), entity_id = %entity_id, "Phase completed");
                return PhaseOutcome::Success;
            }
            Err(err) => err,
        };

        if err.is_business_failure() || matches!(err, PhaseError::UpstreamUnavailable) {
            tracing::warn!(phase = phase.as_str(), entity_id = %entity_id, "Phase failed: {}", err);
        } else {
            tracing::error!(phase = phase.as_str(), entity_id = %entity_id, "Phase errored: {:#}", err);
        }

        if let Some(status) = failure_status(&err) {
            match self.db.read(|conn| mark(conn, entity_id, status)) {
                Ok(true) => {}
                Ok(false) => tracing::warn!(
                    phase = phase.as_str(),
                    entity_id = %entity_id,
                    "Entity vanished before failure status {:?} could be recorded",
                    status
                ),
                Err(e) => tracing::error!(
                    phase = phase.as_str(),
                    entity_id = %entity_id,
                    "Unresolved inconsistency: failed to record status {:?}: {:#}",
                    status,
                    e
                ),
            }
        }

        PhaseOutcome::from(&err)
    }
}
