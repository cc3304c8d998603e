//! In-process job queue and the worker adapter that runs phase handlers.
//!
//! One job name per phase handler. Jobs are identified by name plus
//! arguments; enqueueing a job identical to one still queued or running
//! returns the existing handle, so duplicate requests never race on the
//! same entity.

mod queue;
mod worker;

pub use queue::{JobHandle, JobQueue, JobRecord, JobStatus, DEFAULT_RETAINED_JOBS};
pub use worker::run_job;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::{FinalizationTask, PhaseOutcome};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("{job} expects {expected} argument(s), got {actual}")]
    Arity {
        job: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid entity id '{0}'")]
    InvalidId(String),

    #[error("unknown finalization task type '{0}'")]
    UnknownTaskType(String),

    #[error("job queue is shut down")]
    Closed,
}

/// A unit of work for one phase handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "job_name", rename_all = "snake_case")]
pub enum Job {
    #[serde(rename = "part_generation_worker")]
    PartGeneration { project_id: Uuid },
    #[serde(rename = "chapter_detailing_worker")]
    ChapterDetailing { part_id: Uuid },
    #[serde(rename = "chapter_generation_worker")]
    ChapterGeneration { chapter_id: Uuid },
    #[serde(rename = "transition_analysis_worker")]
    TransitionAnalysis { chapter_id: Uuid },
    #[serde(rename = "finalization_worker")]
    Finalization {
        project_id: Uuid,
        task_type: FinalizationTask,
    },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PartGeneration { .. } => "part_generation_worker",
            Self::ChapterDetailing { .. } => "chapter_detailing_worker",
            Self::ChapterGeneration { .. } => "chapter_generation_worker",
            Self::TransitionAnalysis { .. } => "transition_analysis_worker",
            Self::Finalization { .. } => "finalization_worker",
        }
    }

    /// The entity the job acts on.
    pub fn entity_id(&self) -> Uuid {
        match self {
            Self::PartGeneration { project_id } | Self::Finalization { project_id, .. } => *project_id,
            Self::ChapterDetailing { part_id } => *part_id,
            Self::ChapterGeneration { chapter_id } | Self::TransitionAnalysis { chapter_id } => {
                *chapter_id
            }
        }
    }

    /// Decode a queue payload: a job name and its positional arguments.
    pub fn from_args(job_name: &str, args: &[&str]) -> Result<Self, JobError> {
        let (name, expected) = match job_name {
            "part_generation_worker" => ("part_generation_worker", 1),
            "chapter_detailing_worker" => ("chapter_detailing_worker", 1),
            "chapter_generation_worker" => ("chapter_generation_worker", 1),
            "transition_analysis_worker" => ("transition_analysis_worker", 1),
            "finalization_worker" => ("finalization_worker", 2),
            other => return Err(JobError::UnknownJob(other.to_string())),
        };
        if args.len() != expected {
            return Err(JobError::Arity {
                job: name,
                expected,
                actual: args.len(),
            });
        }

        let id = Uuid::parse_str(args[0].trim())
            .map_err(|_| JobError::InvalidId(args[0].to_string()))?;
        Ok(match name {
            "part_generation_worker" => Self::PartGeneration { project_id: id },
            "chapter_detailing_worker" => Self::ChapterDetailing { part_id: id },
            "chapter_generation_worker" => Self::ChapterGeneration { chapter_id: id },
            "transition_analysis_worker" => Self::TransitionAnalysis { chapter_id: id },
            _ => Self::Finalization {
                project_id: id,
                task_type: FinalizationTask::from_str(args[1].trim())
                    .ok_or_else(|| JobError::UnknownTaskType(args[1].to_string()))?,
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResultStatus {
    Success,
    Failure,
}

/// What a finished job reports back through its handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobResult {
    pub status: JobResultStatus,
    pub job_name: &'static str,
    pub entity_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<FinalizationTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    pub fn from_outcome(job: &Job, outcome: &PhaseOutcome) -> Self {
        let error = match outcome {
            PhaseOutcome::Success => None,
            PhaseOutcome::UpstreamUnavailable => Some("upstream unavailable; circuit open".to_string()),
            PhaseOutcome::Failure { reason } => Some(reason.clone()),
        };
        Self::new(job, error)
    }

    pub fn failed(job: &Job, error: impl Into<String>) -> Self {
        Self::new(job, Some(error.into()))
    }

    fn new(job: &Job, error: Option<String>) -> Self {
        let task_type = match job {
            Job::Finalization { task_type, .. } => Some(*task_type),
            _ => None,
        };
        Self {
            status: if error.is_none() {
                JobResultStatus::Success
            } else {
                JobResultStatus::Failure
            },
            job_name: job.name(),
            entity_id: job.entity_id(),
            task_type,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobResultStatus::Success
    }
}
