use uuid::Uuid;

use super::{prompts, Engine, Phase, PhaseError, PhaseOutcome};
use crate::db::projects;
use crate::generation::GenerationRequest;
use crate::models::{DraftOutline, PartListOutline, ProjectStatus};
use crate::personas::PART_ARCHITECT;

pub const MIN_PARTS: usize = 3;
const SUGGESTED_MAX_PARTS: usize = 4;

impl Engine {
    /// Propose the book's parts from the project blueprint. The proposal is
    /// stored as the project's draft and waits for human validation.
    pub async fn generate_parts(&self, project_id: Uuid) -> PhaseOutcome {
        let result = self.try_generate_parts(project_id).await;
        self.finish(
            Phase::PartGeneration,
            project_id,
            result,
            failure_status,
            projects::set_status,
        )
    }

    async fn try_generate_parts(&self, project_id: Uuid) -> Result<(), PhaseError> {
        let project = self
            .db
            .read(|conn| projects::get(conn, project_id))?
            .ok_or_else(|| PhaseError::not_found("project", project_id))?;

        if project.raw_blueprint.trim().is_empty() {
            return Err(PhaseError::Precondition("project blueprint is empty".to_string()));
        }
        project
            .status
            .transition(ProjectStatus::PartsPendingValidation)?;

        let persona = self.persona(PART_ARCHITECT)?;
        let request = GenerationRequest::new(prompts::part_generation(&project.raw_blueprint))
            .expecting::<PartListOutline>("part_list_outline");
        let result = self.generate(persona, request).await?;

        self.commit(project_id, Phase::PartGeneration, &result, |tx| {
            let outline: PartListOutline = result.parse()?;
            outline.validate(MIN_PARTS)?;
            if outline.parts.len() > SUGGESTED_MAX_PARTS {
                tracing::warn!(
                    project_id = %project_id,
                    count = outline.parts.len(),
                    "More parts proposed than suggested; keeping them"
                );
            }

            let current = projects::get(tx, project_id)?
                .ok_or_else(|| PhaseError::not_found("project", project_id))?;
            let next = current
                .status
                .transition(ProjectStatus::PartsPendingValidation)?;

            projects::set_draft(tx, project_id, &DraftOutline::Parts(outline.parts))?;
            projects::set_status(tx, project_id, next)?;
            Ok(())
        })
    }
}

fn failure_status(err: &PhaseError) -> Option<ProjectStatus> {
    match err {
        PhaseError::NotFound { .. } | PhaseError::Transition(_) => None,
        PhaseError::UpstreamUnavailable => Some(ProjectStatus::UpstreamUnavailable),
        e if e.is_business_failure() => Some(ProjectStatus::PartGenerationFailed),
        _ => Some(ProjectStatus::PartGenerationError),
    }
}
