use uuid::Uuid;

use super::{prompts, Engine, Phase, PhaseError, PhaseOutcome};
use crate::db::{parts, projects};
use crate::generation::GenerationRequest;
use crate::models::{ChapterListOutline, PartStatus, ProjectStatus};
use crate::personas::CHAPTER_ARCHITECT;

pub const MIN_CHAPTERS: usize = 3;

impl Engine {
    /// Propose the chapters of a validated part. The proposal is merged into
    /// the project's per-part chapter draft; real chapters are only created
    /// when a human finalizes it.
    pub async fn detail_chapters(&self, part_id: Uuid) -> PhaseOutcome {
        let result = self.try_detail_chapters(part_id).await;
        self.finish(
            Phase::ChapterDetailing,
            part_id,
            result,
            failure_status,
            parts::set_status,
        )
    }

    async fn try_detail_chapters(&self, part_id: Uuid) -> Result<(), PhaseError> {
        let part = self
            .db
            .read(|conn| parts::get(conn, part_id))?
            .ok_or_else(|| PhaseError::not_found("part", part_id))?;

        let has_summary = part
            .summary
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if part.title.trim().is_empty() || !has_summary {
            return Err(PhaseError::Precondition(format!(
                "part {} needs a title and a summary",
                part.part_number
            )));
        }
        part.status.transition(PartStatus::ChaptersPendingValidation)?;

        let persona = self.persona(CHAPTER_ARCHITECT)?;
        let writers = self.personas.authors();
        let request = GenerationRequest::new(prompts::chapter_detailing(&part, &writers))
            .expecting::<ChapterListOutline>("chapter_list_outline");
        let result = self.generate(persona, request).await?;

        self.commit(part.project_id, Phase::ChapterDetailing, &result, |tx| {
            let outline: ChapterListOutline = result.parse()?;
            outline.validate(MIN_CHAPTERS)?;
            for chapter in &outline.chapters {
                if self.personas.author(&chapter.suggested_role).is_none() {
                    tracing::warn!(
                        part_id = %part_id,
                        chapter = chapter.chapter_number,
                        role = %chapter.suggested_role,
                        "Suggested role is not an authoring persona"
                    );
                }
            }

            let project = projects::get(tx, part.project_id)?
                .ok_or_else(|| PhaseError::not_found("project", part.project_id))?;
            let current = parts::get(tx, part_id)?
                .ok_or_else(|| PhaseError::not_found("part", part_id))?;
            let next = current
                .status
                .transition(PartStatus::ChaptersPendingValidation)?;

            let draft = project.draft.with_chapters_for(part_id, outline.chapters);
            projects::set_draft(tx, project.id, &draft)?;
            parts::set_status(tx, part_id, next)?;
            if project
                .status
                .can_transition_to(ProjectStatus::ChaptersPendingValidation)
            {
                projects::set_status(tx, project.id, ProjectStatus::ChaptersPendingValidation)?;
            }
            Ok(())
        })
    }
}

fn failure_status(err: &PhaseError) -> Option<PartStatus> {
    match err {
        PhaseError::NotFound { .. } | PhaseError::Transition(_) => None,
        PhaseError::UpstreamUnavailable => Some(PartStatus::UpstreamUnavailable),
        e if e.is_business_failure() => Some(PartStatus::ChapterDetailingFailed),
        _ => Some(PartStatus::ChapterDetailingError),
    }
}
