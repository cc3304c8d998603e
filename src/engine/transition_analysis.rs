use uuid::Uuid;

use super::{prompts, Engine, Phase, PhaseError, PhaseOutcome};
use crate::db::{chapters, parts};
use crate::generation::GenerationRequest;
use crate::models::{Chapter, ChapterStatus, TextOutput};
use crate::personas::CONTINUITY_EDITOR;

pub const FIRST_CHAPTER_FEEDBACK: &str =
    "This is the first chapter of its part; there is no preceding chapter to transition from.";

impl Engine {
    /// Review how a chapter follows from its predecessor in the same part.
    pub async fn analyze_transition(&self, chapter_id: Uuid) -> PhaseOutcome {
        let result = self.try_analyze_transition(chapter_id).await;
        self.finish(
            Phase::TransitionAnalysis,
            chapter_id,
            result,
            failure_status,
            chapters::set_status,
        )
    }

    async fn try_analyze_transition(&self, chapter_id: Uuid) -> Result<(), PhaseError> {
        let chapter = self
            .db
            .read(|conn| chapters::get(conn, chapter_id))?
            .ok_or_else(|| PhaseError::not_found("chapter", chapter_id))?;

        let predecessor = self
            .db
            .read(|conn| chapters::predecessor(conn, chapter.part_id, chapter.chapter_number))?;
        let Some(predecessor) = predecessor else {
            return self.mark_first_in_part(&chapter);
        };

        let preceding = content_of(&predecessor)?;
        let current = content_of(&chapter)?;
        chapter.status.transition(ChapterStatus::TransitionAnalyzed)?;

        let project_id = self
            .db
            .read(|conn| parts::get(conn, chapter.part_id))?
            .map(|part| part.project_id)
            .ok_or_else(|| PhaseError::not_found("part", chapter.part_id))?;

        let persona = self.persona(CONTINUITY_EDITOR)?;
        let request = GenerationRequest::new(prompts::transition(preceding, current))
            .expecting::<TextOutput>("transition_feedback");
        let result = self.generate(persona, request).await?;

        self.commit(project_id, Phase::TransitionAnalysis, &result, |tx| {
            let feedback = result.text()?;
            if feedback.trim().is_empty() {
                return Err(PhaseError::InvalidOutput("transition feedback is empty".to_string()));
            }
            let current = chapters::get(tx, chapter_id)?
                .ok_or_else(|| PhaseError::not_found("chapter", chapter_id))?;
            let next = current.status.transition(ChapterStatus::TransitionAnalyzed)?;
            chapters::set_transition_feedback(tx, chapter_id, feedback.trim(), next)?;
            Ok(())
        })
    }

    /// The first chapter has nothing to transition from: store the fixed
    /// feedback without calling the generation service.
    fn mark_first_in_part(&self, chapter: &Chapter) -> Result<(), PhaseError> {
        let status = if chapter.status.can_transition_to(ChapterStatus::TransitionDone) {
            ChapterStatus::TransitionDone
        } else {
            chapter.status
        };
        self.db
            .read(|conn| chapters::set_transition_feedback(conn, chapter.id, FIRST_CHAPTER_FEEDBACK, status))?;
        Ok(())
    }
}

fn content_of(chapter: &Chapter) -> Result<&str, PhaseError> {
    chapter
        .content
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or(PhaseError::MissingContent(chapter.id))
}

fn failure_status(err: &PhaseError) -> Option<ChapterStatus> {
    match err {
        PhaseError::NotFound { .. } | PhaseError::Transition(_) => None,
        PhaseError::UpstreamUnavailable => Some(ChapterStatus::UpstreamUnavailable),
        PhaseError::MissingContent(_) => Some(ChapterStatus::ContentMissingForTransition),
        e if e.is_business_failure() => Some(ChapterStatus::TransitionAnalysisFailed),
        _ => Some(ChapterStatus::TransitionAnalysisError),
    }
}
