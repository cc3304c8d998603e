use uuid::Uuid;

use super::{prompts, Engine, Phase, PhaseError, PhaseOutcome};
use crate::db::{chapters, parts};
use crate::generation::{GenerationRequest, GenerationResult};
use crate::ledger::{Extraction, TokenCounts};
use crate::models::{ChapterStatus, TextOutput};

impl Engine {
    /// Write a chapter's content with the persona named by its suggested
    /// role. Every successful write appends a new version.
    pub async fn write_chapter(&self, chapter_id: Uuid) -> PhaseOutcome {
        let result = self.try_write_chapter(chapter_id).await;
        self.finish(
            Phase::ChapterContent,
            chapter_id,
            result,
            failure_status,
            chapters::set_status,
        )
    }

    async fn try_write_chapter(&self, chapter_id: Uuid) -> Result<(), PhaseError> {
        let (chapter, part) = self.db.read(|conn| {
            let Some(chapter) = chapters::get(conn, chapter_id)? else {
                return Ok(None);
            };
            let part = parts::get(conn, chapter.part_id)?;
            Ok(part.map(|part| (chapter, part)))
        })?
        .ok_or_else(|| PhaseError::not_found("chapter", chapter_id))?;

        let brief = chapter
            .brief
            .as_ref()
            .ok_or(PhaseError::MissingBrief(chapter_id))?;
        if chapter.title.trim().is_empty() {
            return Err(PhaseError::Precondition("chapter has no title".to_string()));
        }
        chapter.status.transition(ChapterStatus::ContentGenerated)?;

        let persona = self
            .personas
            .author(&chapter.suggested_role)
            .ok_or_else(|| PhaseError::UnknownPersona(chapter.suggested_role.clone()))?;
        let request = GenerationRequest::new(prompts::chapter_content(&chapter, brief))
            .expecting::<TextOutput>("chapter_text");
        let result = self.generate(persona, request).await?;

        self.commit(part.project_id, Phase::ChapterContent, &result, |tx| {
            let text = result.text()?;
            if text.trim().is_empty() {
                return Err(PhaseError::InvalidOutput("chapter text is empty".to_string()));
            }

            let current = chapters::get(tx, chapter_id)?
                .ok_or_else(|| PhaseError::not_found("chapter", chapter_id))?;
            let next = current.status.transition(ChapterStatus::ContentGenerated)?;

            let version = chapters::write_content(tx, chapter_id, &text, completion_tokens(&result), next)?;
            tracing::debug!(chapter_id = %chapter_id, version = version.version, "Chapter version written");
            Ok(())
        })
    }
}

/// Tokens spent producing the text, if the usage payload says.
pub(super) fn completion_tokens(result: &GenerationResult) -> Option<i64> {
    match TokenCounts::extract(&result.usage) {
        Extraction::Counts(counts) => i64::try_from(counts.completion).ok(),
        Extraction::Negative(_) => None,
    }
}

fn failure_status(err: &PhaseError) -> Option<ChapterStatus> {
    match err {
        PhaseError::NotFound { .. } | PhaseError::Transition(_) => None,
        PhaseError::UpstreamUnavailable => Some(ChapterStatus::UpstreamUnavailable),
        PhaseError::UnknownPersona(_) => Some(ChapterStatus::AgentNotFound),
        PhaseError::MissingBrief(_) => Some(ChapterStatus::BriefMissing),
        e if e.is_business_failure() => Some(ChapterStatus::ContentGenFailed),
        _ => Some(ChapterStatus::ContentGenError),
    }
}
