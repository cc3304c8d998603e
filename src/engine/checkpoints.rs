//! Human checkpoints: validating drafts into real rows, and chapter review.

use uuid::Uuid;

use super::{Engine, PhaseError};
use crate::db::{chapters, parts, projects};
use crate::models::*;

impl Engine {
    /// Replace the project's parts with the (possibly edited) list a human
    /// approved, and drop the draft.
    pub fn finalize_parts(
        &self,
        project_id: Uuid,
        outline: PartListOutline,
    ) -> Result<Vec<Part>, PhaseError> {
        outline.validate(1)?;

        let created = self.db.transaction(|tx| {
            let project = projects::get(tx, project_id)?
                .ok_or_else(|| PhaseError::not_found("project", project_id))?;
            let next = project.status.transition(ProjectStatus::PartsValidated)?;

            let created = parts::replace_all(tx, project_id, &outline.parts)?;
            projects::set_draft(tx, project_id, &DraftOutline::None)?;
            projects::set_status(tx, project_id, next)?;
            Ok::<_, PhaseError>(created)
        })?;

        tracing::info!(project_id = %project_id, parts = created.len(), "Parts finalized");
        Ok(created)
    }

    /// Replace a part's chapters with the approved list and prune that part
    /// from the chapter draft. Once no part has a pending draft the project
    /// moves to `chapters_validated`.
    pub fn finalize_chapters(
        &self,
        part_id: Uuid,
        outline: ChapterListOutline,
    ) -> Result<Vec<Chapter>, PhaseError> {
        outline.validate(1)?;

        let created = self.db.transaction(|tx| {
            let part = parts::get(tx, part_id)?
                .ok_or_else(|| PhaseError::not_found("part", part_id))?;
            let next = part.status.transition(PartStatus::ChaptersValidated)?;
            let project = projects::get(tx, part.project_id)?
                .ok_or_else(|| PhaseError::not_found("project", part.project_id))?;

            let created = chapters::replace_all(tx, part_id, &outline.chapters)?;
            parts::set_status(tx, part_id, next)?;

            let draft = project.draft.without_chapters_for(part_id);
            projects::set_draft(tx, project.id, &draft)?;
            if draft.is_none()
                && project
                    .status
                    .can_transition_to(ProjectStatus::ChaptersValidated)
            {
                projects::set_status(tx, project.id, ProjectStatus::ChaptersValidated)?;
            }
            Ok::<_, PhaseError>(created)
        })?;

        tracing::info!(part_id = %part_id, chapters = created.len(), "Chapters finalized");
        Ok(created)
    }

    /// Store a human edit as a new version. This is the one place a chapter's
    /// status may move backwards.
    pub fn review_chapter(
        &self,
        chapter_id: Uuid,
        input: ReviewChapterInput,
    ) -> Result<ChapterVersion, PhaseError> {
        let status = input.status.unwrap_or(ChapterStatus::ContentReviewed);
        if !status.is_review_target() {
            return Err(PhaseError::Precondition(format!(
                "review cannot set status '{}'",
                status.as_str()
            )));
        }
        if input.content.trim().is_empty() {
            return Err(PhaseError::Precondition("reviewed content is empty".to_string()));
        }

        let version = self.db.transaction(|tx| {
            if chapters::get(tx, chapter_id)?.is_none() {
                return Err(PhaseError::not_found("chapter", chapter_id));
            }
            Ok(chapters::write_content(tx, chapter_id, &input.content, None, status)?)
        })?;

        tracing::info!(chapter_id = %chapter_id, version = version.version, "Chapter reviewed");
        Ok(version)
    }
}
