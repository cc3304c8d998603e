use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chapter_content::completion_tokens;
use super::{prompts, Engine, Phase, PhaseError, PhaseOutcome};
use crate::db::{chapters, parts, projects};
use crate::generation::GenerationRequest;
use crate::models::{ChapterStatus, Part, PartKind, PartStatus, ProjectStatus, TextOutput};
use crate::personas::THEORIST;

/// Which framing section of the book to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizationTask {
    Introduction,
    Conclusion,
}

impl FinalizationTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Introduction => "introduction",
            Self::Conclusion => "conclusion",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "introduction" => Some(Self::Introduction),
            "conclusion" => Some(Self::Conclusion),
            _ => None,
        }
    }

    fn kind(&self) -> PartKind {
        match self {
            Self::Introduction => PartKind::Introduction,
            Self::Conclusion => PartKind::Conclusion,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Introduction => "Introduction",
            Self::Conclusion => "Conclusion",
        }
    }
}

impl Engine {
    /// Write the introduction or conclusion from the whole book.
    ///
    /// Each task owns one synthetic part holding a single chapter. The first
    /// run creates them; later runs append a new version to the same chapter.
    /// The introduction is part 0 and the conclusion always sits right after
    /// the highest other part.
    pub async fn finalize_book(&self, project_id: Uuid, task: FinalizationTask) -> PhaseOutcome {
        let result = self.try_finalize_book(project_id, task).await;
        self.finish(
            Phase::Finalization,
            project_id,
            result,
            failure_status,
            projects::set_status,
        )
    }

    async fn try_finalize_book(
        &self,
        project_id: Uuid,
        task: FinalizationTask,
    ) -> Result<(), PhaseError> {
        let (project, book) = self.db.read(|conn| {
            let project = projects::get(conn, project_id)?;
            let book = chapters::written_in_project(conn, project_id)?;
            Ok((project, book))
        })?;
        let project = project.ok_or_else(|| PhaseError::not_found("project", project_id))?;

        if book.is_empty() {
            return Err(PhaseError::NoContent(project_id));
        }
        project.status.transition(ProjectStatus::Complete)?;

        let persona = self.persona(THEORIST)?;
        let request = GenerationRequest::new(prompts::finalization(task, &book))
            .expecting::<TextOutput>("finalization_text");
        let result = self.generate(persona, request).await?;

        self.commit(project_id, Phase::Finalization, &result, |tx| {
            let text = result.text()?;
            if text.trim().is_empty() {
                return Err(PhaseError::InvalidOutput(format!("{} text is empty", task.as_str())));
            }

            let current = projects::get(tx, project_id)?
                .ok_or_else(|| PhaseError::not_found("project", project_id))?;
            let next = current.status.transition(ProjectStatus::Complete)?;

            let part = framing_part(tx, project_id, task)?;
            let chapter = match chapters::list_for_part(tx, part.id)?.into_iter().next() {
                Some(chapter) => chapter,
                None => chapters::insert(
                    tx,
                    part.id,
                    1,
                    task.title(),
                    None,
                    THEORIST,
                    ChapterStatus::BriefComplete,
                )?,
            };
            chapters::write_content(
                tx,
                chapter.id,
                &text,
                completion_tokens(&result),
                ChapterStatus::ContentGenerated,
            )?;
            projects::set_status(tx, project_id, next)?;
            Ok(())
        })
    }
}

/// Find or create the task's part at its required position.
fn framing_part(conn: &Connection, project_id: Uuid, task: FinalizationTask) -> anyhow::Result<Part> {
    let number = match task {
        FinalizationTask::Introduction => 0,
        FinalizationTask::Conclusion => {
            parts::max_number_excluding(conn, project_id, PartKind::Conclusion)?.unwrap_or(0) + 1
        }
    };

    match parts::find_by_kind(conn, project_id, task.kind())? {
        Some(mut part) => {
            if part.part_number != number {
                parts::set_number(conn, part.id, number)?;
                part.part_number = number;
            }
            Ok(part)
        }
        None => parts::insert(
            conn,
            project_id,
            number,
            task.kind(),
            task.title(),
            None,
            PartStatus::ChaptersValidated,
        ),
    }
}

fn failure_status(err: &PhaseError) -> Option<ProjectStatus> {
    match err {
        PhaseError::NotFound { .. } | PhaseError::Transition(_) => None,
        PhaseError::UpstreamUnavailable => Some(ProjectStatus::UpstreamUnavailable),
        PhaseError::NoContent(_) => Some(ProjectStatus::NoContentForFinalization),
        e if e.is_business_failure() => Some(ProjectStatus::FinalizationFailed),
        _ => Some(ProjectStatus::FinalizationError),
    }
}
