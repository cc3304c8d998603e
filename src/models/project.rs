use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chapter::Chapter;
use super::outline::{ChapterOutline, PartOutline};
use super::part::Part;
use super::usage::Cost;
use super::TransitionError;

/// A book project, created once from a free-form blueprint.
///
/// The project owns its parts (and through them, chapters), the running total
/// of generation cost, and at most one draft outline awaiting validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    /// Free-form user brief describing the intended book.
    pub raw_blueprint: String,
    pub status: ProjectStatus,
    pub draft: DraftOutline,
    /// Sum of every usage log entry recorded for this project.
    pub total_cost: Cost,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of a project.
///
/// The happy path is `Raw → PartsPendingValidation → PartsValidated →
/// ChaptersPendingValidation → ChaptersValidated → Complete`. The remaining
/// variants are failure markers that may be entered from anywhere.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Raw,
    PartsPendingValidation,
    PartsValidated,
    ChaptersPendingValidation,
    ChaptersValidated,
    Complete,
    PartGenerationFailed,
    PartGenerationError,
    FinalizationFailed,
    FinalizationError,
    UpstreamUnavailable,
    NoContentForFinalization,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::PartsPendingValidation => "parts_pending_validation",
            Self::PartsValidated => "parts_validated",
            Self::ChaptersPendingValidation => "chapters_pending_validation",
            Self::ChaptersValidated => "chapters_validated",
            Self::Complete => "complete",
            Self::PartGenerationFailed => "part_generation_failed",
            Self::PartGenerationError => "part_generation_error",
            Self::FinalizationFailed => "finalization_failed",
            Self::FinalizationError => "finalization_error",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::NoContentForFinalization => "no_content_for_finalization",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "raw" => Some(Self::Raw),
            "parts_pending_validation" => Some(Self::PartsPendingValidation),
            "parts_validated" => Some(Self::PartsValidated),
            "chapters_pending_validation" => Some(Self::ChaptersPendingValidation),
            "chapters_validated" => Some(Self::ChaptersValidated),
            "complete" => Some(Self::Complete),
            "part_generation_failed" => Some(Self::PartGenerationFailed),
            "part_generation_error" => Some(Self::PartGenerationError),
            "finalization_failed" => Some(Self::FinalizationFailed),
            "finalization_error" => Some(Self::FinalizationError),
            "upstream_unavailable" => Some(Self::UpstreamUnavailable),
            "no_content_for_finalization" => Some(Self::NoContentForFinalization),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::PartGenerationFailed
                | Self::PartGenerationError
                | Self::FinalizationFailed
                | Self::FinalizationError
                | Self::UpstreamUnavailable
                | Self::NoContentForFinalization
        )
    }

    /// Whether the engine may move a project from `self` to `next`.
    ///
    /// Failure markers can always be entered, and a failed project may be
    /// retried into any progress state. Otherwise the project only moves
    /// forward, except that part generation may be re-run until chapters are
    /// being drafted.
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;

        if next.is_failure() || self.is_failure() {
            return true;
        }
        match next {
            Raw => false,
            PartsPendingValidation => matches!(self, Raw | PartsPendingValidation | PartsValidated),
            PartsValidated => matches!(self, PartsPendingValidation | PartsValidated),
            ChaptersPendingValidation => matches!(
                self,
                PartsValidated | ChaptersPendingValidation | ChaptersValidated
            ),
            ChaptersValidated => matches!(self, ChaptersPendingValidation | ChaptersValidated),
            Complete => matches!(
                self,
                PartsValidated | ChaptersPendingValidation | ChaptersValidated | Complete
            ),
            _ => false,
        }
    }

    pub fn transition(self, next: ProjectStatus) -> Result<ProjectStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                entity: "project",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

/// The tentative structure awaiting human approval.
///
/// Only one kind of draft can exist at a time: proposing parts discards any
/// chapter drafts, and proposing chapters for a part discards the parts draft.
/// Chapter drafts are keyed by the owning part's id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "outline", rename_all = "snake_case")]
pub enum DraftOutline {
    #[default]
    None,
    Parts(Vec<PartOutline>),
    Chapters(BTreeMap<Uuid, Vec<ChapterOutline>>),
}

impl DraftOutline {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn parts(&self) -> Option<&[PartOutline]> {
        match self {
            Self::Parts(parts) => Some(parts),
            _ => None,
        }
    }

    pub fn chapters_for(&self, part_id: Uuid) -> Option<&[ChapterOutline]> {
        match self {
            Self::Chapters(map) => map.get(&part_id).map(Vec::as_slice),
            _ => None,
        }
    }

    /// Merge one part's chapter draft into the per-part map, replacing any
    /// previous draft for that part. A parts draft is discarded.
    pub fn with_chapters_for(self, part_id: Uuid, chapters: Vec<ChapterOutline>) -> Self {
        let mut map = match self {
            Self::Chapters(map) => map,
            _ => BTreeMap::new(),
        };
        map.insert(part_id, chapters);
        Self::Chapters(map)
    }

    /// Drop one part's chapter draft. Collapses to `None` once no part has a
    /// pending chapter draft left.
    pub fn without_chapters_for(self, part_id: Uuid) -> Self {
        match self {
            Self::Chapters(mut map) => {
                map.remove(&part_id);
                if map.is_empty() {
                    Self::None
                } else {
                    Self::Chapters(map)
                }
            }
            other => other,
        }
    }
}

/// Input for creating a new project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub blueprint: String,
}

/// A project with its parts and their chapters, used for detailed responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectWithParts {
    #[serde(flatten)]
    pub project: Project,
    pub parts: Vec<PartWithChapters>,
}

/// A part with its chapters ordered by chapter number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartWithChapters {
    #[serde(flatten)]
    pub part: Part,
    pub chapters: Vec<Chapter>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChapterBrief;

    fn chapter(n: i64) -> ChapterOutline {
        ChapterOutline {
            chapter_number: n,
            title: format!("Chapter {n}"),
            brief: ChapterBrief::default(),
            suggested_role: "Historian AI".to_string(),
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ProjectStatus::Raw,
            ProjectStatus::ChaptersPendingValidation,
            ProjectStatus::NoContentForFinalization,
        ] {
            assert_eq!(ProjectStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ProjectStatus::from_str("bogus"), None);
    }

    #[test]
    fn project_moves_forward_only() {
        assert!(ProjectStatus::Raw.can_transition_to(ProjectStatus::PartsPendingValidation));
        assert!(ProjectStatus::PartsValidated.can_transition_to(ProjectStatus::PartsPendingValidation));
        assert!(!ProjectStatus::Complete.can_transition_to(ProjectStatus::PartsPendingValidation));
        assert!(!ProjectStatus::Raw.can_transition_to(ProjectStatus::Complete));
        assert!(ProjectStatus::Complete.can_transition_to(ProjectStatus::Complete));
    }

    #[test]
    fn failures_are_always_enterable_and_recoverable() {
        assert!(ProjectStatus::Complete.can_transition_to(ProjectStatus::UpstreamUnavailable));
        assert!(ProjectStatus::UpstreamUnavailable.can_transition_to(ProjectStatus::PartsPendingValidation));
    }

    #[test]
    fn illegal_transition_reports_both_states() {
        let err = ProjectStatus::Raw
            .transition(ProjectStatus::ChaptersValidated)
            .unwrap_err();
        assert_eq!(err.from, "raw");
        assert_eq!(err.to, "chapters_validated");
    }

    #[test]
    fn chapter_draft_replaces_parts_draft() {
        let part_id = Uuid::new_v4();
        let draft = DraftOutline::Parts(vec![]).with_chapters_for(part_id, vec![chapter(1)]);
        assert!(draft.parts().is_none());
        assert_eq!(draft.chapters_for(part_id).map(|c| c.len()), Some(1));
    }

    #[test]
    fn pruning_last_chapter_draft_collapses_to_none() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let draft = DraftOutline::None
            .with_chapters_for(a, vec![chapter(1)])
            .with_chapters_for(b, vec![chapter(1)]);

        let draft = draft.without_chapters_for(a);
        assert!(draft.chapters_for(a).is_none());
        assert!(draft.chapters_for(b).is_some());

        assert!(draft.without_chapters_for(b).is_none());
    }
}
