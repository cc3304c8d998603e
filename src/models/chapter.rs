use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::outline::ChapterBrief;
use super::TransitionError;

/// A chapter within a part.
///
/// `content` always mirrors the most recent [`ChapterVersion`]; every write
/// (generated or human-reviewed) appends a version rather than editing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Uuid,
    pub part_id: Uuid,
    pub chapter_number: i64,
    pub title: String,
    pub brief: Option<ChapterBrief>,
    pub content: Option<String>,
    pub status: ChapterStatus,
    /// Persona role expected to author this chapter (e.g. "Historian AI").
    pub suggested_role: String,
    pub transition_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chapter {
    pub fn has_content(&self) -> bool {
        self.content
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }
}

/// Lifecycle status of a chapter.
///
/// - `BriefComplete`: created from a validated chapter draft
/// - `ContentGenerated`: content written by a persona
/// - `ContentReviewed`: content accepted (and possibly edited) by a human
/// - `TransitionAnalyzed`: continuity feedback stored
/// - `TransitionDone`: first chapter of its part, nothing to analyze
///
/// The rest are failure markers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    BriefComplete,
    ContentGenerated,
    ContentReviewed,
    TransitionAnalyzed,
    TransitionDone,
    ContentGenFailed,
    ContentGenError,
    TransitionAnalysisFailed,
    TransitionAnalysisError,
    UpstreamUnavailable,
    AgentNotFound,
    BriefMissing,
    ContentMissingForTransition,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BriefComplete => "brief_complete",
            Self::ContentGenerated => "content_generated",
            Self::ContentReviewed => "content_reviewed",
            Self::TransitionAnalyzed => "transition_analyzed",
            Self::TransitionDone => "transition_done",
            Self::ContentGenFailed => "content_gen_failed",
            Self::ContentGenError => "content_gen_error",
            Self::TransitionAnalysisFailed => "transition_analysis_failed",
            Self::TransitionAnalysisError => "transition_analysis_error",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::AgentNotFound => "agent_not_found",
            Self::BriefMissing => "brief_missing",
            Self::ContentMissingForTransition => "content_missing_for_transition",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "brief_complete" => Some(Self::BriefComplete),
            "content_generated" => Some(Self::ContentGenerated),
            "content_reviewed" => Some(Self::ContentReviewed),
            "transition_analyzed" => Some(Self::TransitionAnalyzed),
            "transition_done" => Some(Self::TransitionDone),
            "content_gen_failed" => Some(Self::ContentGenFailed),
            "content_gen_error" => Some(Self::ContentGenError),
            "transition_analysis_failed" => Some(Self::TransitionAnalysisFailed),
            "transition_analysis_error" => Some(Self::TransitionAnalysisError),
            "upstream_unavailable" => Some(Self::UpstreamUnavailable),
            "agent_not_found" => Some(Self::AgentNotFound),
            "brief_missing" => Some(Self::BriefMissing),
            "content_missing_for_transition" => Some(Self::ContentMissingForTransition),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ContentGenFailed
                | Self::ContentGenError
                | Self::TransitionAnalysisFailed
                | Self::TransitionAnalysisError
                | Self::UpstreamUnavailable
                | Self::AgentNotFound
                | Self::BriefMissing
                | Self::ContentMissingForTransition
        )
    }

    /// Engine-driven moves. Content may be regenerated until a human has
    /// reviewed it; after that only transition analysis moves the chapter on.
    /// Human review bypasses this check (see [`ChapterStatus::is_review_target`]).
    pub fn can_transition_to(&self, next: ChapterStatus) -> bool {
        use ChapterStatus::*;

        if next.is_failure() {
            return true;
        }
        match next {
            ContentGenerated => {
                matches!(self, BriefComplete | ContentGenerated) || self.is_failure()
            }
            TransitionAnalyzed | TransitionDone => {
                matches!(
                    self,
                    ContentGenerated | ContentReviewed | TransitionAnalyzed | TransitionDone
                ) || self.is_failure()
            }
            _ => false,
        }
    }

    pub fn transition(self, next: ChapterStatus) -> Result<ChapterStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                entity: "chapter",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }

    /// Statuses a human review may set, regardless of the current status.
    pub fn is_review_target(&self) -> bool {
        matches!(self, Self::ContentGenerated | Self::ContentReviewed)
    }
}

/// Immutable snapshot of a chapter's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterVersion {
    pub id: Uuid,
    pub chapter_id: Uuid,
    /// 1-based position in the chapter's history.
    pub version: i64,
    pub content: String,
    /// Completion tokens spent producing this content; `None` for human edits.
    pub token_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Input for a human review of chapter content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewChapterInput {
    pub content: String,
    /// Defaults to `ContentReviewed`.
    #[serde(default)]
    pub status: Option<ChapterStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regeneration_is_allowed_before_review_only() {
        assert!(ChapterStatus::BriefComplete.can_transition_to(ChapterStatus::ContentGenerated));
        assert!(ChapterStatus::ContentGenerated.can_transition_to(ChapterStatus::ContentGenerated));
        assert!(!ChapterStatus::ContentReviewed.can_transition_to(ChapterStatus::ContentGenerated));
        assert!(!ChapterStatus::TransitionAnalyzed.can_transition_to(ChapterStatus::ContentGenerated));
    }

    #[test]
    fn transition_analysis_needs_written_content() {
        assert!(!ChapterStatus::BriefComplete.can_transition_to(ChapterStatus::TransitionAnalyzed));
        assert!(ChapterStatus::ContentReviewed.can_transition_to(ChapterStatus::TransitionAnalyzed));
    }

    #[test]
    fn engine_cannot_mark_content_reviewed() {
        assert!(ChapterStatus::ContentGenerated
            .transition(ChapterStatus::ContentReviewed)
            .is_err());
        assert!(ChapterStatus::ContentReviewed.is_review_target());
        assert!(!ChapterStatus::TransitionDone.is_review_target());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            ChapterStatus::BriefComplete,
            ChapterStatus::AgentNotFound,
            ChapterStatus::ContentMissingForTransition,
        ] {
            assert_eq!(ChapterStatus::from_str(status.as_str()), Some(status));
        }
    }
}
