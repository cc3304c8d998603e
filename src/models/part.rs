use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TransitionError;

/// A top-level structural division of the book.
///
/// Regular parts are numbered from 1 and come from a validated parts draft.
/// The introduction (always number 0) and the conclusion (one past the highest
/// regular part) are synthesized by the finalization phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub id: Uuid,
    pub project_id: Uuid,
    pub part_number: i64,
    pub kind: PartKind,
    pub title: String,
    pub summary: Option<String>,
    pub status: PartStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    Body,
    Introduction,
    Conclusion,
}

impl PartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Introduction => "introduction",
            Self::Conclusion => "conclusion",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "body" => Some(Self::Body),
            "introduction" => Some(Self::Introduction),
            "conclusion" => Some(Self::Conclusion),
            _ => None,
        }
    }
}

/// Lifecycle status of a part.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PartStatus {
    Defined,
    ChaptersPendingValidation,
    ChaptersValidated,
    ChapterDetailingFailed,
    ChapterDetailingError,
    UpstreamUnavailable,
}

impl PartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Defined => "defined",
            Self::ChaptersPendingValidation => "chapters_pending_validation",
            Self::ChaptersValidated => "chapters_validated",
            Self::ChapterDetailingFailed => "chapter_detailing_failed",
            Self::ChapterDetailingError => "chapter_detailing_error",
            Self::UpstreamUnavailable => "upstream_unavailable",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "defined" => Some(Self::Defined),
            "chapters_pending_validation" => Some(Self::ChaptersPendingValidation),
            "chapters_validated" => Some(Self::ChaptersValidated),
            "chapter_detailing_failed" => Some(Self::ChapterDetailingFailed),
            "chapter_detailing_error" => Some(Self::ChapterDetailingError),
            "upstream_unavailable" => Some(Self::UpstreamUnavailable),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ChapterDetailingFailed | Self::ChapterDetailingError | Self::UpstreamUnavailable
        )
    }

    /// Chapter detailing may be re-run at any point; its draft fully replaces
    /// the part's chapters once validated. Validation requires a pending draft.
    pub fn can_transition_to(&self, next: PartStatus) -> bool {
        use PartStatus::*;

        if next.is_failure() {
            return true;
        }
        match next {
            Defined => false,
            ChaptersPendingValidation => true,
            ChaptersValidated => {
                matches!(self, ChaptersPendingValidation | ChaptersValidated) || self.is_failure()
            }
            _ => false,
        }
    }

    pub fn transition(self, next: PartStatus) -> Result<PartStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                entity: "part",
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}
