//! Outline types shared by the generation contracts and the validation
//! checkpoints.
//!
//! The same shapes travel three ways: as the declared output schema sent to
//! the generation service, as the draft stored on the project, and as the
//! (possibly edited) structure a human submits to finalize.

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A proposed part, without chapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PartOutline {
    #[schemars(description = "1-based position of the part in the book")]
    pub part_number: i64,
    pub title: String,
    #[schemars(description = "Concise summary of the part's overarching theme")]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PartListOutline {
    pub parts: Vec<PartOutline>,
}

/// Structured writing directive attached to a chapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChapterBrief {
    #[serde(alias = "thesis_statement")]
    #[schemars(description = "The central argument the chapter must defend")]
    pub thesis: String,
    #[schemars(description = "The chapter's internal narrative structure")]
    pub narrative_arc: String,
    #[serde(default)]
    #[schemars(description = "Concepts, names or terms that MUST be included")]
    pub required_inclusions: Vec<String>,
    #[serde(default, alias = "key_questions_to_answer")]
    #[schemars(description = "Questions the chapter must answer for the reader")]
    pub key_questions: Vec<String>,
}

/// A proposed chapter with its brief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChapterOutline {
    #[schemars(description = "1-based position of the chapter within its part")]
    pub chapter_number: i64,
    pub title: String,
    pub brief: ChapterBrief,
    #[serde(alias = "suggested_agent")]
    #[schemars(description = "Role of the writer persona best suited to this chapter")]
    pub suggested_role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChapterListOutline {
    pub chapters: Vec<ChapterOutline>,
}

/// Free-text output of a writing or editing persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextOutput {
    #[schemars(description = "The generated text content")]
    pub text: String,
}

/// Structural problems with a proposed or submitted outline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutlineError {
    #[error("expected at least {expected} entries, got {actual}")]
    TooFew { expected: usize, actual: usize },

    #[error("number {0} must be positive")]
    NonPositiveNumber(i64),

    #[error("number {0} appears more than once")]
    DuplicateNumber(i64),

    #[error("entry {0} has an empty title")]
    EmptyTitle(i64),
}

fn check_entries<'a>(
    entries: impl Iterator<Item = (i64, &'a str)>,
    count: usize,
    min: usize,
) -> Result<(), OutlineError> {
    if count < min {
        return Err(OutlineError::TooFew {
            expected: min,
            actual: count,
        });
    }
    let mut seen = HashSet::new();
    for (number, title) in entries {
        if number <= 0 {
            return Err(OutlineError::NonPositiveNumber(number));
        }
        if !seen.insert(number) {
            return Err(OutlineError::DuplicateNumber(number));
        }
        if title.trim().is_empty() {
            return Err(OutlineError::EmptyTitle(number));
        }
    }
    Ok(())
}

impl PartListOutline {
    pub fn validate(&self, min: usize) -> Result<(), OutlineError> {
        check_entries(
            self.parts.iter().map(|p| (p.part_number, p.title.as_str())),
            self.parts.len(),
            min,
        )
    }
}

impl ChapterListOutline {
    pub fn validate(&self, min: usize) -> Result<(), OutlineError> {
        check_entries(
            self.chapters
                .iter()
                .map(|c| (c.chapter_number, c.title.as_str())),
            self.chapters.len(),
            min,
        )
    }
}
