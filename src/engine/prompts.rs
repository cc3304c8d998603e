//! Input text for each generation request.

use std::fmt::Write;

use crate::db::chapters::WrittenChapter;
use crate::models::{Chapter, ChapterBrief, Part};
use crate::personas::Persona;

use super::FinalizationTask;

/// Characters of each chapter shown to the continuity editor.
pub const TRANSITION_WINDOW: usize = 500;

pub fn part_generation(blueprint: &str) -> String {
    format!(
        "Divide the following book blueprint into its major thematic parts.\n\n\
         ### Blueprint\n{}",
        blueprint.trim()
    )
}

pub fn chapter_detailing(part: &Part, writers: &[&Persona]) -> String {
    let mut input = format!(
        "Break the following part into a logical sequence of detailed chapters.\n\n\
         ### Part {}: {}\n{}\n\n\
         ### Writer roster\n\
         Assign each chapter's suggested_role to exactly one of these names:\n",
        part.part_number,
        part.title,
        part.summary.as_deref().unwrap_or_default(),
    );
    for writer in writers {
        let _ = writeln!(input, "- {}: {}", writer.role, writer.specialty);
    }
    input
}

pub fn chapter_content(chapter: &Chapter, brief: &ChapterBrief) -> String {
    format!(
        "Write the full text of the chapter \"{}\".\n\n\
         ### Brief\n\
         - Chapter Thesis: {}\n\
         - Narrative Arc: {}\n\
         - Key Questions: {}\n\
         - Required Inclusions: {}",
        chapter.title,
        brief.thesis,
        brief.narrative_arc,
        brief.key_questions.join(", "),
        brief.required_inclusions.join(", "),
    )
}

pub fn transition(preceding: &str, current: &str) -> String {
    format!(
        "Analyze the transition between two consecutive chapters and give actionable \
         feedback to improve the narrative flow.\n\n\
         ### End of the preceding chapter\n{}\n\n\
         ### Start of the current chapter\n{}",
        tail(preceding, TRANSITION_WINDOW),
        head(current, TRANSITION_WINDOW),
    )
}

pub fn finalization(task: FinalizationTask, book: &[WrittenChapter]) -> String {
    let mut input = format!(
        "Write the {} of the book from its full content below.\n\n### Full book content\n",
        task.as_str()
    );
    let mut current_part = None;
    for written in book {
        if current_part != Some(written.part_number) {
            let _ = write!(input, "\n## Part {}: {}\n", written.part_number, written.part_title);
            current_part = Some(written.part_number);
        }
        let _ = write!(
            input,
            "\n### Chapter {}: {}\n{}\n",
            written.chapter.chapter_number,
            written.chapter.title,
            written.chapter.content.as_deref().unwrap_or_default().trim(),
        );
    }
    input
}

/// The first `n` characters of `s`.
pub fn head(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// The last `n` characters of `s`.
pub fn tail(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
