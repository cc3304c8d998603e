use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::models::*;

const COLUMNS: &str = "id, part_id, chapter_number, title, brief, content, status, suggested_role, \
                       transition_feedback, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    let brief: Option<ChapterBrief> = row
        .get::<_, Option<String>>(4)?
        .and_then(|json| serde_json::from_str(&json).ok());

    Ok(Chapter {
        id: parse_uuid(row.get::<_, String>(0)?),
        part_id: parse_uuid(row.get::<_, String>(1)?),
        chapter_number: row.get(2)?,
        title: row.get(3)?,
        brief,
        content: row.get(5)?,
        status: ChapterStatus::from_str(&row.get::<_, String>(6)?)
            .unwrap_or(ChapterStatus::BriefComplete),
        suggested_role: row.get(7)?,
        transition_feedback: row.get(8)?,
        created_at: parse_datetime(row.get::<_, String>(9)?),
        updated_at: parse_datetime(row.get::<_, String>(10)?),
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<ChapterVersion> {
    Ok(ChapterVersion {
        id: parse_uuid(row.get::<_, String>(0)?),
        chapter_id: parse_uuid(row.get::<_, String>(1)?),
        version: row.get(2)?,
        content: row.get(3)?,
        token_count: row.get(4)?,
        created_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Chapter>> {
    let chapter = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM chapters WHERE id = ?"),
            [id.to_string()],
            from_row,
        )
        .optional()?;
    Ok(chapter)
}

pub fn list_for_part(conn: &Connection, part_id: Uuid) -> Result<Vec<Chapter>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM chapters WHERE part_id = ? ORDER BY chapter_number"
    ))?;
    let chapters = stmt
        .query_map([part_id.to_string()], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(chapters)
}

/// The chapter immediately before `chapter_number` in the same part, if any.
pub fn predecessor(conn: &Connection, part_id: Uuid, chapter_number: i64) -> Result<Option<Chapter>> {
    let chapter = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM chapters WHERE part_id = ? AND chapter_number < ?
                 ORDER BY chapter_number DESC LIMIT 1"
            ),
            (part_id.to_string(), chapter_number),
            from_row,
        )
        .optional()?;
    Ok(chapter)
}

/// A written chapter of a regular part, in reading order.
#[derive(Debug, Clone)]
pub struct WrittenChapter {
    pub part_number: i64,
    pub part_title: String,
    pub chapter: Chapter,
}

/// Every body-part chapter of the project that has non-empty content, ordered
/// by part number then chapter number.
pub fn written_in_project(conn: &Connection, project_id: Uuid) -> Result<Vec<WrittenChapter>> {
    let columns = COLUMNS
        .split(", ")
        .map(|c| format!("c.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {columns}, p.part_number, p.title
         FROM chapters c JOIN parts p ON p.id = c.part_id
         WHERE p.project_id = ? AND p.kind = ? AND c.content IS NOT NULL AND TRIM(c.content) != ''
         ORDER BY p.part_number, c.chapter_number"
    ))?;

    let written = stmt
        .query_map((project_id.to_string(), PartKind::Body.as_str()), |row| {
            Ok(WrittenChapter {
                chapter: from_row(row)?,
                part_number: row.get(11)?,
                part_title: row.get(12)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(written)
}

pub fn insert(
    conn: &Connection,
    part_id: Uuid,
    chapter_number: i64,
    title: &str,
    brief: Option<&ChapterBrief>,
    suggested_role: &str,
    status: ChapterStatus,
) -> Result<Chapter> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let brief_json = brief.map(serde_json::to_string).transpose()?;

    conn.execute(
        "INSERT INTO chapters (id, part_id, chapter_number, title, brief, status, suggested_role, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            id.to_string(),
            part_id.to_string(),
            chapter_number,
            title,
            brief_json,
            status.as_str(),
            suggested_role,
            now.to_rfc3339(),
            now.to_rfc3339(),
        ),
    )?;

    Ok(Chapter {
        id,
        part_id,
        chapter_number,
        title: title.to_string(),
        brief: brief.cloned(),
        content: None,
        status,
        suggested_role: suggested_role.to_string(),
        transition_feedback: None,
        created_at: now,
        updated_at: now,
    })
}

/// Delete the part's chapters and insert the validated outline as fresh
/// `BriefComplete` chapters.
pub fn replace_all(conn: &Connection, part_id: Uuid, outline: &[ChapterOutline]) -> Result<Vec<Chapter>> {
    conn.execute("DELETE FROM chapters WHERE part_id = ?", [part_id.to_string()])?;

    outline
        .iter()
        .map(|c| {
            insert(
                conn,
                part_id,
                c.chapter_number,
                &c.title,
                Some(&c.brief),
                &c.suggested_role,
                ChapterStatus::BriefComplete,
            )
        })
        .collect()
}

pub fn set_status(conn: &Connection, id: Uuid, status: ChapterStatus) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE chapters SET status = ?, updated_at = ? WHERE id = ?",
        (status.as_str(), Utc::now().to_rfc3339(), id.to_string()),
    )?;
    Ok(rows > 0)
}

pub fn set_transition_feedback(
    conn: &Connection,
    id: Uuid,
    feedback: &str,
    status: ChapterStatus,
) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE chapters SET transition_feedback = ?, status = ?, updated_at = ? WHERE id = ?",
        (feedback, status.as_str(), Utc::now().to_rfc3339(), id.to_string()),
    )?;
    Ok(rows > 0)
}

/// Append a version and mirror it into the chapter's content, so the chapter
/// always shows its latest version.
pub fn write_content(
    conn: &Connection,
    id: Uuid,
    content: &str,
    token_count: Option<i64>,
    status: ChapterStatus,
) -> Result<ChapterVersion> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM chapter_versions WHERE chapter_id = ?",
        [id.to_string()],
        |row| row.get(0),
    )?;
    let version_id = Uuid::new_v4();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO chapter_versions (id, chapter_id, version, content, token_count, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        (
            version_id.to_string(),
            id.to_string(),
            next,
            content,
            token_count,
            now.to_rfc3339(),
        ),
    )?;

    let rows = conn.execute(
        "UPDATE chapters SET content = ?, status = ?, updated_at = ? WHERE id = ?",
        (content, status.as_str(), now.to_rfc3339(), id.to_string()),
    )?;
    if rows == 0 {
        anyhow::bail!("Chapter not found: {}", id);
    }

    Ok(ChapterVersion {
        id: version_id,
        chapter_id: id,
        version: next,
        content: content.to_string(),
        token_count,
        created_at: now,
    })
}

pub fn versions(conn: &Connection, chapter_id: Uuid) -> Result<Vec<ChapterVersion>> {
    let mut stmt = conn.prepare(
        "SELECT id, chapter_id, version, content, token_count, created_at
         FROM chapter_versions WHERE chapter_id = ? ORDER BY version",
    )?;
    let versions = stmt
        .query_map([chapter_id.to_string()], version_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(versions)
}
