use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use super::{cost_from_sql, cost_to_sql, parse_datetime, parse_uuid};
use crate::models::*;

const COLUMNS: &str = "id, raw_blueprint, status, draft_parts_outline, draft_chapters_outline, \
                       total_cost, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let parts_json: Option<String> = row.get(3)?;
    let chapters_json: Option<String> = row.get(4)?;
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        raw_blueprint: row.get(1)?,
        status: ProjectStatus::from_str(&row.get::<_, String>(2)?).unwrap_or(ProjectStatus::Raw),
        draft: draft_from_columns(parts_json.as_deref(), chapters_json.as_deref()),
        total_cost: cost_from_sql(row.get(5)?),
        created_at: parse_datetime(row.get::<_, String>(6)?),
        updated_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

/// Rebuild the draft union from its two nullable columns. A parts draft wins
/// if both are somehow populated; unreadable JSON is treated as no draft.
fn draft_from_columns(parts: Option<&str>, chapters: Option<&str>) -> DraftOutline {
    if let Some(json) = parts {
        match serde_json::from_str::<Vec<PartOutline>>(json) {
            Ok(parts) => return DraftOutline::Parts(parts),
            Err(e) => tracing::warn!("Ignoring unreadable parts draft: {}", e),
        }
    }
    if let Some(json) = chapters {
        match serde_json::from_str::<BTreeMap<Uuid, Vec<ChapterOutline>>>(json) {
            Ok(map) if !map.is_empty() => return DraftOutline::Chapters(map),
            Ok(_) => {}
            Err(e) => tracing::warn!("Ignoring unreadable chapters draft: {}", e),
        }
    }
    DraftOutline::None
}

fn draft_to_columns(draft: &DraftOutline) -> Result<(Option<String>, Option<String>)> {
    Ok(match draft {
        DraftOutline::None => (None, None),
        DraftOutline::Parts(parts) => (Some(serde_json::to_string(parts)?), None),
        DraftOutline::Chapters(map) => (None, Some(serde_json::to_string(map)?)),
    })
}

pub fn insert(conn: &Connection, raw_blueprint: &str) -> Result<Project> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO projects (id, raw_blueprint, status, total_cost, created_at, updated_at)
         VALUES (?, ?, ?, 0, ?, ?)",
        (
            id.to_string(),
            raw_blueprint,
            ProjectStatus::Raw.as_str(),
            now.to_rfc3339(),
            now.to_rfc3339(),
        ),
    )?;

    Ok(Project {
        id,
        raw_blueprint: raw_blueprint.to_string(),
        status: ProjectStatus::Raw,
        draft: DraftOutline::None,
        total_cost: Cost::ZERO,
        created_at: now,
        updated_at: now,
    })
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Project>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM projects WHERE id = ?"))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(from_row(row)?)),
        None => Ok(None),
    }
}

pub fn list(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM projects ORDER BY created_at, id"
    ))?;
    let projects = stmt
        .query_map([], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(projects)
}

pub fn delete(conn: &Connection, id: Uuid) -> Result<bool> {
    let rows = conn.execute("DELETE FROM projects WHERE id = ?", [id.to_string()])?;
    Ok(rows > 0)
}

pub fn set_status(conn: &Connection, id: Uuid, status: ProjectStatus) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE projects SET status = ?, updated_at = ? WHERE id = ?",
        (status.as_str(), Utc::now().to_rfc3339(), id.to_string()),
    )?;
    Ok(rows > 0)
}

/// Overwrite both draft columns from the tagged union, so at most one of
/// them is ever populated.
pub fn set_draft(conn: &Connection, id: Uuid, draft: &DraftOutline) -> Result<bool> {
    let (parts, chapters) = draft_to_columns(draft)?;
    let rows = conn.execute(
        "UPDATE projects SET draft_parts_outline = ?, draft_chapters_outline = ?, updated_at = ?
         WHERE id = ?",
        (parts, chapters, Utc::now().to_rfc3339(), id.to_string()),
    )?;
    Ok(rows > 0)
}

/// Increment the running total in place; never reads-then-writes.
/// Saturates at `i64::MAX` so the column stays an INTEGER.
pub fn add_cost(conn: &Connection, id: Uuid, cost: Cost) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE projects SET total_cost = CASE
             WHEN total_cost > 9223372036854775807 - ?1 THEN 9223372036854775807
             ELSE total_cost + ?1
         END
         WHERE id = ?2",
        (cost_to_sql(cost), id.to_string()),
    )?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_columns_empty_is_no_draft() {
        assert_eq!(draft_from_columns(None, None), DraftOutline::None);
        assert_eq!(draft_from_columns(None, Some("{}")), DraftOutline::None);
    }

    #[test]
    fn garbage_json_is_no_draft() {
        assert_eq!(draft_from_columns(Some("not json"), None), DraftOutline::None);
    }

    #[test]
    fn draft_columns_are_mutually_exclusive() {
        let draft = DraftOutline::Parts(vec![PartOutline {
            part_number: 1,
            title: "One".to_string(),
            summary: "s".to_string(),
        }]);
        let (parts, chapters) = draft_to_columns(&draft).unwrap();
        assert!(parts.is_some());
        assert!(chapters.is_none());
        assert_eq!(
            draft_from_columns(parts.as_deref(), chapters.as_deref()),
            draft
        );
    }
}
