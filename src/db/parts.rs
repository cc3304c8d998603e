use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_datetime, parse_uuid};
use crate::models::*;

const COLUMNS: &str = "id, project_id, part_number, kind, title, summary, status, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Part> {
    Ok(Part {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        part_number: row.get(2)?,
        kind: PartKind::from_str(&row.get::<_, String>(3)?).unwrap_or(PartKind::Body),
        title: row.get(4)?,
        summary: row.get(5)?,
        status: PartStatus::from_str(&row.get::<_, String>(6)?).unwrap_or(PartStatus::Defined),
        created_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<Part>> {
    let part = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM parts WHERE id = ?"),
            [id.to_string()],
            from_row,
        )
        .optional()?;
    Ok(part)
}

pub fn list_for_project(conn: &Connection, project_id: Uuid) -> Result<Vec<Part>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM parts WHERE project_id = ? ORDER BY part_number"
    ))?;
    let parts = stmt
        .query_map([project_id.to_string()], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts)
}

pub fn find_by_kind(conn: &Connection, project_id: Uuid, kind: PartKind) -> Result<Option<Part>> {
    let part = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM parts WHERE project_id = ? AND kind = ?
                 ORDER BY part_number LIMIT 1"
            ),
            (project_id.to_string(), kind.as_str()),
            from_row,
        )
        .optional()?;
    Ok(part)
}

/// Highest part number in the project, ignoring parts of `excluded` kind.
pub fn max_number_excluding(
    conn: &Connection,
    project_id: Uuid,
    excluded: PartKind,
) -> Result<Option<i64>> {
    let max = conn.query_row(
        "SELECT MAX(part_number) FROM parts WHERE project_id = ? AND kind != ?",
        (project_id.to_string(), excluded.as_str()),
        |row| row.get::<_, Option<i64>>(0),
    )?;
    Ok(max)
}

pub fn insert(
    conn: &Connection,
    project_id: Uuid,
    part_number: i64,
    kind: PartKind,
    title: &str,
    summary: Option<&str>,
    status: PartStatus,
) -> Result<Part> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO parts (id, project_id, part_number, kind, title, summary, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        (
            id.to_string(),
            project_id.to_string(),
            part_number,
            kind.as_str(),
            title,
            summary,
            status.as_str(),
            now.to_rfc3339(),
        ),
    )?;

    Ok(Part {
        id,
        project_id,
        part_number,
        kind,
        title: title.to_string(),
        summary: summary.map(str::to_string),
        status,
        created_at: now,
    })
}

/// Delete every part of the project (cascading to chapters and versions) and
/// insert the validated outline as fresh `Defined` parts.
pub fn replace_all(conn: &Connection, project_id: Uuid, outline: &[PartOutline]) -> Result<Vec<Part>> {
    conn.execute(
        "DELETE FROM parts WHERE project_id = ?",
        [project_id.to_string()],
    )?;

    outline
        .iter()
        .map(|p| {
            insert(
                conn,
                project_id,
                p.part_number,
                PartKind::Body,
                &p.title,
                Some(&p.summary),
                PartStatus::Defined,
            )
        })
        .collect()
}

pub fn set_status(conn: &Connection, id: Uuid, status: PartStatus) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE parts SET status = ? WHERE id = ?",
        (status.as_str(), id.to_string()),
    )?;
    Ok(rows > 0)
}

pub fn set_number(conn: &Connection, id: Uuid, part_number: i64) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE parts SET part_number = ? WHERE id = ?",
        (part_number, id.to_string()),
    )?;
    Ok(rows > 0)
}
