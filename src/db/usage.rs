use anyhow::Result;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use super::{cost_from_sql, cost_to_sql, parse_datetime, parse_uuid, projects};
use crate::models::*;

fn from_row(row: &Row<'_>) -> rusqlite::Result<UsageLogEntry> {
    Ok(UsageLogEntry {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        phase_name: row.get(2)?,
        model_name: row.get(3)?,
        prompt_tokens: row.get(4)?,
        completion_tokens: row.get(5)?,
        total_tokens: row.get(6)?,
        cost: cost_from_sql(row.get(7)?),
        created_at: parse_datetime(row.get::<_, String>(8)?),
    })
}

/// Insert the audit entry and add its cost to the project's running total.
///
/// Both writes go through `conn`; call this inside a transaction so they
/// commit together.
pub fn append(conn: &Connection, entry: &UsageLogEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO usage_log (id, project_id, phase_name, model_name, prompt_tokens,
                                completion_tokens, total_tokens, cost, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            entry.id.to_string(),
            entry.project_id.to_string(),
            &entry.phase_name,
            &entry.model_name,
            entry.prompt_tokens,
            entry.completion_tokens,
            entry.total_tokens,
            cost_to_sql(entry.cost),
            entry.created_at.to_rfc3339(),
        ),
    )?;

    if !projects::add_cost(conn, entry.project_id, entry.cost)? {
        anyhow::bail!("Project not found: {}", entry.project_id);
    }
    Ok(())
}

pub fn list_for_project(conn: &Connection, project_id: Uuid) -> Result<Vec<UsageLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, phase_name, model_name, prompt_tokens, completion_tokens,
                total_tokens, cost, created_at
         FROM usage_log WHERE project_id = ? ORDER BY created_at, rowid",
    )?;
    let entries = stmt
        .query_map([project_id.to_string()], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}
