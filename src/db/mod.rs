//! SQLite-backed persistent store.
//!
//! Row-level operations live in the entity submodules as free functions over a
//! [`Connection`], so the engine can compose several of them inside one
//! [`Database::transaction`]. The methods on [`Database`] are single-statement
//! conveniences for the request layer and tests.

pub mod chapters;
pub mod parts;
pub mod projects;
mod schema;
pub mod usage;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Transaction};
use uuid::Uuid;

use crate::models::*;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    /// Run `f` inside a single transaction. The transaction commits only if
    /// `f` returns `Ok`; any error rolls every write back.
    pub fn transaction<T, E>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run read-only work against the connection without opening a transaction.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().expect("database lock poisoned");
        f(&conn)
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        self.read(|conn| projects::insert(conn, &input.blueprint))
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        self.read(|conn| projects::get(conn, id))
    }

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        self.read(projects::list)
    }

    pub fn delete_project(&self, id: Uuid) -> Result<bool> {
        self.read(|conn| projects::delete(conn, id))
    }

    pub fn get_project_with_parts(&self, id: Uuid) -> Result<Option<ProjectWithParts>> {
        self.read(|conn| {
            let Some(project) = projects::get(conn, id)? else {
                return Ok(None);
            };

            let mut with_chapters = Vec::new();
            for part in parts::list_for_project(conn, id)? {
                let chapters = chapters::list_for_part(conn, part.id)?;
                with_chapters.push(PartWithChapters { part, chapters });
            }

            Ok(Some(ProjectWithParts {
                project,
                parts: with_chapters,
            }))
        })
    }

    // ============================================================
    // Part operations
    // ============================================================

    pub fn get_part(&self, id: Uuid) -> Result<Option<Part>> {
        self.read(|conn| parts::get(conn, id))
    }

    pub fn get_parts(&self, project_id: Uuid) -> Result<Vec<Part>> {
        self.read(|conn| parts::list_for_project(conn, project_id))
    }

    pub fn get_part_with_chapters(&self, id: Uuid) -> Result<Option<PartWithChapters>> {
        self.read(|conn| {
            let Some(part) = parts::get(conn, id)? else {
                return Ok(None);
            };
            let chapters = chapters::list_for_part(conn, id)?;
            Ok(Some(PartWithChapters { part, chapters }))
        })
    }

    // ============================================================
    // Chapter operations
    // ============================================================

    pub fn get_chapter(&self, id: Uuid) -> Result<Option<Chapter>> {
        self.read(|conn| chapters::get(conn, id))
    }

    pub fn get_chapters(&self, part_id: Uuid) -> Result<Vec<Chapter>> {
        self.read(|conn| chapters::list_for_part(conn, part_id))
    }

    pub fn get_chapter_versions(&self, chapter_id: Uuid) -> Result<Vec<ChapterVersion>> {
        self.read(|conn| chapters::versions(conn, chapter_id))
    }

    // ============================================================
    // Usage log operations
    // ============================================================

    pub fn get_usage_log(&self, project_id: Uuid) -> Result<Vec<UsageLogEntry>> {
        self.read(|conn| usage::list_for_project(conn, project_id))
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn default_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "bookforge")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("bookforge.db"))
}

pub(crate) fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

pub(crate) fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn cost_to_sql(cost: Cost) -> i64 {
    i64::try_from(cost.nanos()).unwrap_or(i64::MAX)
}

pub(crate) fn cost_from_sql(value: i64) -> Cost {
    Cost::from_nanos(u64::try_from(value).unwrap_or(0))
}
