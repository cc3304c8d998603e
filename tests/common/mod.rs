#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bookforge::breaker::{BreakerConfig, CircuitBreaker};
use bookforge::db::{chapters, parts, projects, Database};
use bookforge::engine::Engine;
use bookforge::generation::{GenerationError, GenerationRequest, GenerationResult, GenerationService};
use bookforge::models::*;
use bookforge::personas::{Persona, PersonaRegistry};
use serde_json::{json, Value};
use uuid::Uuid;

/// What the scripted service does on one call.
pub enum Reply {
    Respond(GenerationResult),
    Fail(GenerationError),
    /// Never answers; the engine's call timeout fires.
    Hang,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub role: String,
    pub input: String,
    pub contract: Option<String>,
}

/// Generation service that plays back a fixed script and records calls.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGenerator {
    pub fn push(&self, reply: Reply) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn respond(&self, output: Value) {
        self.push(Reply::Respond(GenerationResult {
            output,
            usage: usage(100, 50),
        }));
    }

    pub fn respond_with_usage(&self, output: Value, usage: Value) {
        self.push(Reply::Respond(GenerationResult { output, usage }));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn run(
        &self,
        persona: &Persona,
        request: GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        self.calls.lock().unwrap().push(Call {
            role: persona.role.clone(),
            input: request.input.clone(),
            contract: request.contract.as_ref().map(|c| c.name.clone()),
        });
        let reply = self.script.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Respond(result)) => Ok(result),
            Some(Reply::Fail(e)) => Err(e),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(GenerationError::Transport("hung call resumed".to_string()))
            }
            None => Err(GenerationError::Transport("script exhausted".to_string())),
        }
    }
}

pub struct Harness {
    pub engine: Engine,
    pub generator: Arc<ScriptedGenerator>,
    pub db: Database,
}

pub fn harness() -> Harness {
    harness_with(BreakerConfig::default())
}

pub fn harness_with(breaker: BreakerConfig) -> Harness {
    let db = Database::open_memory().expect("Failed to create in-memory database");
    db.migrate().expect("Failed to run migrations");
    let generator = Arc::new(ScriptedGenerator::default());
    let engine = Engine::new(
        db.clone(),
        generator.clone(),
        Arc::new(PersonaRegistry::builtin()),
    )
    .with_breaker(Arc::new(CircuitBreaker::new(breaker)))
    .with_call_timeout(Duration::from_millis(50));
    Harness {
        engine,
        generator,
        db,
    }
}

pub fn usage(prompt: i64, completion: i64) -> Value {
    json!({ "input_tokens": prompt, "output_tokens": completion, "model_name": "gpt-4" })
}

pub fn parts_output(count: i64) -> Value {
    let parts: Vec<Value> = (1..=count)
        .map(|n| {
            json!({
                "part_number": n,
                "title": format!("Part {}", n),
                "summary": format!("Summary of part {}", n)
            })
        })
        .collect();
    json!({ "parts": parts })
}

pub fn chapters_output(count: i64, role: &str) -> Value {
    let chapters: Vec<Value> = (1..=count)
        .map(|n| {
            json!({
                "chapter_number": n,
                "title": format!("Chapter {}", n),
                "brief": {
                    "thesis": format!("Thesis {}", n),
                    "narrative_arc": "Open with an anecdote, then the argument.",
                    "required_inclusions": ["agents"],
                    "key_questions": ["Why now?"]
                },
                "suggested_role": role
            })
        })
        .collect();
    json!({ "chapters": chapters })
}

pub fn text(text: &str) -> Value {
    json!({ "text": text })
}

pub fn brief() -> ChapterBrief {
    ChapterBrief {
        thesis: "Machines that cooperate change the work.".to_string(),
        narrative_arc: "History, mechanism, consequence.".to_string(),
        required_inclusions: vec!["swarm".to_string()],
        key_questions: vec!["What changes?".to_string()],
    }
}

pub fn seed_project(db: &Database, status: ProjectStatus) -> Project {
    db.read(|conn| {
        let project = projects::insert(conn, "A book about cooperative machines.")?;
        projects::set_status(conn, project.id, status)?;
        Ok(projects::get(conn, project.id)?.expect("project"))
    })
    .expect("Failed to seed project")
}

pub fn seed_part(db: &Database, project_id: Uuid, number: i64, status: PartStatus) -> Part {
    db.read(|conn| {
        parts::insert(
            conn,
            project_id,
            number,
            PartKind::Body,
            &format!("Part {}", number),
            Some("What this part covers."),
            status,
        )
    })
    .expect("Failed to seed part")
}

pub fn seed_chapter(db: &Database, part_id: Uuid, number: i64, role: &str) -> Chapter {
    db.read(|conn| {
        chapters::insert(
            conn,
            part_id,
            number,
            &format!("Chapter {}", number),
            Some(&brief()),
            role,
            ChapterStatus::BriefComplete,
        )
    })
    .expect("Failed to seed chapter")
}

pub fn seed_written_chapter(db: &Database, part_id: Uuid, number: i64, content: &str) -> Chapter {
    let chapter = seed_chapter(db, part_id, number, "Historian AI");
    db.read(|conn| {
        chapters::write_content(conn, chapter.id, content, Some(10), ChapterStatus::ContentGenerated)
    })
    .expect("Failed to write chapter");
    db.get_chapter(chapter.id).unwrap().unwrap()
}

/// A project with `parts` validated body parts, each holding `chapters`
/// written chapters.
pub fn seed_book(db: &Database, parts: i64, chapters: i64) -> (Project, Vec<Part>) {
    let project = seed_project(db, ProjectStatus::ChaptersValidated);
    let created = (1..=parts)
        .map(|n| {
            let part = seed_part(db, project.id, n, PartStatus::ChaptersValidated);
            for c in 1..=chapters {
                seed_written_chapter(db, part.id, c, &format!("Text of part {} chapter {}.", n, c));
            }
            part
        })
        .collect();
    (project, created)
}
