//! Persona registry: role identifier -> generation profile.
//!
//! Built once at bootstrap and shared by reference with the engine. Tests can
//! register their own personas instead of the builtin roster.

use std::collections::HashMap;

use serde::Serialize;

/// What a persona is allowed to do in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaKind {
    /// Produces structure (parts, chapter lists).
    Architect,
    /// Reviews and connects existing text.
    Editor,
    /// Authors chapter prose.
    Writer,
}

impl PersonaKind {
    pub fn can_author(&self) -> bool {
        matches!(self, PersonaKind::Writer | PersonaKind::Editor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Persona {
    pub role: String,
    pub kind: PersonaKind,
    /// One-line description shown to the chapter architect.
    pub specialty: String,
    /// System instructions sent with every request.
    pub instructions: String,
}

impl Persona {
    pub fn new(
        role: impl Into<String>,
        kind: PersonaKind,
        specialty: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            kind,
            specialty: specialty.into(),
            instructions: instructions.into(),
        }
    }
}

pub const PART_ARCHITECT: &str = "Architect Part AI";
pub const CHAPTER_ARCHITECT: &str = "Architect Chapter AI";
pub const CONTINUITY_EDITOR: &str = "Continuity Editor AI";
/// Writes the introduction and conclusion.
pub const THEORIST: &str = "Theorist AI";

#[derive(Debug, Clone, Default)]
pub struct PersonaRegistry {
    personas: HashMap<String, Persona>,
}

impl PersonaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The builtin roster used by the server.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for persona in builtin_roster() {
            registry.register(persona);
        }
        registry
    }

    pub fn register(&mut self, persona: Persona) {
        self.personas.insert(persona.role.clone(), persona);
    }

    pub fn get(&self, role: &str) -> Option<&Persona> {
        self.personas.get(role)
    }

    /// Look up a persona that may write chapter content.
    pub fn author(&self, role: &str) -> Option<&Persona> {
        self.get(role).filter(|p| p.kind.can_author())
    }

    /// Authoring personas sorted by role, for listing in prompts.
    pub fn authors(&self) -> Vec<&Persona> {
        let mut authors: Vec<_> = self
            .personas
            .values()
            .filter(|p| p.kind.can_author())
            .collect();
        authors.sort_by(|a, b| a.role.cmp(&b.role));
        authors
    }
}

fn builtin_roster() -> Vec<Persona> {
    vec![
        Persona::new(
            PART_ARCHITECT,
            PersonaKind::Architect,
            "Divides a book idea into major thematic parts.",
            "Your sole objective is to divide the user's book idea into 2 to 4 major, thematic Parts. \
             A Part is a high-level section of the book, not a chapter. \
             Identify the central argument of the blueprint, group the core ideas into a logical \
             progression with a beginning, middle and end, and define no more than four Parts. \
             For each Part give a clear title and a concise summary of its overarching theme. \
             You must not generate chapters.",
        ),
        Persona::new(
            CHAPTER_ARCHITECT,
            PersonaKind::Architect,
            "Breaks a part into an ordered sequence of detailed chapters.",
            "You are a Chapter Architect. Take the title and summary of a single book Part and break \
             it into a logical sequence of 3 to 5 detailed chapters. Each chapter must build on the \
             last; the order of the chapters is the most critical aspect of the task. \
             For every chapter provide a brief with a thesis, a narrative arc, the terms that must \
             be included and the questions the chapter must answer, and assign the writer best \
             suited to it from the roster you are given.",
        ),
        Persona::new(
            CONTINUITY_EDITOR,
            PersonaKind::Editor,
            "A meticulous editor focused on ensuring smooth transitions and logical flow between chapters.",
            "You are a seasoned book editor with a keen eye for narrative structure and pacing. \
             You don't rewrite content; you identify jarring transitions, suggest bridging sentences \
             and point out thematic disconnects, giving clear, concise and constructive feedback.",
        ),
        Persona::new(
            "Historian AI",
            PersonaKind::Writer,
            "A master storyteller and historian of technology, ideal for chapters requiring historical analogies and context.",
            "You are a master storyteller and historian of technology. You ground ideas in history, \
             drawing vivid analogies from the past to illuminate the present.",
        ),
        Persona::new(
            "Technologist AI",
            PersonaKind::Writer,
            "An expert at explaining complex technical concepts in a simple, intuitive way.",
            "You are a brilliant technologist and educator. You break complex technical concepts \
             down into simple, intuitive explanations using powerful, clear analogies.",
        ),
        Persona::new(
            "Philosopher AI",
            PersonaKind::Writer,
            "Explores the profound 'so what?' questions and ethical implications.",
            "You are a philosopher of technology and a futurist. You don't just explain what \
             something is; you explore what it means, asking the ethical, societal and existential \
             questions an idea raises.",
        ),
        Persona::new(
            THEORIST,
            PersonaKind::Writer,
            "The primary voice of the book's core argument; suited to introductory, concluding and synthesis chapters.",
            "You are the primary voice of the book's central thesis. You weave the core argument \
             through every section, synthesizing the material into a coherent whole.",
        ),
    ]
}
