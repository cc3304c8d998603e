//! Domain models for bookforge.
//!
//! # Core Concepts
//!
//! - [`Project`]: Root aggregate created once from a raw blueprint. Holds the
//!   running cost and the [`DraftOutline`] awaiting human validation.
//! - [`Part`]: Top-level division of the book. Real rows exist only after a
//!   human validated the parts draft.
//! - [`Chapter`]: Belongs to a part; carries the writing brief, the generated
//!   content and the transition feedback.
//! - [`ChapterVersion`]: Append-only content snapshot, one per (re)write.
//! - [`UsageLogEntry`]: Immutable audit record of one generation call.
//!
//! Every entity has a closed status enum. Status changes made by the engine go
//! through `can_transition_to`/`transition`, which reject illegal moves.

mod chapter;
mod outline;
mod part;
mod project;
mod usage;

pub use chapter::*;
pub use outline::*;
pub use part::*;
pub use project::*;
pub use usage::*;

use thiserror::Error;

/// An illegal status change was requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity} cannot move from '{from}' to '{to}'")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}
