//! Generation service abstraction.
//!
//! The engine treats text generation as an opaque call: a persona plus an
//! input text go in, structured output plus a usage payload come out. The
//! output contract is declared as a JSON Schema derived from the Rust type
//! the engine will parse the output into.

mod openai;

pub use openai::{OpenAiConfig, OpenAiGenerator};

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::breaker::TripsBreaker;
use crate::models::TextOutput;
use crate::personas::Persona;

/// Named JSON Schema the output must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputContract {
    pub name: String,
    pub schema: Value,
}

impl OutputContract {
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schemars::schema_for!(T).to_value(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub input: String,
    pub contract: Option<OutputContract>,
}

impl GenerationRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            contract: None,
        }
    }

    pub fn expecting<T: JsonSchema>(mut self, name: impl Into<String>) -> Self {
        self.contract = Some(OutputContract::of::<T>(name));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub output: Value,
    /// Raw usage payload; see [`crate::ledger::TokenCounts::extract`].
    pub usage: Value,
}

impl GenerationResult {
    /// Deserialize the output into the contract type.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, GenerationError> {
        serde_json::from_value(self.output.clone())
            .map_err(|e| GenerationError::InvalidOutput(e.to_string()))
    }

    /// Free-text output, accepted either as `{ "text": ... }` or a bare string.
    pub fn text(&self) -> Result<String, GenerationError> {
        match &self.output {
            Value::String(s) => Ok(s.clone()),
            _ => self.parse::<TextOutput>().map(|t| t.text),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("output does not match the declared contract: {0}")]
    InvalidOutput(String),
}

impl TripsBreaker for GenerationError {
    fn trips_breaker(&self) -> bool {
        match self {
            GenerationError::Transport(_) | GenerationError::Timeout(_) => true,
            GenerationError::Upstream { status, .. } => *status >= 500 || *status == 429,
            GenerationError::Rejected(_) | GenerationError::InvalidOutput(_) => false,
        }
    }
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn run(
        &self,
        persona: &Persona,
        request: GenerationRequest,
    ) -> Result<GenerationResult, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PartListOutline;
    use serde_json::json;

    #[test]
    fn contract_schema_describes_the_type() {
        let contract = OutputContract::of::<PartListOutline>("part_list");
        assert_eq!(contract.name, "part_list");
        let properties = &contract.schema["properties"];
        assert!(properties.get("parts").is_some());
    }

    #[test]
    fn text_accepts_object_or_bare_string() {
        let wrapped = GenerationResult {
            output: json!({ "text": "hello" }),
            usage: Value::Null,
        };
        let bare = GenerationResult {
            output: json!("hello"),
            usage: Value::Null,
        };
        assert_eq!(wrapped.text().unwrap(), "hello");
        assert_eq!(bare.text().unwrap(), "hello");
    }

    #[test]
    fn malformed_output_is_invalid_not_transport() {
        let result = GenerationResult {
            output: json!({ "parts": "not a list" }),
            usage: Value::Null,
        };
        let err = result.parse::<PartListOutline>().unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOutput(_)));
        assert!(!err.trips_breaker());
    }

    #[test]
    fn only_availability_failures_trip_the_breaker() {
        assert!(GenerationError::Transport("reset".into()).trips_breaker());
        assert!(GenerationError::Timeout(Duration::from_secs(1)).trips_breaker());
        assert!(GenerationError::Upstream { status: 503, message: String::new() }.trips_breaker());
        assert!(GenerationError::Upstream { status: 429, message: String::new() }.trips_breaker());
        assert!(!GenerationError::Upstream { status: 400, message: String::new() }.trips_breaker());
        assert!(!GenerationError::Rejected("refused".into()).trips_breaker());
    }
}
