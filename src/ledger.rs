//! Usage ledger: token accounting and cost for every generation call.
//!
//! Usage payloads from the generation service are loosely shaped, so counts
//! are pulled out defensively. Nothing in here fails because of a bad
//! payload; the worst case is a zero-cost entry and a warning.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

use crate::db;
use crate::generation::GenerationResult;
use crate::models::{Cost, UsageLogEntry};

const PROMPT_KEYS: &[&str] = &["input_tokens", "prompt_tokens", "promptTokens"];
const COMPLETION_KEYS: &[&str] = &["output_tokens", "completion_tokens", "completionTokens"];
const TOTAL_KEYS: &[&str] = &["total_tokens", "totalTokens"];
const MODEL_KEYS: &[&str] = &["model_name", "model"];
const NESTED_KEYS: &[&str] = &["token_usage", "usage_metrics", "usage"];

/// Per-token price of one model, in nano-dollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPrice {
    pub prompt: u64,
    pub completion: u64,
}

impl ModelPrice {
    /// Build from USD per one million tokens expressed in thousandths of a
    /// dollar, e.g. `per_million_millis(500, 1_500)` is $0.50 / $1.50.
    pub const fn per_million_millis(prompt: u64, completion: u64) -> Self {
        // $0.001 per 1M tokens is exactly 1 nano-dollar per token.
        Self { prompt, completion }
    }

    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> Cost {
        let prompt = prompt_tokens.saturating_mul(self.prompt);
        let completion = completion_tokens.saturating_mul(self.completion);
        Cost::from_nanos(prompt.saturating_add(completion))
    }
}

#[derive(Debug, Clone)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::empty()
            .with_price("gpt-4-turbo-preview", ModelPrice::per_million_millis(10_000, 30_000))
            .with_price("gpt-4-turbo", ModelPrice::per_million_millis(10_000, 30_000))
            .with_price("gpt-4", ModelPrice::per_million_millis(30_000, 60_000))
            .with_price("gpt-3.5-turbo-0125", ModelPrice::per_million_millis(500, 1_500))
    }
}

impl PriceTable {
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    pub fn with_price(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.prices.insert(model.into(), price);
        self
    }

    /// Exact match first, then the longest priced base name the id extends
    /// with a `-` suffix (`gpt-4-turbo-2024-04-09` prices as `gpt-4-turbo`).
    pub fn get(&self, model: &str) -> Option<ModelPrice> {
        if let Some(price) = self.prices.get(model) {
            return Some(*price);
        }
        self.prices
            .iter()
            .filter(|(base, _)| {
                model
                    .strip_prefix(base.as_str())
                    .is_some_and(|rest| rest.starts_with('-'))
            })
            .max_by_key(|(base, _)| base.len())
            .map(|(_, price)| *price)
    }

    /// Cost of a call, or zero for a model with no price.
    pub fn cost(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) -> Cost {
        match self.get(model) {
            Some(price) => price.cost(prompt_tokens, completion_tokens),
            None => {
                tracing::warn!(model, "No price configured for model; recording zero cost");
                Cost::ZERO
            }
        }
    }
}

/// Token counts pulled out of a usage payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenCounts {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Counts(TokenCounts),
    /// The payload reported a negative count; the field names it.
    Negative(&'static str),
}

impl TokenCounts {
    /// Read counts from the payload itself or one level down under a
    /// nested usage object. Missing fields count as zero.
    pub fn extract(usage: &Value) -> Extraction {
        let source = locate(usage);

        let prompt = match read_count(source, PROMPT_KEYS) {
            Ok(n) => n,
            Err(field) => return Extraction::Negative(field),
        };
        let completion = match read_count(source, COMPLETION_KEYS) {
            Ok(n) => n,
            Err(field) => return Extraction::Negative(field),
        };
        let total = match read_count(source, TOTAL_KEYS) {
            Ok(Some(n)) => Some(n),
            Ok(None) => None,
            Err(field) => return Extraction::Negative(field),
        };

        let prompt = prompt.unwrap_or(0);
        let completion = completion.unwrap_or(0);
        Extraction::Counts(TokenCounts {
            prompt,
            completion,
            total: total.unwrap_or_else(|| prompt.saturating_add(completion)),
            model: read_model(usage),
        })
    }
}

fn read_model(usage: &Value) -> Option<String> {
    let source = locate(usage);
    MODEL_KEYS
        .iter()
        .find_map(|k| source.get(*k).or_else(|| usage.get(*k)))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn locate(usage: &Value) -> &Value {
    let has_counts = |v: &Value| PROMPT_KEYS.iter().chain(COMPLETION_KEYS).any(|k| v.get(*k).is_some());
    if has_counts(usage) {
        return usage;
    }
    NESTED_KEYS
        .iter()
        .filter_map(|k| usage.get(*k))
        .find(|v| has_counts(v))
        .unwrap_or(usage)
}

/// `Ok(None)` when absent or unreadable, `Err(key)` when negative.
fn read_count(source: &Value, keys: &[&'static str]) -> Result<Option<u64>, &'static str> {
    for key in keys {
        let Some(value) = source.get(*key) else {
            continue;
        };
        let number = match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        return match number {
            Some(n) if n < 0 => Err(*key),
            Some(n) => Ok(Some(n as u64)),
            None => Ok(None),
        };
    }
    Ok(None)
}

pub struct UsageLedger {
    prices: PriceTable,
    default_model: String,
}

impl UsageLedger {
    pub fn new(prices: PriceTable, default_model: impl Into<String>) -> Self {
        Self {
            prices,
            default_model: default_model.into(),
        }
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Build the audit entry for one call without persisting it.
    pub fn entry(&self, project_id: Uuid, phase_name: &str, usage: &Value) -> UsageLogEntry {
        let counts = match TokenCounts::extract(usage) {
            Extraction::Counts(counts) => counts,
            Extraction::Negative(field) => {
                tracing::warn!(
                    project_id = %project_id,
                    phase = phase_name,
                    field,
                    "Negative token count in usage payload; recording zero cost"
                );
                TokenCounts {
                    model: read_model(usage),
                    ..TokenCounts::default()
                }
            }
        };

        let model = counts
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let cost = self.prices.cost(&model, counts.prompt, counts.completion);

        UsageLogEntry {
            id: Uuid::new_v4(),
            project_id,
            phase_name: phase_name.to_string(),
            model_name: model,
            prompt_tokens: to_sql_count(counts.prompt),
            completion_tokens: to_sql_count(counts.completion),
            total_tokens: to_sql_count(counts.total),
            cost,
            created_at: Utc::now(),
        }
    }

    /// Append the entry for `result` and add its cost to the project total.
    /// Run inside the same transaction as the phase's own writes.
    pub fn record(
        &self,
        conn: &Connection,
        project_id: Uuid,
        phase_name: &str,
        result: &GenerationResult,
    ) -> Result<UsageLogEntry> {
        let entry = self.entry(project_id, phase_name, &result.usage);
        db::usage::append(conn, &entry)?;
        tracing::debug!(
            project_id = %project_id,
            phase = phase_name,
            model = %entry.model_name,
            total_tokens = entry.total_tokens,
            cost = %entry.cost,
            "Recorded usage"
        );
        Ok(entry)
    }
}

fn to_sql_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
