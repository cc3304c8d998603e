//! Environment-driven settings.
//!
//! Every field has a default, so an empty environment yields a runnable
//! (if unauthenticated) server. Settings are built once at bootstrap and
//! passed explicitly to whatever needs them.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::breaker::BreakerConfig;
use crate::generation::OpenAiConfig;
use crate::jobs::DEFAULT_RETAINED_JOBS;

#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite file; `None` means the platform data directory.
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub workers: usize,
    /// Finished job records kept for status lookups.
    pub retained_jobs: usize,
    pub api_key: String,
    pub base_url: String,
    /// Model requested from the service; usage is priced under this name.
    pub model: String,
    pub call_timeout: Duration,
    pub breaker_threshold: u32,
    pub breaker_recovery: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: None,
            port: 3000,
            workers: 4,
            retained_jobs: DEFAULT_RETAINED_JOBS,
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4-turbo".to_string(),
            call_timeout: Duration::from_secs(120),
            breaker_threshold: 3,
            breaker_recovery: Duration::from_secs(60),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            db_path: get("BOOKFORGE_DB_PATH").map(PathBuf::from),
            port: parsed(get("BOOKFORGE_PORT"), "BOOKFORGE_PORT", defaults.port),
            workers: parsed(get("BOOKFORGE_WORKERS"), "BOOKFORGE_WORKERS", defaults.workers).max(1),
            retained_jobs: parsed(
                get("BOOKFORGE_RETAINED_JOBS"),
                "BOOKFORGE_RETAINED_JOBS",
                defaults.retained_jobs,
            ),
            api_key: get("OPENAI_API_KEY").unwrap_or(defaults.api_key),
            base_url: get("BOOKFORGE_BASE_URL").unwrap_or(defaults.base_url),
            model: get("BOOKFORGE_MODEL").unwrap_or(defaults.model),
            call_timeout: Duration::from_secs(parsed(
                get("BOOKFORGE_CALL_TIMEOUT_SECS"),
                "BOOKFORGE_CALL_TIMEOUT_SECS",
                defaults.call_timeout.as_secs(),
            )),
            breaker_threshold: parsed(
                get("BOOKFORGE_BREAKER_THRESHOLD"),
                "BOOKFORGE_BREAKER_THRESHOLD",
                defaults.breaker_threshold,
            )
            .max(1),
            breaker_recovery: Duration::from_secs(parsed(
                get("BOOKFORGE_BREAKER_RECOVERY_SECS"),
                "BOOKFORGE_BREAKER_RECOVERY_SECS",
                defaults.breaker_recovery.as_secs(),
            )),
        }
    }

    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker_threshold,
            recovery_interval: self.breaker_recovery,
        }
    }

    pub fn openai(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            request_timeout: self.call_timeout,
        }
    }
}

fn parsed<T: FromStr + Copy + std::fmt::Debug>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Unparseable setting; using default {:?}", default);
            default
        }),
    }
}
