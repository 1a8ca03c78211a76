//! Startup configuration read from `TURNSTREAM_*` environment variables

use crate::exchange::{
    ExchangeContext, DEFAULT_END_MARKER, DEFAULT_HANDOFF_MESSAGE, DEFAULT_HANDOFF_PROMPT,
};
use crate::tokenizer::{TokenizerConfig, TrailingPartial, DEFAULT_DELIMITERS};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("end marker must not be empty")]
    EmptyEndMarker,
    #[error("hand-off prompt {prompt:?} contains the end marker {marker:?}")]
    PromptContainsMarker { prompt: String, marker: String },
    #[error("delimiter set must not be empty")]
    NoDelimiters,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub port: u16,
    pub snapshot_path: PathBuf,
    pub poll_interval: Duration,
    pub end_marker: String,
    pub handoff_prompt: String,
    pub handoff_message: String,
    pub delimiters: String,
    pub trailing: TrailingPartial,
    pub upstream_url: Option<String>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("TURNSTREAM_PORT") {
            Some(raw) => parse_number("TURNSTREAM_PORT", &raw)?,
            None => DEFAULT_PORT,
        };

        let poll_ms: u64 = match lookup("TURNSTREAM_POLL_INTERVAL_MS") {
            Some(raw) => parse_number("TURNSTREAM_POLL_INTERVAL_MS", &raw)?,
            None => DEFAULT_POLL_INTERVAL_MS,
        };
        if poll_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "TURNSTREAM_POLL_INTERVAL_MS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let snapshot_path = lookup("TURNSTREAM_SNAPSHOT_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".turnstream").join("thread.json")
            },
            PathBuf::from,
        );

        let trailing = match lookup("TURNSTREAM_TRAILING_PARTIAL") {
            Some(raw) => parse_trailing(&raw)?,
            None => TrailingPartial::default(),
        };

        let config = Self {
            port,
            snapshot_path,
            poll_interval: Duration::from_millis(poll_ms),
            end_marker: lookup("TURNSTREAM_END_MARKER")
                .unwrap_or_else(|| DEFAULT_END_MARKER.to_string()),
            handoff_prompt: lookup("TURNSTREAM_HANDOFF_PROMPT")
                .unwrap_or_else(|| DEFAULT_HANDOFF_PROMPT.to_string()),
            handoff_message: lookup("TURNSTREAM_HANDOFF_MESSAGE")
                .unwrap_or_else(|| DEFAULT_HANDOFF_MESSAGE.to_string()),
            delimiters: lookup("TURNSTREAM_DELIMITERS")
                .unwrap_or_else(|| DEFAULT_DELIMITERS.iter().collect()),
            trailing,
            upstream_url: lookup("TURNSTREAM_UPSTREAM_URL").filter(|url| !url.trim().is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.end_marker.is_empty() {
            return Err(ConfigError::EmptyEndMarker);
        }
        // A prompt containing the marker would hand off again on every reload
        if self.handoff_prompt.contains(&self.end_marker) {
            return Err(ConfigError::PromptContainsMarker {
                prompt: self.handoff_prompt.clone(),
                marker: self.end_marker.clone(),
            });
        }
        if self.delimiters.is_empty() {
            return Err(ConfigError::NoDelimiters);
        }
        Ok(())
    }

    pub fn tokenizer_config(&self) -> TokenizerConfig {
        TokenizerConfig::with_delimiters(&self.delimiters).trailing(self.trailing)
    }

    pub fn exchange_context(&self) -> ExchangeContext {
        ExchangeContext::new(
            self.end_marker.clone(),
            self.handoff_prompt.clone(),
            self.handoff_message.clone(),
        )
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_trailing(raw: &str) -> Result<TrailingPartial, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "emit" => Ok(TrailingPartial::Emit),
        "drop" => Ok(TrailingPartial::Drop),
        _ => Err(ConfigError::Invalid {
            var: "TURNSTREAM_TRAILING_PARTIAL",
            value: raw.to_string(),
            reason: "expected \"emit\" or \"drop\"".to_string(),
        }),
    }
}
