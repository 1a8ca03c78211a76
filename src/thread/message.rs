//! Message values held by a thread

use super::role::{normalize_role, Role, RoleError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single message in a conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default)]
    pub is_last_thread_message: bool,
    #[serde(default)]
    pub is_end_message: bool,
}

impl Message {
    /// A complete (non-streaming) message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
            duration_seconds: None,
            is_streaming: false,
            is_last_thread_message: false,
            is_end_message: false,
        }
    }

    /// An empty message that is still receiving tokens
    pub fn streaming(role: Role) -> Self {
        Self {
            is_streaming: true,
            ..Self::new(role, String::new())
        }
    }

    /// The system-authored message that closes a phase
    pub fn handoff(content: impl Into<String>) -> Self {
        Self {
            is_end_message: true,
            ..Self::new(Role::System, content)
        }
    }

    /// Whether this message may carry the last-thread-message flag
    pub fn is_flag_eligible(&self) -> bool {
        self.role != Role::Operator && !self.is_end_message && !self.is_streaming
    }

    /// Copy of this message with its content rewritten
    #[must_use]
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }

    /// Set the duration annotation unless one is already present
    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        if self.duration_seconds.is_none() {
            self.duration_seconds = Some(seconds);
        }
        self
    }

    /// Seconds elapsed since the message was created
    pub fn elapsed_seconds(&self) -> f64 {
        let elapsed = Utc::now().signed_duration_since(self.created_at);
        #[allow(clippy::cast_precision_loss)] // millisecond precision is plenty
        let millis = elapsed.num_milliseconds().max(0) as f64;
        millis / 1000.0
    }
}

/// Persisted representation of a message: `{role, content, durationSeconds}`.
///
/// `createdAt` is written so a reload keeps the original timestamps; records
/// without it get the load time. `isEndMessage` is only written for hand-off
/// messages so a reloaded thread keeps them unflagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_end_message: bool,
}

impl MessageRecord {
    /// Validate the role and build a finalized message
    pub fn into_message(self) -> Result<Message, RoleError> {
        let role = normalize_role(&self.role)?;
        let mut message = Message::new(role, self.content);
        if let Some(created_at) = self.created_at {
            message.created_at = created_at;
        }
        message.duration_seconds = self.duration_seconds;
        message.is_end_message = self.is_end_message;
        Ok(message)
    }
}

impl From<&Message> for MessageRecord {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
            created_at: Some(message.created_at),
            duration_seconds: message.duration_seconds,
            is_end_message: message.is_end_message,
        }
    }
}

/// Message as accepted from HTTP callers.
///
/// Carries no end-marker or timestamp; end messages are only ever injected by
/// the exchange itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInput {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

impl MessageInput {
    /// Validate the role and build a finalized, ordinary message
    pub fn into_message(self) -> Result<Message, RoleError> {
        let role = normalize_role(&self.role)?;
        let mut message = Message::new(role, self.content);
        message.duration_seconds = self.duration_seconds;
        Ok(message)
    }
}
