//! Exchange phase and the immutable settings that drive transitions

use crate::thread::Role;
use serde::Serialize;

/// Marker a responder embeds in its reply to end its turn
pub const DEFAULT_END_MARKER: &str = "[END_OF_EXCHANGE]";

/// Text that replaces the marker inside the closing reply
pub const DEFAULT_HANDOFF_PROMPT: &str = "I have nothing further to add.";

/// Content of the system message appended after a hand-off
pub const DEFAULT_HANDOFF_MESSAGE: &str =
    "The responder has finished. Continue the conversation or conclude it.";

/// Phase of the current exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExchangePhase {
    /// No active exchange
    #[default]
    Idle,

    /// A message is open and receiving tokens
    Streaming { role: Role },

    /// The last message is closed
    Finalized,

    /// End marker seen; hand-off message being injected
    HandoffPending,
}

impl ExchangePhase {
    pub fn is_streaming(&self) -> bool {
        matches!(self, ExchangePhase::Streaming { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExchangePhase::Idle => "idle",
            ExchangePhase::Streaming { .. } => "streaming",
            ExchangePhase::Finalized => "finalized",
            ExchangePhase::HandoffPending => "handoff_pending",
        }
    }
}

/// Settings for an exchange (immutable configuration)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeContext {
    pub end_marker: String,
    pub handoff_prompt: String,
    pub handoff_message: String,
}

impl Default for ExchangeContext {
    fn default() -> Self {
        Self {
            end_marker: DEFAULT_END_MARKER.to_string(),
            handoff_prompt: DEFAULT_HANDOFF_PROMPT.to_string(),
            handoff_message: DEFAULT_HANDOFF_MESSAGE.to_string(),
        }
    }
}

impl ExchangeContext {
    pub fn new(
        end_marker: impl Into<String>,
        handoff_prompt: impl Into<String>,
        handoff_message: impl Into<String>,
    ) -> Self {
        Self {
            end_marker: end_marker.into(),
            handoff_prompt: handoff_prompt.into(),
            handoff_message: handoff_message.into(),
        }
    }

    /// Plain substring match; an empty marker never matches
    pub fn contains_marker(&self, content: &str) -> bool {
        !self.end_marker.is_empty() && content.contains(&self.end_marker)
    }

    /// Content of a closing reply with the marker swapped for the prompt.
    ///
    /// Falls back to the bare prompt if the substitution happens to form a
    /// new marker out of the surrounding text.
    pub fn rewrite_for_handoff(&self, content: &str) -> String {
        let rewritten = content.replace(&self.end_marker, &self.handoff_prompt);
        if self.contains_marker(&rewritten) {
            self.handoff_prompt.clone()
        } else {
            rewritten
        }
    }
}
