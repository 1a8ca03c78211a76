//! Effects produced by phase transitions

use crate::thread::{Message, Role};

/// Thread mutations to apply after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a new streaming message at the tail
    BeginMessage { role: Role },

    AppendToken { text: String },

    /// Close the streaming tail and reassign the last-message flag
    FinalizeLast,

    AppendMessage { message: Message },

    ReplaceLast { message: Message },

    /// Swap in a whole thread loaded from storage
    LoadThread { messages: Vec<Message> },

    /// Rewrite the tail's content, keeping every other field
    RewriteLast { content: String },

    ClearLastFlags,

    ClearThread,

    /// Append the synthetic end message; completes the hand-off
    AppendHandoff { message: Message },
}

impl Effect {
    pub fn append_handoff(content: &str) -> Self {
        Effect::AppendHandoff {
            message: Message::handoff(content),
        }
    }
}
