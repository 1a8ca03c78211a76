//! Events that drive the exchange

use crate::thread::{Message, Role};

/// Events that trigger phase transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Streaming path
    Begin { role: Role },
    Token { text: String },
    Finish,

    // Whole-message updates
    Append { message: Message },
    Replace { message: Message },

    /// Persisted copy changed on disk and was loaded
    Reload { messages: Vec<Message> },

    DeleteAll,

    /// Generated by the runtime once the hand-off message is in the thread
    HandoffComplete,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Begin { .. } => "begin",
            Event::Token { .. } => "token",
            Event::Finish => "finish",
            Event::Append { .. } => "append",
            Event::Replace { .. } => "replace",
            Event::Reload { .. } => "reload",
            Event::DeleteAll => "delete_all",
            Event::HandoffComplete => "handoff_complete",
        }
    }
}
