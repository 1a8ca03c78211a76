//! API request and response types

use crate::exchange::ExchangePhase;
use crate::thread::Message;
use serde::{Deserialize, Serialize};

/// Query string of the streaming endpoint
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub role: String,
}

/// Full thread plus the exchange phase
#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub version: u64,
    pub phase: ExchangePhase,
    pub messages: Vec<Message>,
}

/// Reply text; empty when there is no qualifying reply
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyResponse {
    pub content: String,
}

impl ReplyResponse {
    pub fn from_message(message: Option<Message>) -> Self {
        Self {
            content: message.map(|m| m.content).unwrap_or_default(),
        }
    }
}

/// Phase after a mutation
#[derive(Debug, Serialize)]
pub struct PhaseResponse {
    pub phase: ExchangePhase,
}

/// Result of a streamed message
#[derive(Debug, Serialize)]
pub struct StreamResponse {
    pub tokens: usize,
    pub phase: ExchangePhase,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub saved: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
