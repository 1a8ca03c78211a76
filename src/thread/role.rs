//! Participant roles and alias normalization

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Participant identity attached to every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Role {
    /// The automated side of the conversation
    Responder,
    /// The human driving the conversation
    Operator,
    /// Engine-authored messages (hand-off invitations)
    System,
}

/// Alias prefixes and the canonical role each collapses to.
///
/// Matching is case-insensitive on the trimmed input and the first entry
/// whose prefix matches wins. This table is the only place aliases are
/// resolved.
const ROLE_ALIASES: &[(&str, Role)] = &[
    ("assistant", Role::Responder),
    ("responder", Role::Responder),
    ("bot", Role::Responder),
    ("model", Role::Responder),
    ("ai", Role::Responder),
    ("user", Role::Operator),
    ("operator", Role::Operator),
    ("human", Role::Operator),
    ("system", Role::System),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    #[error("role must not be empty")]
    Empty,
    #[error("unknown role: {0:?}")]
    Unknown(String),
}

/// Resolve a role string through [`ROLE_ALIASES`]
pub fn normalize_role(raw: &str) -> Result<Role, RoleError> {
    let lowered = raw.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return Err(RoleError::Empty);
    }

    ROLE_ALIASES
        .iter()
        .find(|(prefix, _)| lowered.starts_with(prefix))
        .map(|(_, role)| *role)
        .ok_or_else(|| RoleError::Unknown(raw.trim().to_string()))
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Responder => "responder",
            Role::Operator => "operator",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_role(s)
    }
}

impl TryFrom<String> for Role {
    type Error = RoleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        normalize_role(&value)
    }
}
