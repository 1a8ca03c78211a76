//! Conversation thread: messages, roles and the shared store

mod message;
mod role;
mod store;

#[cfg(test)]
mod proptests;

pub use message::{Message, MessageInput, MessageRecord};
pub use role::{normalize_role, Role, RoleError};
pub use store::{StoreError, Thread, ThreadEvent, ThreadSnapshot, ThreadStore};
