//! Ordered message collection with a single-writer critical section

use super::message::Message;
use super::role::Role;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no message is currently streaming")]
    NotStreaming,
}

/// Immutable point-in-time copy of a thread
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSnapshot {
    pub version: u64,
    pub messages: Vec<Message>,
}

#[allow(dead_code)] // Useful for tests
impl ThreadSnapshot {
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Change notifications for live observers
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadEvent {
    /// A token was appended to the streaming message at `index`
    Token {
        version: u64,
        index: usize,
        token: String,
    },
    /// Any other mutation; carries the full resulting thread
    Snapshot(ThreadSnapshot),
}

#[derive(Debug, Clone, PartialEq)]
enum Change {
    Token { index: usize, token: String },
    Structure,
}

// ============================================================================
// Thread - the mutable sequence, only reachable inside the store's lock
// ============================================================================

/// The message sequence plus the changes made since the lock was taken
#[derive(Debug, Default)]
pub struct Thread {
    messages: Vec<Message>,
    changes: Vec<Change>,
}

impl Thread {
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Add a message at the end of the thread
    pub fn append(&mut self, mut message: Message) {
        message.is_last_thread_message = false;
        if message.is_flag_eligible() {
            self.clear_flags();
            message.is_last_thread_message = true;
        }
        self.messages.push(message);
        self.changes.push(Change::Structure);
        self.check_invariants();
    }

    /// Swap the tail for `message`; appends when the thread is empty
    pub fn replace_last(&mut self, mut message: Message) {
        if self.messages.is_empty() {
            self.append(message);
            return;
        }

        message.is_last_thread_message = false;
        if message.is_flag_eligible() {
            self.clear_flags();
            message.is_last_thread_message = true;
        }
        if let Some(last) = self.messages.last_mut() {
            *last = message;
        }
        self.changes.push(Change::Structure);
        self.check_invariants();
    }

    /// Grow the streaming tail message by one token
    pub fn append_token(&mut self, token: &str) -> Result<(), StoreError> {
        let index = self.messages.len().checked_sub(1).ok_or(StoreError::NotStreaming)?;
        let last = &mut self.messages[index];
        if !last.is_streaming {
            return Err(StoreError::NotStreaming);
        }
        last.content.push_str(token);
        self.changes.push(Change::Token {
            index,
            token: token.to_string(),
        });
        Ok(())
    }

    /// Close the streaming tail message.
    ///
    /// Returns the finalized message, or `None` when the tail was not
    /// streaming (finishing twice is a no-op).
    pub fn finalize_last(&mut self) -> Option<Message> {
        let index = self.messages.len().checked_sub(1)?;
        if !self.messages[index].is_streaming {
            return None;
        }

        let seconds = self.messages[index].elapsed_seconds();
        let mut finished = self.messages[index].clone().with_duration(seconds);
        finished.is_streaming = false;
        finished.is_last_thread_message = false;
        if finished.is_flag_eligible() {
            self.clear_flags();
            finished.is_last_thread_message = true;
        }
        self.messages[index] = finished.clone();
        self.changes.push(Change::Structure);
        self.check_invariants();
        Some(finished)
    }

    /// Clear the last-thread-message flag from every message
    pub fn remove_last_message_flags(&mut self) {
        self.clear_flags();
        self.changes.push(Change::Structure);
    }

    pub fn delete_all(&mut self) {
        self.messages.clear();
        self.changes.push(Change::Structure);
    }

    /// Replace the whole thread, re-deriving the last-message flag
    pub fn load(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.clear_flags();
        if let Some(last) = self.messages.iter_mut().rev().find(|m| m.is_flag_eligible()) {
            last.is_last_thread_message = true;
        }
        self.changes.push(Change::Structure);
        self.check_invariants();
    }

    /// Latest finalized non-operator message, only while it holds the flag
    pub fn last_reply(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role != Role::Operator && !m.is_streaming)
            .filter(|m| m.is_last_thread_message)
    }

    /// Most recent responder reply, only once it is finalized
    pub fn validated_reply(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role != Role::Operator && !m.is_end_message)
            .filter(|m| !m.is_streaming)
    }

    pub fn flag_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.is_last_thread_message)
            .count()
    }

    fn clear_flags(&mut self) {
        for message in &mut self.messages {
            message.is_last_thread_message = false;
        }
    }

    fn check_invariants(&self) {
        debug_assert!(
            self.flag_count() <= 1,
            "thread has {} messages flagged as last",
            self.flag_count()
        );
    }
}

// ============================================================================
// ThreadStore - shared handle
// ============================================================================

struct Inner {
    thread: Thread,
    version: u64,
}

/// Thread-safe thread store.
///
/// Every mutation runs inside [`ThreadStore::write`], so a reader taking a
/// [`ThreadStore::snapshot`] never observes a half-applied change.
pub struct ThreadStore {
    inner: Mutex<Inner>,
    events: broadcast::Sender<ThreadEvent>,
}

impl Default for ThreadStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                thread: Thread::default(),
                version: 0,
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the thread, then publish what changed
    pub fn write<R>(&self, f: impl FnOnce(&mut Thread) -> R) -> R {
        let mut inner = self.lock();
        let result = f(&mut inner.thread);

        let changes = std::mem::take(&mut inner.thread.changes);
        if changes.is_empty() {
            return result;
        }
        inner.version += 1;
        let version = inner.version;

        // Nobody listening is fine
        if changes.iter().any(|c| matches!(c, Change::Structure)) {
            let _ = self.events.send(ThreadEvent::Snapshot(ThreadSnapshot {
                version,
                messages: inner.thread.messages.clone(),
            }));
        } else {
            for change in changes {
                if let Change::Token { index, token } = change {
                    let _ = self.events.send(ThreadEvent::Token {
                        version,
                        index,
                        token,
                    });
                }
            }
        }

        result
    }

    /// Run `f` against the thread without mutating it
    pub fn read<R>(&self, f: impl FnOnce(&Thread) -> R) -> R {
        f(&self.lock().thread)
    }

    pub fn snapshot(&self) -> ThreadSnapshot {
        let inner = self.lock();
        ThreadSnapshot {
            version: inner.version,
            messages: inner.thread.messages.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ThreadEvent> {
        self.events.subscribe()
    }

    pub fn last_reply(&self) -> Option<Message> {
        self.read(|t| t.last_reply().cloned())
    }

    pub fn validated_reply(&self) -> Option<Message> {
        self.read(|t| t.validated_reply().cloned())
    }
}

/// Single-mutation shortcuts that bypass the exchange state machine
#[allow(dead_code)] // Useful for tests
impl ThreadStore {
    pub fn append(&self, message: Message) {
        self.write(|t| t.append(message));
    }

    pub fn replace_last(&self, message: Message) {
        self.write(|t| t.replace_last(message));
    }

    pub fn remove_last_message_flags(&self) {
        self.write(Thread::remove_last_message_flags);
    }

    pub fn delete_all(&self) {
        self.write(Thread::delete_all);
    }
}
