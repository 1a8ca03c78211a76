//! Exchange state machine
//!
//! Elm-style: a pure [`transition`] function decides the next phase and the
//! thread mutations, and [`Exchange`] applies them to the shared store.

mod effect;
mod event;
mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{
    ExchangeContext, ExchangePhase, DEFAULT_END_MARKER, DEFAULT_HANDOFF_MESSAGE,
    DEFAULT_HANDOFF_PROMPT,
};
pub use transition::{transition, TransitionError};

use crate::thread::{Message, Role, StoreError, Thread, ThreadStore};
use crate::upstream::UpstreamError;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("stream read failed: {0}")]
    Transport(#[from] io::Error),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Runtime for one conversation: owns the phase and drives the store
pub struct Exchange {
    store: Arc<ThreadStore>,
    phase: Mutex<ExchangePhase>,
    context: ExchangeContext,
}

impl Exchange {
    pub fn new(store: Arc<ThreadStore>, context: ExchangeContext) -> Self {
        Self {
            store,
            phase: Mutex::new(ExchangePhase::Idle),
            context,
        }
    }

    pub fn store(&self) -> &Arc<ThreadStore> {
        &self.store
    }

    pub fn phase(&self) -> ExchangePhase {
        *self.lock_phase()
    }

    fn lock_phase(&self) -> MutexGuard<'_, ExchangePhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `event` through the state machine and apply the resulting effects.
    ///
    /// The phase lock is taken before the store lock, and both are held for
    /// the whole chain of generated events, so observers see either the
    /// state before the event or the state after it.
    pub fn dispatch(&self, event: Event) -> Result<ExchangePhase, ExchangeError> {
        let mut phase = self.lock_phase();

        self.store.write(|thread| {
            let mut events_to_process = vec![event];

            while let Some(current) = events_to_process.pop() {
                let event_name = current.name();
                let result = transition(&phase, &self.context, thread.last(), current)
                    .inspect_err(|e| {
                        tracing::debug!(event = event_name, phase = phase.name(), error = %e, "Transition rejected");
                    })?;

                let old_phase = std::mem::replace(&mut *phase, result.new_phase);
                if old_phase != *phase {
                    tracing::debug!(
                        event = event_name,
                        from = old_phase.name(),
                        to = phase.name(),
                        "Exchange phase changed"
                    );
                }

                for effect in result.effects {
                    if let Some(generated) = apply_effect(thread, effect)? {
                        events_to_process.push(generated);
                    }
                }
            }

            Ok(*phase)
        })
    }

    pub fn begin(&self, role: Role) -> Result<ExchangePhase, ExchangeError> {
        self.dispatch(Event::Begin { role })
    }

    pub fn append_token(&self, text: impl Into<String>) -> Result<ExchangePhase, ExchangeError> {
        self.dispatch(Event::Token { text: text.into() })
    }

    pub fn finish(&self) -> Result<ExchangePhase, ExchangeError> {
        self.dispatch(Event::Finish)
    }

    pub fn append(&self, message: Message) -> Result<ExchangePhase, ExchangeError> {
        self.dispatch(Event::Append { message })
    }

    pub fn replace_last(&self, message: Message) -> Result<ExchangePhase, ExchangeError> {
        self.dispatch(Event::Replace { message })
    }

    pub fn reload(&self, messages: Vec<Message>) -> Result<ExchangePhase, ExchangeError> {
        tracing::info!(count = messages.len(), "Reloading thread from storage");
        self.dispatch(Event::Reload { messages })
    }

    pub fn delete_all(&self) -> Result<ExchangePhase, ExchangeError> {
        tracing::info!("Deleting all messages");
        self.dispatch(Event::DeleteAll)
    }
}

/// Apply one effect to the locked thread, returning any follow-up event
fn apply_effect(thread: &mut Thread, effect: Effect) -> Result<Option<Event>, StoreError> {
    match effect {
        Effect::BeginMessage { role } => {
            thread.append(Message::streaming(role));
            Ok(None)
        }

        Effect::AppendToken { text } => {
            thread.append_token(&text)?;
            Ok(None)
        }

        Effect::FinalizeLast => {
            if let Some(message) = thread.finalize_last() {
                tracing::info!(
                    role = %message.role,
                    chars = message.content.chars().count(),
                    duration_seconds = message.duration_seconds,
                    "Message finalized"
                );
            }
            Ok(None)
        }

        Effect::AppendMessage { message } => {
            thread.append(message);
            Ok(None)
        }

        Effect::ReplaceLast { message } => {
            thread.replace_last(message);
            Ok(None)
        }

        Effect::LoadThread { messages } => {
            thread.load(messages);
            Ok(None)
        }

        Effect::RewriteLast { content } => {
            if let Some(rewritten) = thread.last().map(|m| m.with_content(content)) {
                thread.replace_last(rewritten);
            }
            Ok(None)
        }

        Effect::ClearLastFlags => {
            thread.remove_last_message_flags();
            Ok(None)
        }

        Effect::ClearThread => {
            thread.delete_all();
            Ok(None)
        }

        Effect::AppendHandoff { message } => {
            thread.append(message);
            tracing::info!("Hand-off message appended");
            Ok(Some(Event::HandoffComplete))
        }
    }
}
