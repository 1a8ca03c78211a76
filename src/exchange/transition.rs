//! Pure phase transition function

use super::{Effect, Event, ExchangeContext, ExchangePhase};
use crate::thread::Message;
use thiserror::Error;

/// Result of a phase transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_phase: ExchangePhase,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(phase: ExchangePhase) -> Self {
        Self {
            new_phase: phase,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A message is already streaming (finish it first)")]
    AlreadyStreaming,
    #[error("No message is streaming")]
    NotStreaming,
    #[error("Exchange is busy streaming, cannot accept a whole message")]
    Busy,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function.
///
/// `tail` is the current last message of the thread. Given the same inputs
/// this always produces the same outputs and performs no I/O.
pub fn transition(
    phase: &ExchangePhase,
    context: &ExchangeContext,
    tail: Option<&Message>,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (phase, event) {
        // ============================================================
        // Streaming path
        // ============================================================

        (ExchangePhase::Idle | ExchangePhase::Finalized, Event::Begin { role }) => Ok(
            TransitionResult::new(ExchangePhase::Streaming { role })
                .with_effect(Effect::BeginMessage { role }),
        ),

        (ExchangePhase::Streaming { .. }, Event::Begin { .. }) => {
            Err(TransitionError::AlreadyStreaming)
        }

        (ExchangePhase::Streaming { role }, Event::Token { text }) => {
            Ok(TransitionResult::new(ExchangePhase::Streaming { role: *role })
                .with_effect(Effect::AppendToken { text }))
        }

        (_, Event::Token { .. }) => Err(TransitionError::NotStreaming),

        (ExchangePhase::Streaming { .. }, Event::Finish) => {
            let content = tail.map(|m| m.content.as_str()).unwrap_or_default();
            let result = TransitionResult::new(ExchangePhase::Finalized)
                .with_effect(Effect::FinalizeLast);

            if context.contains_marker(content) {
                Ok(begin_handoff(result, context).with_effect(Effect::RewriteLast {
                    content: context.rewrite_for_handoff(content),
                })
                .with_effects(handoff_tail(context)))
            } else {
                Ok(result)
            }
        }

        // Finishing an already-closed message does nothing
        (_, Event::Finish) => Ok(TransitionResult::new(*phase)),

        // ============================================================
        // Whole-message updates
        // ============================================================

        (ExchangePhase::Streaming { .. }, Event::Append { .. } | Event::Replace { .. }) => {
            Err(TransitionError::Busy)
        }

        (ExchangePhase::Idle | ExchangePhase::Finalized, Event::Append { message }) => {
            Ok(whole_message(context, message, |message| Effect::AppendMessage { message }))
        }

        (ExchangePhase::Idle | ExchangePhase::Finalized, Event::Replace { message }) => {
            Ok(whole_message(context, message, |message| Effect::ReplaceLast { message }))
        }

        // ============================================================
        // Reload and reset (accepted in any phase)
        // ============================================================

        (_, Event::Reload { mut messages }) => {
            let needs_handoff = messages
                .last()
                .is_some_and(|m| !m.is_end_message && context.contains_marker(&m.content));

            if needs_handoff {
                if let Some(last) = messages.last_mut() {
                    *last = last.with_content(context.rewrite_for_handoff(&last.content));
                }
                let result = TransitionResult::new(ExchangePhase::Finalized)
                    .with_effect(Effect::LoadThread { messages });
                Ok(begin_handoff(result, context).with_effects(handoff_tail(context)))
            } else {
                let next = if messages.is_empty() {
                    ExchangePhase::Idle
                } else {
                    ExchangePhase::Finalized
                };
                Ok(TransitionResult::new(next).with_effect(Effect::LoadThread { messages }))
            }
        }

        (_, Event::DeleteAll) => {
            Ok(TransitionResult::new(ExchangePhase::Idle).with_effect(Effect::ClearThread))
        }

        // ============================================================
        // Hand-off completion
        // ============================================================

        (ExchangePhase::HandoffPending, Event::HandoffComplete) => {
            Ok(TransitionResult::new(ExchangePhase::Idle))
        }

        (phase, event) => Err(TransitionError::InvalidTransition(format!(
            "{} in phase {}",
            event.name(),
            phase.name()
        ))),
    }
}

/// Append or replace with a complete message, handing off if it carries the marker
fn whole_message(
    context: &ExchangeContext,
    message: Message,
    place: impl FnOnce(Message) -> Effect,
) -> TransitionResult {
    if context.contains_marker(&message.content) {
        let rewritten = message.with_content(context.rewrite_for_handoff(&message.content));
        let result = TransitionResult::new(ExchangePhase::Finalized).with_effect(place(rewritten));
        begin_handoff(result, context).with_effects(handoff_tail(context))
    } else {
        TransitionResult::new(ExchangePhase::Finalized).with_effect(place(message))
    }
}

fn begin_handoff(result: TransitionResult, context: &ExchangeContext) -> TransitionResult {
    tracing::debug!(marker = %context.end_marker, "End marker detected, handing off");
    TransitionResult {
        new_phase: ExchangePhase::HandoffPending,
        effects: result.effects,
    }
}

/// Flags cleared, then the end message appended
fn handoff_tail(context: &ExchangeContext) -> [Effect; 2] {
    [
        Effect::ClearLastFlags,
        Effect::append_handoff(&context.handoff_message),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Role;

    fn ctx() -> ExchangeContext {
        ExchangeContext::new("<END>", "Over to you.", "Your turn.")
    }

    fn streaming_tail(content: &str) -> Message {
        let mut m = Message::streaming(Role::Responder);
        m.content = content.to_string();
        m
    }

    #[test]
    fn idle_begin_starts_streaming() {
        let result = transition(
            &ExchangePhase::Idle,
            &ctx(),
            None,
            Event::Begin {
                role: Role::Responder,
            },
        )
        .unwrap();
        assert_eq!(
            result.new_phase,
            ExchangePhase::Streaming {
                role: Role::Responder
            }
        );
        assert_eq!(
            result.effects,
            vec![Effect::BeginMessage {
                role: Role::Responder
            }]
        );
    }

    #[test]
    fn begin_while_streaming_is_rejected() {
        let phase = ExchangePhase::Streaming {
            role: Role::Operator,
        };
        let err = transition(
            &phase,
            &ctx(),
            None,
            Event::Begin {
                role: Role::Responder,
            },
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::AlreadyStreaming);
    }

    #[test]
    fn token_outside_streaming_is_rejected() {
        let err = transition(
            &ExchangePhase::Finalized,
            &ctx(),
            None,
            Event::Token { text: "x".into() },
        )
        .unwrap_err();
        assert_eq!(err, TransitionError::NotStreaming);
    }

    #[test]
    fn finish_without_marker_finalizes() {
        let phase = ExchangePhase::Streaming {
            role: Role::Responder,
        };
        let tail = streaming_tail("plain reply.");
        let result = transition(&phase, &ctx(), Some(&tail), Event::Finish).unwrap();
        assert_eq!(result.new_phase, ExchangePhase::Finalized);
        assert_eq!(result.effects, vec![Effect::FinalizeLast]);
    }

    #[test]
    fn finish_with_marker_hands_off() {
        let phase = ExchangePhase::Streaming {
            role: Role::Responder,
        };
        let tail = streaming_tail("All done <END>");
        let result = transition(&phase, &ctx(), Some(&tail), Event::Finish).unwrap();
        assert_eq!(result.new_phase, ExchangePhase::HandoffPending);
        assert_eq!(
            result.effects[..3],
            [
                Effect::FinalizeLast,
                Effect::RewriteLast {
                    content: "All done Over to you.".into()
                },
                Effect::ClearLastFlags,
            ]
        );
        match &result.effects[3] {
            Effect::AppendHandoff { message } => {
                assert_eq!(message.content, "Your turn.");
                assert!(message.is_end_message);
                assert_eq!(message.role, Role::System);
            }
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn finish_when_not_streaming_is_noop() {
        for phase in [ExchangePhase::Idle, ExchangePhase::Finalized] {
            let result = transition(&phase, &ctx(), None, Event::Finish).unwrap();
            assert_eq!(result.new_phase, phase);
            assert!(result.effects.is_empty());
        }
    }

    #[test]
    fn whole_messages_rejected_while_streaming() {
        let phase = ExchangePhase::Streaming {
            role: Role::Responder,
        };
        let message = Message::new(Role::Operator, "hi");
        let err = transition(&phase, &ctx(), None, Event::Append { message }).unwrap_err();
        assert_eq!(err, TransitionError::Busy);
    }

    #[test]
    fn append_with_marker_rewrites_before_placing() {
        let message = Message::new(Role::Responder, "<END>");
        let result =
            transition(&ExchangePhase::Idle, &ctx(), None, Event::Append { message }).unwrap();
        assert_eq!(result.new_phase, ExchangePhase::HandoffPending);
        match &result.effects[0] {
            Effect::AppendMessage { message } => assert_eq!(message.content, "Over to you."),
            other => panic!("unexpected effect {other:?}"),
        }
        assert_eq!(result.effects.len(), 3);
    }

    #[test]
    fn reload_of_empty_thread_goes_idle() {
        let result = transition(
            &ExchangePhase::Finalized,
            &ctx(),
            None,
            Event::Reload { messages: vec![] },
        )
        .unwrap();
        assert_eq!(result.new_phase, ExchangePhase::Idle);
    }

    #[test]
    fn reload_interrupts_streaming() {
        let phase = ExchangePhase::Streaming {
            role: Role::Responder,
        };
        let messages = vec![Message::new(Role::Operator, "hi")];
        let result = transition(&phase, &ctx(), None, Event::Reload { messages }).unwrap();
        assert_eq!(result.new_phase, ExchangePhase::Finalized);
    }

    #[test]
    fn reload_with_marker_in_tail_hands_off() {
        let messages = vec![
            Message::new(Role::Operator, "hi"),
            Message::new(Role::Responder, "bye <END>"),
        ];
        let result =
            transition(&ExchangePhase::Idle, &ctx(), None, Event::Reload { messages }).unwrap();
        assert_eq!(result.new_phase, ExchangePhase::HandoffPending);
        match &result.effects[0] {
            Effect::LoadThread { messages } => {
                assert_eq!(messages[1].content, "bye Over to you.");
            }
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn delete_all_from_any_phase() {
        for phase in [
            ExchangePhase::Idle,
            ExchangePhase::Streaming {
                role: Role::Responder,
            },
            ExchangePhase::Finalized,
            ExchangePhase::HandoffPending,
        ] {
            let result = transition(&phase, &ctx(), None, Event::DeleteAll).unwrap();
            assert_eq!(result.new_phase, ExchangePhase::Idle);
            assert_eq!(result.effects, vec![Effect::ClearThread]);
        }
    }

    #[test]
    fn handoff_complete_only_from_pending() {
        let result = transition(
            &ExchangePhase::HandoffPending,
            &ctx(),
            None,
            Event::HandoffComplete,
        )
        .unwrap();
        assert_eq!(result.new_phase, ExchangePhase::Idle);

        let err = transition(&ExchangePhase::Idle, &ctx(), None, Event::HandoffComplete)
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition(_)));
    }

    #[test]
    fn rewrite_never_leaves_marker() {
        let context = ExchangeContext::new("ab", "a", "x");
        let rewritten = context.rewrite_for_handoff("aabb");
        assert!(!rewritten.contains("ab"));
    }
}
