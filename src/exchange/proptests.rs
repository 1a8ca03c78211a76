//! Property-based tests for the exchange state machine

use super::*;
use crate::thread::Thread;
use proptest::prelude::*;

const MARKER: &str = "<<END>>";
const PROMPT: &str = "over to you";

fn test_context() -> ExchangeContext {
    ExchangeContext::new(MARKER, PROMPT, "Your turn.")
}

fn test_exchange() -> Exchange {
    Exchange::new(Arc::new(ThreadStore::new()), test_context())
}

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Responder), Just(Role::Operator)]
}

/// Words, sometimes with the marker spliced in
fn arb_content() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![4 => "[a-z]{1,6}[ .,]", 1 => Just(MARKER.to_string())],
        0..8,
    )
    .prop_map(|parts| parts.concat())
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_role().prop_map(|role| Event::Begin { role }),
        "[a-z]{1,6}[ .]".prop_map(|text| Event::Token { text }),
        Just(Event::Token {
            text: MARKER.to_string()
        }),
        Just(Event::Finish),
        (arb_role(), arb_content()).prop_map(|(role, content)| Event::Append {
            message: Message::new(role, content)
        }),
        (arb_role(), arb_content()).prop_map(|(role, content)| Event::Replace {
            message: Message::new(role, content)
        }),
        proptest::collection::vec(
            (arb_role(), arb_content()).prop_map(|(r, c)| Message::new(r, c)),
            0..4
        )
        .prop_map(|messages| Event::Reload { messages }),
        Just(Event::DeleteAll),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // HandoffPending is never observable from outside a dispatch
    #[test]
    fn prop_handoff_pending_never_settles(events in proptest::collection::vec(arb_event(), 0..30)) {
        let exchange = test_exchange();
        for event in events {
            if let Ok(phase) = exchange.dispatch(event) {
                prop_assert_ne!(phase, ExchangePhase::HandoffPending);
            }
            prop_assert_ne!(exchange.phase(), ExchangePhase::HandoffPending);
        }
    }

    #[test]
    fn prop_single_last_flag(events in proptest::collection::vec(arb_event(), 0..30)) {
        let exchange = test_exchange();
        for event in events {
            let _ = exchange.dispatch(event);
            prop_assert!(exchange.store().read(Thread::flag_count) <= 1);
        }
    }

    #[test]
    fn prop_streaming_phase_matches_tail(events in proptest::collection::vec(arb_event(), 0..30)) {
        let exchange = test_exchange();
        for event in events {
            let _ = exchange.dispatch(event);
            let tail_streaming = exchange
                .store()
                .snapshot()
                .last()
                .is_some_and(|m| m.is_streaming);
            prop_assert_eq!(exchange.phase().is_streaming(), tail_streaming);
        }
    }

    #[test]
    fn prop_marker_yields_exactly_one_handoff(
        prefix in "[a-z ]{0,20}",
        suffix in "[a-z ]{0,20}",
        role in arb_role(),
        streamed in any::<bool>(),
    ) {
        let exchange = test_exchange();
        let content = format!("{prefix}{MARKER}{suffix}");

        if streamed {
            exchange.begin(role).unwrap();
            exchange.append_token(content).unwrap();
            exchange.finish().unwrap();
        } else {
            exchange.append(Message::new(role, content)).unwrap();
        }

        let snap = exchange.store().snapshot();
        prop_assert_eq!(snap.messages.len(), 2);
        prop_assert_eq!(snap.messages.iter().filter(|m| m.is_end_message).count(), 1);
        prop_assert!(snap.messages[1].is_end_message);
        prop_assert!(!snap.messages[0].content.contains(MARKER));
        prop_assert!(snap.messages.iter().all(|m| !m.is_last_thread_message));
        prop_assert_eq!(exchange.phase(), ExchangePhase::Idle);
    }

    #[test]
    fn prop_no_marker_no_handoff(content in "[a-z .,]{0,40}", role in arb_role()) {
        let exchange = test_exchange();
        exchange.append(Message::new(role, content)).unwrap();
        let snap = exchange.store().snapshot();
        prop_assert_eq!(snap.messages.len(), 1);
        prop_assert_eq!(exchange.phase(), ExchangePhase::Finalized);
    }

    #[test]
    fn prop_finish_is_idempotent(tokens in proptest::collection::vec("[a-z]{1,5} ", 0..6)) {
        let exchange = test_exchange();
        exchange.begin(Role::Responder).unwrap();
        for token in tokens {
            exchange.append_token(token).unwrap();
        }
        exchange.finish().unwrap();
        let once = exchange.store().snapshot();
        let phase = exchange.phase();

        exchange.finish().unwrap();
        prop_assert_eq!(exchange.store().snapshot(), once);
        prop_assert_eq!(exchange.phase(), phase);
    }

    #[test]
    fn prop_delete_all_always_resets(events in proptest::collection::vec(arb_event(), 0..20)) {
        let exchange = test_exchange();
        for event in events {
            let _ = exchange.dispatch(event);
        }
        prop_assert_eq!(exchange.delete_all().unwrap(), ExchangePhase::Idle);
        prop_assert!(exchange.store().snapshot().is_empty());
    }
}
