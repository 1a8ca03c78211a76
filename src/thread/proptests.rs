//! Property-based tests for the thread store
//!
//! Arbitrary mutation sequences must never leave more than one message
//! flagged as the last thread message.

use super::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Append(Message),
    ReplaceLast(Message),
    BeginStream(Role),
    Token(String),
    Finalize,
    RemoveFlags,
    DeleteAll,
    Load(Vec<Message>),
}

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Responder), Just(Role::Operator), Just(Role::System)]
}

fn arb_message() -> impl Strategy<Value = Message> {
    (arb_role(), "[a-z ]{0,12}", any::<bool>(), any::<bool>()).prop_map(
        |(role, content, end, forged_flag)| {
            let mut message = if end {
                Message::handoff(content)
            } else {
                Message::new(role, content)
            };
            message.is_last_thread_message = forged_flag;
            message
        },
    )
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        arb_message().prop_map(Op::Append),
        arb_message().prop_map(Op::ReplaceLast),
        arb_role().prop_map(Op::BeginStream),
        "[a-z]{1,5}[ .]".prop_map(Op::Token),
        Just(Op::Finalize),
        Just(Op::RemoveFlags),
        Just(Op::DeleteAll),
        proptest::collection::vec(arb_message(), 0..5).prop_map(Op::Load),
    ]
}

fn apply(thread: &mut Thread, op: Op) {
    match op {
        Op::Append(m) => thread.append(m),
        Op::ReplaceLast(m) => thread.replace_last(m),
        Op::BeginStream(role) => thread.append(Message::streaming(role)),
        Op::Token(t) => {
            let _ = thread.append_token(&t);
        }
        Op::Finalize => {
            let _ = thread.finalize_last();
        }
        Op::RemoveFlags => thread.remove_last_message_flags(),
        Op::DeleteAll => thread.delete_all(),
        Op::Load(ms) => thread.load(ms),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_at_most_one_last_flag(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let store = ThreadStore::new();
        for op in ops {
            store.write(|t| apply(t, op));
            prop_assert!(store.read(Thread::flag_count) <= 1);
        }
    }

    #[test]
    fn prop_flag_never_on_operator_or_end(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let store = ThreadStore::new();
        for op in ops {
            store.write(|t| apply(t, op));
        }
        for m in store.snapshot().messages {
            if m.is_last_thread_message {
                prop_assert!(m.role != Role::Operator);
                prop_assert!(!m.is_end_message);
                prop_assert!(!m.is_streaming);
            }
        }
    }

    #[test]
    fn prop_append_preserves_order(contents in proptest::collection::vec("[a-z]{1,8}", 0..20)) {
        let store = ThreadStore::new();
        for c in &contents {
            store.append(Message::new(Role::Responder, c.clone()));
        }
        let stored: Vec<String> = store.snapshot().messages.into_iter().map(|m| m.content).collect();
        prop_assert_eq!(stored, contents);
    }

    #[test]
    fn prop_version_never_decreases(ops in proptest::collection::vec(arb_op(), 1..20)) {
        let store = ThreadStore::new();
        let mut last = store.snapshot().version;
        for op in ops {
            store.write(|t| apply(t, op));
            let now = store.snapshot().version;
            prop_assert!(now >= last);
            last = now;
        }
    }
}
