//! Property-based tests for state mutation invariants
//!
//! These tests drive random mutation sequences through the StateMutator and
//! check counter monotonicity, reaction non-negativity, stale-reference
//! idempotence and lossless store serialization.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use tanya_core::{
    ManualTimeSource, Mutation, Outcome, QuestionId, ReactionAction, Session, SessionId,
    SessionStore, StateMutator, Timestamp,
};

const EMOJIS: [&str; 3] = ["👍", "🎉", "❤️"];

#[derive(Debug, Clone)]
enum Op {
    Submit(String),
    Upvote(usize),
    React(usize, usize, bool),
    Comment(usize, String),
    Delete(usize),
    Toggle(usize),
}

/// Generate non-blank question or comment text
fn arb_text() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[a-zA-Z0-9?][a-zA-Z0-9 ?]{0,40}").unwrap()
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        arb_text().prop_map(Op::Submit),
        (0usize..8).prop_map(Op::Upvote),
        (0usize..8, 0usize..EMOJIS.len(), any::<bool>()).prop_map(|(q, e, add)| Op::React(q, e, add)),
        (0usize..8, arb_text()).prop_map(|(q, t)| Op::Comment(q, t)),
        (0usize..8).prop_map(Op::Delete),
        (0usize..8).prop_map(Op::Toggle),
    ]
}

fn session_id() -> SessionId {
    SessionId::from("s1")
}

fn fresh() -> (StateMutator, SessionStore) {
    let time = ManualTimeSource::new_at(Timestamp::new(1_700_000_000_000));
    let mutator = StateMutator::new(Arc::new(time));
    let store: SessionStore = vec![Session::new(session_id(), "Room", None, Timestamp::new(0))]
        .into_iter()
        .collect();
    (mutator, store)
}

/// Resolve an index to an existing question id, or a guaranteed-missing one
fn pick(store: &SessionStore, index: usize) -> QuestionId {
    let session = store.get(&session_id()).unwrap();
    session
        .questions
        .get(index)
        .map(|q| q.id)
        .unwrap_or(QuestionId(u64::MAX))
}

fn to_mutation(store: &SessionStore, op: &Op) -> Mutation {
    let session_id = session_id();
    match op {
        Op::Submit(text) => Mutation::SubmitQuestion {
            session_id,
            text: text.clone(),
        },
        Op::Upvote(i) => Mutation::Upvote {
            session_id,
            question_id: pick(store, *i),
        },
        Op::React(i, e, add) => Mutation::React {
            session_id,
            question_id: pick(store, *i),
            emoji: EMOJIS[*e].to_string(),
            action: if *add {
                ReactionAction::Add
            } else {
                ReactionAction::Remove
            },
        },
        Op::Comment(i, text) => Mutation::Comment {
            session_id,
            question_id: pick(store, *i),
            text: text.clone(),
        },
        Op::Delete(i) => Mutation::DeleteQuestion {
            session_id,
            question_id: pick(store, *i),
        },
        Op::Toggle(i) => Mutation::ToggleAnswered {
            session_id,
            question_id: pick(store, *i),
        },
    }
}

fn upvotes(store: &SessionStore) -> BTreeMap<QuestionId, u32> {
    store
        .get(&session_id())
        .unwrap()
        .questions
        .iter()
        .map(|q| (q.id, q.upvotes))
        .collect()
}

proptest! {
    /// Property: upvotes only ever grow, by exactly one per accepted upvote
    #[test]
    fn upvotes_are_monotonic(ops in prop::collection::vec(arb_op(), 1..60)) {
        let (mut mutator, mut store) = fresh();

        for op in &ops {
            let before = upvotes(&store);
            let mutation = to_mutation(&store, op);
            let outcome = mutator.apply(&mut store, &mutation);
            let after = upvotes(&store);

            for (id, count) in &after {
                if let Some(previous) = before.get(id) {
                    let expected = match (&mutation, outcome) {
                        (Mutation::Upvote { question_id, .. }, Outcome::Applied) if question_id == id => previous + 1,
                        _ => *previous,
                    };
                    prop_assert_eq!(*count, expected);
                }
            }
        }
    }

    /// Property: reaction maps never hold zero counts and agree with a simple model
    #[test]
    fn reactions_never_negative(ops in prop::collection::vec(arb_op(), 1..60)) {
        let (mut mutator, mut store) = fresh();
        let mut model: BTreeMap<(QuestionId, String), u32> = BTreeMap::new();

        for op in &ops {
            let mutation = to_mutation(&store, op);
            let outcome = mutator.apply(&mut store, &mutation);

            match (&mutation, outcome) {
                (Mutation::React { question_id, emoji, action: ReactionAction::Add, .. }, Outcome::Applied) => {
                    *model.entry((*question_id, emoji.clone())).or_insert(0) += 1;
                }
                (Mutation::React { question_id, emoji, action: ReactionAction::Remove, .. }, _) => {
                    model.remove(&(*question_id, emoji.clone()));
                }
                (Mutation::DeleteQuestion { question_id, .. }, Outcome::Applied) => {
                    model.retain(|(q, _), _| q != question_id);
                }
                _ => {}
            }

            for question in &store.get(&session_id()).unwrap().questions {
                for (emoji, count) in &question.reactions {
                    prop_assert!(*count > 0);
                    prop_assert_eq!(model.get(&(question.id, emoji.clone())).copied(), Some(*count));
                }
            }
        }
    }

    /// Property: question ids stay unique within a session
    #[test]
    fn question_ids_unique(texts in prop::collection::vec(arb_text(), 1..40)) {
        let (mut mutator, mut store) = fresh();
        for text in &texts {
            let mutation = Mutation::SubmitQuestion { session_id: session_id(), text: text.clone() };
            prop_assert!(mutator.apply(&mut store, &mutation).is_applied());
        }

        let ids = upvotes(&store);
        prop_assert_eq!(ids.len(), texts.len());
    }

    /// Property: mutations against a missing session leave the store byte-identical
    #[test]
    fn stale_session_is_noop(ops in prop::collection::vec(arb_op(), 1..30), name in "[a-z]{1,12}") {
        let (mut mutator, mut store) = fresh();
        let seeded: Vec<Mutation> = ops.iter().map(|op| to_mutation(&store, op)).collect();
        for mutation in &seeded {
            mutator.apply(&mut store, mutation);
        }
        let snapshot = serde_json::to_vec(&store).unwrap();

        let missing = SessionId::from(format!("missing-{}", name).as_str());
        for op in &ops {
            let mutation = match to_mutation(&store, op) {
                Mutation::SubmitQuestion { text, .. } => Mutation::SubmitQuestion { session_id: missing.clone(), text },
                Mutation::Upvote { question_id, .. } => Mutation::Upvote { session_id: missing.clone(), question_id },
                Mutation::React { question_id, emoji, action, .. } => Mutation::React { session_id: missing.clone(), question_id, emoji, action },
                Mutation::Comment { question_id, text, .. } => Mutation::Comment { session_id: missing.clone(), question_id, text },
                Mutation::DeleteQuestion { question_id, .. } => Mutation::DeleteQuestion { session_id: missing.clone(), question_id },
                Mutation::ToggleAnswered { question_id, .. } => Mutation::ToggleAnswered { session_id: missing.clone(), question_id },
            };
            prop_assert_eq!(mutator.apply(&mut store, &mutation), Outcome::Ignored("unknown session"));
        }

        prop_assert_eq!(serde_json::to_vec(&store).unwrap(), snapshot);
    }

    /// Property: a store survives JSON serialization unchanged
    #[test]
    fn store_serialization_is_lossless(ops in prop::collection::vec(arb_op(), 0..40)) {
        let (mut mutator, mut store) = fresh();
        for op in &ops {
            let mutation = to_mutation(&store, op);
            mutator.apply(&mut store, &mutation);
        }

        let json = serde_json::to_string(&store).unwrap();
        let restored: SessionStore = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(restored, store);
    }
}
