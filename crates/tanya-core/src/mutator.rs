//! State mutation
//!
//! Every mutation follows the same discipline: look up the session, no-op if
//! absent, look up the question, no-op if absent, then apply. The mutator only
//! touches the store it is given; persisting, re-rendering and broadcasting
//! are the caller's job once an [`Outcome::Applied`] comes back.

use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::errors::InputError;
use crate::protocol::{Message, ReactionAction};
use crate::role::Role;
use crate::store::{Comment, Question, Session, SessionStore};
use crate::types::{CommentId, IdClock, QuestionId, SessionId, ShortCode, TimeSource, Timestamp};

// ----------------------------------------------------------------------------
// Mutation
// ----------------------------------------------------------------------------

/// A change to a question or its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SubmitQuestion {
        session_id: SessionId,
        text: String,
    },
    Upvote {
        session_id: SessionId,
        question_id: QuestionId,
    },
    React {
        session_id: SessionId,
        question_id: QuestionId,
        emoji: String,
        action: ReactionAction,
    },
    Comment {
        session_id: SessionId,
        question_id: QuestionId,
        text: String,
    },
    DeleteQuestion {
        session_id: SessionId,
        question_id: QuestionId,
    },
    ToggleAnswered {
        session_id: SessionId,
        question_id: QuestionId,
    },
}

impl Mutation {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Mutation::SubmitQuestion { session_id, .. }
            | Mutation::Upvote { session_id, .. }
            | Mutation::React { session_id, .. }
            | Mutation::Comment { session_id, .. }
            | Mutation::DeleteQuestion { session_id, .. }
            | Mutation::ToggleAnswered { session_id, .. } => session_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::SubmitQuestion { .. } => "submit_question",
            Mutation::Upvote { .. } => "upvote",
            Mutation::React { .. } => "reaction",
            Mutation::Comment { .. } => "comment",
            Mutation::DeleteQuestion { .. } => "delete_question",
            Mutation::ToggleAnswered { .. } => "toggle_answered",
        }
    }

    /// The action name to report when a non-admin attempts an admin-only mutation
    pub fn admin_action(&self) -> Option<&'static str> {
        match self {
            Mutation::React {
                action: ReactionAction::Remove,
                ..
            } => Some("remove reactions"),
            Mutation::DeleteQuestion { .. } => Some("delete questions"),
            Mutation::ToggleAnswered { .. } => Some("mark questions answered"),
            _ => None,
        }
    }

    /// Reject blank text before any effect
    pub fn validate(&self) -> Result<(), InputError> {
        match self {
            Mutation::SubmitQuestion { text, .. } if text.trim().is_empty() => {
                Err(InputError::EmptyQuestion)
            }
            Mutation::Comment { text, .. } if text.trim().is_empty() => {
                Err(InputError::EmptyComment)
            }
            Mutation::React { emoji, .. } if emoji.trim().is_empty() => {
                Err(InputError::EmptyEmoji)
            }
            _ => Ok(()),
        }
    }

    /// The wire message a Client forwards to its Host
    pub fn into_message(self) -> Message {
        match self {
            Mutation::SubmitQuestion { session_id, text } => {
                Message::SubmitQuestion { session_id, text }
            }
            Mutation::Upvote {
                session_id,
                question_id,
            } => Message::Upvote {
                session_id,
                question_id,
            },
            Mutation::React {
                session_id,
                question_id,
                emoji,
                action,
            } => Message::Reaction {
                session_id,
                question_id,
                emoji,
                action,
            },
            Mutation::Comment {
                session_id,
                question_id,
                text,
            } => Message::Comment {
                session_id,
                question_id,
                text,
            },
            Mutation::DeleteQuestion {
                session_id,
                question_id,
            } => Message::DeleteQuestion {
                session_id,
                question_id,
            },
            Mutation::ToggleAnswered {
                session_id,
                question_id,
            } => Message::ToggleAnswered {
                session_id,
                question_id,
            },
        }
    }
}

impl TryFrom<Message> for Mutation {
    type Error = Message;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        match message {
            Message::SubmitQuestion { session_id, text } => {
                Ok(Mutation::SubmitQuestion { session_id, text })
            }
            Message::Upvote {
                session_id,
                question_id,
            } => Ok(Mutation::Upvote {
                session_id,
                question_id,
            }),
            Message::Reaction {
                session_id,
                question_id,
                emoji,
                action,
            } => Ok(Mutation::React {
                session_id,
                question_id,
                emoji,
                action,
            }),
            Message::Comment {
                session_id,
                question_id,
                text,
            } => Ok(Mutation::Comment {
                session_id,
                question_id,
                text,
            }),
            Message::DeleteQuestion {
                session_id,
                question_id,
            } => Ok(Mutation::DeleteQuestion {
                session_id,
                question_id,
            }),
            Message::ToggleAnswered {
                session_id,
                question_id,
            } => Ok(Mutation::ToggleAnswered {
                session_id,
                question_id,
            }),
            other => Err(other),
        }
    }
}

/// Result of applying a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The store changed
    Applied,
    /// Nothing changed, with the reason
    Ignored(&'static str),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

// ----------------------------------------------------------------------------
// State Mutator
// ----------------------------------------------------------------------------

/// Applies mutations and session operations to a store
pub struct StateMutator {
    clock: IdClock,
    time: Arc<dyn TimeSource>,
}

impl StateMutator {
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self {
            clock: IdClock::new(),
            time,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.time.now()
    }

    /// Apply one mutation, verifying every reference first
    pub fn apply(&mut self, store: &mut SessionStore, mutation: &Mutation) -> Outcome {
        let now = self.time.now();
        let Some(session) = store.get_mut(mutation.session_id()) else {
            debug!(
                "Ignoring {} for unknown session {}",
                mutation.kind(),
                mutation.session_id()
            );
            return Outcome::Ignored("unknown session");
        };

        let outcome = match mutation {
            Mutation::SubmitQuestion { text, .. } => {
                let text = text.trim();
                if text.is_empty() {
                    return Outcome::Ignored("blank question");
                }
                let floor = session.next_question_floor();
                let id = QuestionId(self.clock.next(now, floor));
                session.insert_question(Question::new(id, text, now));
                Outcome::Applied
            }
            Mutation::Upvote { question_id, .. } => {
                with_question(session, *question_id, |q| {
                    q.upvote();
                    Outcome::Applied
                })
            }
            Mutation::React {
                question_id,
                emoji,
                action,
                ..
            } => {
                let emoji = emoji.trim();
                if emoji.is_empty() {
                    return Outcome::Ignored("blank emoji");
                }
                with_question(session, *question_id, |q| match action {
                    ReactionAction::Add => {
                        q.add_reaction(emoji);
                        Outcome::Applied
                    }
                    ReactionAction::Remove if q.remove_reaction(emoji) => Outcome::Applied,
                    ReactionAction::Remove => Outcome::Ignored("reaction absent"),
                })
            }
            Mutation::Comment {
                question_id, text, ..
            } => {
                let text = text.trim();
                if text.is_empty() {
                    return Outcome::Ignored("blank comment");
                }
                let clock = &mut self.clock;
                with_question(session, *question_id, |q| {
                    let id = CommentId(clock.next(now, q.next_comment_floor()));
                    q.add_comment(Comment {
                        id,
                        text: text.to_string(),
                        timestamp: now,
                    });
                    Outcome::Applied
                })
            }
            Mutation::DeleteQuestion { question_id, .. } => {
                match session.remove_question(*question_id) {
                    Some(_) => Outcome::Applied,
                    None => Outcome::Ignored("unknown question"),
                }
            }
            Mutation::ToggleAnswered { question_id, .. } => {
                with_question(session, *question_id, |q| {
                    q.toggle_answered();
                    Outcome::Applied
                })
            }
        };

        if let Outcome::Ignored(reason) = outcome {
            debug!("Ignoring {}: {}", mutation.kind(), reason);
        }
        outcome
    }

    /// Create a session with a fresh id and a unique short code
    pub fn create_session<R: Rng + ?Sized>(
        &mut self,
        store: &mut SessionStore,
        name: &str,
        rng: &mut R,
    ) -> Result<Session, InputError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InputError::EmptySessionName);
        }
        let now = self.time.now();
        let id = store.unique_session_id(now);
        let code: ShortCode = store.unique_short_code(rng);
        let session = Session::new(id, name, Some(code), now);
        store.insert(session.clone());
        Ok(session)
    }

    /// Remove a session; absent ids are a no-op
    pub fn delete_session(&mut self, store: &mut SessionStore, id: &SessionId) -> Outcome {
        match store.remove(id) {
            Some(_) => Outcome::Applied,
            None => Outcome::Ignored("unknown session"),
        }
    }

    /// Clear sessions older than `duration`
    pub fn reset_expired(
        &mut self,
        store: &mut SessionStore,
        duration: core::time::Duration,
    ) -> Outcome {
        if store.reset_expired(self.time.now(), duration).is_empty() {
            Outcome::Ignored("nothing expired")
        } else {
            Outcome::Applied
        }
    }
}

impl std::fmt::Debug for StateMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMutator")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

fn with_question(
    session: &mut Session,
    id: QuestionId,
    apply: impl FnOnce(&mut Question) -> Outcome,
) -> Outcome {
    match session.question_mut(id) {
        Some(question) => apply(question),
        None => Outcome::Ignored("unknown question"),
    }
}

// ----------------------------------------------------------------------------
// Mutation Handler Strategy
// ----------------------------------------------------------------------------

/// Where a locally originated mutation goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Apply to the local store
    Apply,
    /// Send to the Host and wait for its snapshot
    Forward,
}

/// Strategy deciding how local intents reach the store
pub trait MutationHandler: Send + Sync {
    /// Route a mutation given our role and whether the Host link is open
    fn route(&self, role: Role, host_link_open: bool) -> Route;

    /// Whether applied mutations are followed by a broadcast
    fn replicates(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Every mutation is applied locally and never broadcast
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnly;

impl MutationHandler for LocalOnly {
    fn route(&self, _role: Role, _host_link_open: bool) -> Route {
        Route::Apply
    }

    fn replicates(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "local-only"
    }
}

/// Clients forward while their Host link is open; everyone else applies and broadcasts
#[derive(Debug, Clone, Copy, Default)]
pub struct Replicated;

impl MutationHandler for Replicated {
    fn route(&self, role: Role, host_link_open: bool) -> Route {
        if role == Role::Client && host_link_open {
            Route::Forward
        } else {
            Route::Apply
        }
    }

    fn replicates(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "replicated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ManualTimeSource;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup() -> (StateMutator, SessionStore, ManualTimeSource) {
        let time = ManualTimeSource::new_at(Timestamp::new(1_000));
        let mutator = StateMutator::new(Arc::new(time.clone()));
        let mut store = SessionStore::new();
        store.insert(Session::new("s1".into(), "Room", None, Timestamp::new(0)));
        (mutator, store, time)
    }

    fn submit(text: &str) -> Mutation {
        Mutation::SubmitQuestion {
            session_id: "s1".into(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_submit_creates_unique_questions() {
        let (mut mutator, mut store, _) = setup();
        assert!(mutator.apply(&mut store, &submit("  first ")).is_applied());
        assert!(mutator.apply(&mut store, &submit("second")).is_applied());

        let session = store.get(&"s1".into()).unwrap();
        assert_eq!(session.questions.len(), 2);
        assert_eq!(session.questions[0].text, "second");
        assert_eq!(session.questions[1].text, "first");
        assert!(session.questions[0].id > session.questions[1].id);
    }

    #[test]
    fn test_stale_references_are_ignored() {
        let (mut mutator, mut store, _) = setup();
        let before = store.clone();

        let missing_session = Mutation::SubmitQuestion {
            session_id: "nope".into(),
            text: "hello".into(),
        };
        assert_eq!(
            mutator.apply(&mut store, &missing_session),
            Outcome::Ignored("unknown session")
        );

        let missing_question = Mutation::Upvote {
            session_id: "s1".into(),
            question_id: QuestionId(99),
        };
        assert_eq!(
            mutator.apply(&mut store, &missing_question),
            Outcome::Ignored("unknown question")
        );
        assert_eq!(
            mutator.apply(&mut store, &submit("   ")),
            Outcome::Ignored("blank question")
        );
        assert_eq!(store, before);
    }

    #[test]
    fn test_question_lifecycle() {
        let (mut mutator, mut store, time) = setup();
        mutator.apply(&mut store, &submit("q"));
        let qid = store.get(&"s1".into()).unwrap().questions[0].id;

        let upvote = Mutation::Upvote {
            session_id: "s1".into(),
            question_id: qid,
        };
        mutator.apply(&mut store, &upvote);
        mutator.apply(&mut store, &upvote);

        time.advance(core::time::Duration::from_millis(5));
        let comment = Mutation::Comment {
            session_id: "s1".into(),
            question_id: qid,
            text: " nice ".into(),
        };
        assert!(mutator.apply(&mut store, &comment).is_applied());

        let toggle = Mutation::ToggleAnswered {
            session_id: "s1".into(),
            question_id: qid,
        };
        assert!(mutator.apply(&mut store, &toggle).is_applied());

        let q = store.get(&"s1".into()).unwrap().question(qid).unwrap().clone();
        assert_eq!(q.upvotes, 2);
        assert!(q.is_answered);
        assert_eq!(q.comments.len(), 1);
        assert_eq!(q.comments[0].text, "nice");

        let delete = Mutation::DeleteQuestion {
            session_id: "s1".into(),
            question_id: qid,
        };
        assert!(mutator.apply(&mut store, &delete).is_applied());
        assert_eq!(
            mutator.apply(&mut store, &delete),
            Outcome::Ignored("unknown question")
        );
    }

    #[test]
    fn test_reaction_remove_absent_is_noop() {
        let (mut mutator, mut store, _) = setup();
        mutator.apply(&mut store, &submit("q"));
        let qid = store.get(&"s1".into()).unwrap().questions[0].id;
        let before = store.clone();

        let remove = Mutation::React {
            session_id: "s1".into(),
            question_id: qid,
            emoji: "👍".into(),
            action: ReactionAction::Remove,
        };
        assert_eq!(
            mutator.apply(&mut store, &remove),
            Outcome::Ignored("reaction absent")
        );
        assert_eq!(store, before);
    }

    #[test]
    fn test_create_and_delete_session() {
        let (mut mutator, mut store, _) = setup();
        let mut rng = StdRng::seed_from_u64(3);

        assert_eq!(
            mutator.create_session(&mut store, "  ", &mut rng),
            Err(InputError::EmptySessionName)
        );

        let created = mutator.create_session(&mut store, " Sesi 1 ", &mut rng).unwrap();
        assert_eq!(created.name, "Sesi 1");
        assert_eq!(created.id.as_str(), "session-1000");
        assert!(created.short_code.is_some());
        assert!(created.questions.is_empty());

        let again = mutator.create_session(&mut store, "Sesi 2", &mut rng).unwrap();
        assert_ne!(again.id, created.id);
        assert_ne!(again.short_code, created.short_code);

        assert!(mutator.delete_session(&mut store, &created.id).is_applied());
        assert!(!mutator.delete_session(&mut store, &created.id).is_applied());
    }

    #[test]
    fn test_message_conversion() {
        let mutation = Mutation::React {
            session_id: "s1".into(),
            question_id: QuestionId(1),
            emoji: "🔥".into(),
            action: ReactionAction::Add,
        };
        let message = mutation.clone().into_message();
        assert_eq!(message.kind(), "reaction");
        assert_eq!(Mutation::try_from(message), Ok(mutation));
        assert_eq!(Mutation::try_from(Message::Ping), Err(Message::Ping));
    }

    #[test]
    fn test_admin_actions_and_validation() {
        let remove = Mutation::React {
            session_id: "s1".into(),
            question_id: QuestionId(1),
            emoji: "👍".into(),
            action: ReactionAction::Remove,
        };
        assert_eq!(remove.admin_action(), Some("remove reactions"));
        assert_eq!(submit("x").admin_action(), None);
        assert_eq!(submit(" ").validate(), Err(InputError::EmptyQuestion));
    }

    #[test]
    fn test_routing_strategies() {
        assert_eq!(Replicated.route(Role::Client, true), Route::Forward);
        assert_eq!(Replicated.route(Role::Client, false), Route::Apply);
        assert_eq!(Replicated.route(Role::Host, false), Route::Apply);
        assert_eq!(LocalOnly.route(Role::Client, true), Route::Apply);
        assert!(Replicated.replicates());
        assert!(!LocalOnly.replicates());
    }
}
