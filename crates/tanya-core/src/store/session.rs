//! Session, Question and Comment records

use core::time::Duration;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{CommentId, QuestionId, SessionId, ShortCode, Timestamp};

// ----------------------------------------------------------------------------
// Comment
// ----------------------------------------------------------------------------

/// An append-only comment on a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub text: String,
    pub timestamp: Timestamp,
}

// ----------------------------------------------------------------------------
// Question
// ----------------------------------------------------------------------------

/// A participant question with its counters, comments and reactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    #[serde(default)]
    pub upvotes: u32,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub is_answered: bool,
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Emoji to count; entries are never stored with a zero count
    #[serde(default)]
    pub reactions: BTreeMap<String, u32>,
}

impl Question {
    pub fn new(id: QuestionId, text: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id,
            text: text.into(),
            upvotes: 0,
            timestamp,
            is_answered: false,
            comments: Vec::new(),
            reactions: BTreeMap::new(),
        }
    }

    pub fn upvote(&mut self) {
        self.upvotes = self.upvotes.saturating_add(1);
    }

    pub fn toggle_answered(&mut self) {
        self.is_answered = !self.is_answered;
    }

    pub fn add_reaction(&mut self, emoji: &str) {
        let count = self.reactions.entry(emoji.to_string()).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Clear an emoji entirely; returns false when there was nothing to clear
    pub fn remove_reaction(&mut self, emoji: &str) -> bool {
        self.reactions.remove(emoji).is_some()
    }

    pub fn reaction_count(&self, emoji: &str) -> u32 {
        self.reactions.get(emoji).copied().unwrap_or(0)
    }

    pub fn add_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }

    /// Smallest comment id that does not collide with existing comments
    pub fn next_comment_floor(&self) -> u64 {
        self.comments.iter().map(|c| c.id.0.saturating_add(1)).max().unwrap_or(0)
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// A named, time-boxed collection of questions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_code: Option<ShortCode>,
    pub name: String,
    /// Newest first
    #[serde(default)]
    pub questions: Vec<Question>,
    pub start_time: Timestamp,
}

impl Session {
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        short_code: Option<ShortCode>,
        start_time: Timestamp,
    ) -> Self {
        Self {
            id,
            short_code,
            name: name.into(),
            questions: Vec::new(),
            start_time,
        }
    }

    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn question_mut(&mut self, id: QuestionId) -> Option<&mut Question> {
        self.questions.iter_mut().find(|q| q.id == id)
    }

    /// Insert at the front, keeping newest-first order
    pub fn insert_question(&mut self, question: Question) {
        self.questions.insert(0, question);
    }

    pub fn remove_question(&mut self, id: QuestionId) -> Option<Question> {
        let index = self.questions.iter().position(|q| q.id == id)?;
        Some(self.questions.remove(index))
    }

    /// Smallest question id that does not collide with existing questions
    pub fn next_question_floor(&self) -> u64 {
        self.questions.iter().map(|q| q.id.0.saturating_add(1)).max().unwrap_or(0)
    }

    /// Questions ordered for the presenter view: most upvoted first, ties keep store order
    pub fn ranked_questions(&self) -> Vec<&Question> {
        let mut ranked: Vec<&Question> = self.questions.iter().collect();
        ranked.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));
        ranked
    }

    pub fn is_expired(&self, now: Timestamp, duration: Duration) -> bool {
        now.duration_since(self.start_time) > duration
    }

    /// Clear all questions and restart the session clock
    pub fn reset(&mut self, now: Timestamp) {
        self.questions.clear();
        self.start_time = now;
    }

    /// Whether the code or a case-insensitive fragment of the name matches
    pub fn matches_code(&self, code: &ShortCode) -> bool {
        self.short_code.as_ref() == Some(code)
            || self
                .name
                .to_lowercase()
                .contains(&code.as_str().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: u64, upvotes: u32) -> Question {
        let mut q = Question::new(QuestionId(id), format!("q{}", id), Timestamp::new(id));
        q.upvotes = upvotes;
        q
    }

    #[test]
    fn test_reactions_never_negative() {
        let mut q = question(1, 0);
        assert!(!q.remove_reaction("👍"));
        assert!(q.reactions.is_empty());

        q.add_reaction("👍");
        q.add_reaction("👍");
        assert_eq!(q.reaction_count("👍"), 2);

        assert!(q.remove_reaction("👍"));
        assert_eq!(q.reaction_count("👍"), 0);
        assert!(!q.reactions.contains_key("👍"));
    }

    #[test]
    fn test_ranked_questions_is_stable() {
        let mut session = Session::new("s1".into(), "Room", None, Timestamp::new(0));
        session.insert_question(question(1, 2));
        session.insert_question(question(2, 5));
        session.insert_question(question(3, 2));

        let ranked: Vec<u64> = session.ranked_questions().iter().map(|q| q.id.0).collect();
        assert_eq!(ranked, vec![2, 3, 1]);
    }

    #[test]
    fn test_remove_question() {
        let mut session = Session::new("s1".into(), "Room", None, Timestamp::new(0));
        session.insert_question(question(1, 0));
        assert!(session.remove_question(QuestionId(9)).is_none());
        assert!(session.remove_question(QuestionId(1)).is_some());
        assert!(session.questions.is_empty());
    }

    #[test]
    fn test_expiry_and_reset() {
        let day = Duration::from_secs(24 * 60 * 60);
        let mut session = Session::new("s1".into(), "Room", None, Timestamp::new(0));
        session.insert_question(question(1, 0));

        assert!(!session.is_expired(Timestamp::new(day.as_millis() as u64), day));
        let later = Timestamp::new(day.as_millis() as u64 + 1);
        assert!(session.is_expired(later, day));

        session.reset(later);
        assert!(session.questions.is_empty());
        assert_eq!(session.start_time, later);
    }

    #[test]
    fn test_id_floors_saturate_at_max() {
        let mut q = question(u64::MAX, 0);
        q.comments.push(Comment {
            id: CommentId(u64::MAX),
            text: "last".into(),
            timestamp: Timestamp::new(0),
        });
        assert_eq!(q.next_comment_floor(), u64::MAX);

        let mut session = Session::new("s1".into(), "Room", None, Timestamp::new(0));
        session.insert_question(q);
        assert_eq!(session.next_question_floor(), u64::MAX);
    }

    #[test]
    fn test_matches_code() {
        let session = Session::new(
            "s1".into(),
            "Weekly Town Hall",
            Some(ShortCode::normalize("abc123").unwrap()),
            Timestamp::new(0),
        );
        assert!(session.matches_code(&ShortCode::normalize("ABC123").unwrap()));
        assert!(session.matches_code(&ShortCode::normalize("town").unwrap()));
        assert!(!session.matches_code(&ShortCode::normalize("zzz").unwrap()));
    }
}
