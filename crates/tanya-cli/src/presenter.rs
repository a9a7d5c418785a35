//! Terminal rendering of the session store and notices

use std::fmt::Write as _;
use std::io::Write;
use std::sync::Mutex;

use tanya_core::{Notice, Presenter, Question, SessionId, SessionStore};
use tracing::warn;

/// Plain-text presenter writing to stdout or any other sink
pub struct TerminalPresenter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl TerminalPresenter {
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn emit(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
            warn!("Failed to write to terminal: {}", e);
        }
    }
}

impl std::fmt::Debug for TerminalPresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalPresenter").finish_non_exhaustive()
    }
}

impl Presenter for TerminalPresenter {
    fn render_all(&self, store: &SessionStore, active: Option<&SessionId>) {
        self.emit(&render_store(store, active));
    }

    fn notify(&self, notice: Notice) {
        self.emit(&format!("* {}\n", describe(&notice)));
    }
}

// ----------------------------------------------------------------------------
// Formatting
// ----------------------------------------------------------------------------

/// Active session header followed by its questions, best first
pub fn render_store(store: &SessionStore, active: Option<&SessionId>) -> String {
    let mut text = String::new();
    let Some(session) = active.and_then(|id| store.get(id)) else {
        let _ = writeln!(text, "== no active session ({} stored) ==", store.len());
        return text;
    };

    let code = session
        .short_code
        .as_ref()
        .map(|c| format!(" [{}]", c))
        .unwrap_or_default();
    let _ = writeln!(text, "== {}{} ({}) ==", session.name, code, session.id);

    let questions = session.ranked_questions();
    if questions.is_empty() {
        let _ = writeln!(text, "   no questions yet");
    }
    for question in questions {
        let _ = writeln!(text, "{}", question_line(question));
        for comment in &question.comments {
            let _ = writeln!(text, "      > {}", comment.text);
        }
    }
    text
}

fn question_line(question: &Question) -> String {
    let mark = if question.is_answered { "x" } else { " " };
    let mut line = format!(
        "[{}] #{} {:>3}^ {}",
        mark, question.id, question.upvotes, question.text
    );
    if !question.reactions.is_empty() {
        let reactions: Vec<String> = question
            .reactions
            .iter()
            .map(|(emoji, count)| format!("{}{}", emoji, count))
            .collect();
        let _ = write!(line, "  {}", reactions.join(" "));
    }
    line
}

/// One-line description of a notice
pub fn describe(notice: &Notice) -> String {
    match notice {
        Notice::Hosting { peer } => format!("Hosting as {}", peer),
        Notice::Offline { reason } => format!("Offline, running local-only: {}", reason),
        Notice::Connected { host } => format!("Connected to host {}", host),
        Notice::Disconnected { host } => format!("Lost connection to host {}", host),
        Notice::ConnectionFailed { host, reason } => {
            format!("Could not reach host {}: {}", host, reason)
        }
        Notice::Reconnecting { host, attempt } => {
            format!("Reconnecting to {} (attempt {})", host, attempt)
        }
        Notice::SessionNotFound { code } => format!("No session found for code {}", code),
        Notice::SessionSwitched { session } => format!("Switched to session {}", session),
        Notice::SessionCreated { session, code } => {
            format!("Created session {} with code {}", session, code)
        }
        Notice::Rejected { reason } => format!("Rejected: {}", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tanya_core::{PeerId, QuestionId, Session, ShortCode, Timestamp};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn sample_store() -> SessionStore {
        let mut session = Session::new(
            SessionId::from("s1"),
            "Keynote",
            Some(ShortCode::normalize("abc123").unwrap()),
            Timestamp::new(0),
        );
        let mut low = Question::new(QuestionId(1), "First", Timestamp::new(1));
        low.toggle_answered();
        let mut high = Question::new(QuestionId(2), "Second", Timestamp::new(2));
        high.upvote();
        high.upvote();
        high.add_reaction("🎉");
        session.insert_question(low);
        session.insert_question(high);
        [session].into_iter().collect()
    }

    #[test]
    fn test_render_ranks_questions() {
        let store = sample_store();
        let text = render_store(&store, Some(&SessionId::from("s1")));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "== Keynote [ABC123] (s1) ==");
        assert!(lines[1].contains("#2") && lines[1].contains("Second") && lines[1].contains("🎉1"));
        assert!(lines[2].starts_with("[x] #1"));
    }

    #[test]
    fn test_render_without_active_session() {
        let text = render_store(&sample_store(), Some(&SessionId::from("missing")));
        assert_eq!(text, "== no active session (1 stored) ==\n");
    }

    #[test]
    fn test_presenter_writes_notices() {
        let buffer = SharedBuffer::default();
        let presenter = TerminalPresenter::with_writer(Box::new(buffer.clone()));
        presenter.notify(Notice::Connected {
            host: PeerId::new("ws://127.0.0.1:8765"),
        });
        presenter.render_all(&SessionStore::new(), None);
        assert_eq!(
            buffer.contents(),
            "* Connected to host ws://127.0.0.1:8765\n== no active session (0 stored) ==\n"
        );
    }
}
