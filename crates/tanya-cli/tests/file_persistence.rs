//! Sessions written through the file store survive a restart

use std::io::Write;
use std::sync::{Arc, Mutex};

use tanya_cli::{FileKeyValueStore, TerminalPresenter};
use tanya_core::{AdminFlag, SessionId, TanyaConfig};
use tanya_runtime::{IntentOutcome, MemoryNetwork, RuntimeBuilder, RuntimeHandle};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

async fn start(dir: &std::path::Path, out: Captured) -> RuntimeHandle {
    let network = MemoryNetwork::new();
    let handle = RuntimeBuilder::new(Arc::new(network.transport_with_id("stage")))
        .with_config(TanyaConfig::testing())
        .with_storage(Arc::new(FileKeyValueStore::open(dir).unwrap()))
        .with_presenter(Arc::new(TerminalPresenter::with_writer(Box::new(out))))
        .with_admin_gate(Arc::new(AdminFlag::new(true)))
        .build_and_start()
        .await
        .unwrap();
    handle.status().await.unwrap();
    handle
}

#[tokio::test]
async fn test_questions_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let out = Captured::default();

    let mut first = start(dir.path(), out.clone()).await;
    assert_eq!(first.ask("Will this persist?").await.unwrap(), IntentOutcome::Applied);
    first.shutdown().await.unwrap();
    assert!(dir.path().join("qa_sessions.json").exists());

    let mut second = start(dir.path(), out.clone()).await;
    let (store, active) = second.snapshot().await.unwrap();
    assert_eq!(active, Some(SessionId::default_session()));
    let session = store.get(&SessionId::default_session()).unwrap();
    assert_eq!(session.questions.len(), 1);
    assert_eq!(session.questions[0].text, "Will this persist?");
    second.shutdown().await.unwrap();

    let text = out.text();
    assert!(text.contains("* Hosting as stage"));
    assert!(text.contains("Will this persist?"));
}

#[tokio::test]
async fn test_created_sessions_are_rendered_with_their_code() {
    let dir = tempfile::tempdir().unwrap();
    let out = Captured::default();
    let mut handle = start(dir.path(), out.clone()).await;

    let session = match handle.create_session("Town Hall").await.unwrap() {
        IntentOutcome::SessionCreated(session) => session,
        other => panic!("unexpected outcome {:?}", other),
    };
    let code = session.short_code.clone().unwrap();
    handle.shutdown().await.unwrap();

    let text = out.text();
    assert!(text.contains(&format!("== Town Hall [{}] ({}) ==", code, session.id)));
    assert!(text.contains(&format!("Created session {} with code {}", session.id, code)));
}
