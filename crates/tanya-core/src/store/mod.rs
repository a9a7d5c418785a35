//! In-memory session store and its records

pub mod session;
pub mod session_store;

pub use session::{Comment, Question, Session};
pub use session_store::SessionStore;
