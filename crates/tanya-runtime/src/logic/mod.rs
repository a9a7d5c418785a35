//! Replication Logic Module
//!
//! The replication logic is split into focused components:
//! - `state`: the [`ReplicationContext`] owned by the loop
//! - `handlers`: protocol message and intent handlers
//! - `task`: the [`ReplicationTask`] event loop and its background work
//!
//! All state is serialized through the one loop task. The Host applies
//! mutations in the order it receives them, which makes its store the single
//! linearization point for every connected Client.

pub mod handlers;
pub mod state;
pub mod task;

pub use handlers::JoinPlan;
pub use state::{Collaborators, ReplicationContext};
pub use task::{Launch, ReplicationTask};
