//! Stateful managers for the Tanya runtime

pub mod connection;

pub use connection::{ConnectionManager, ConnectionStats};
