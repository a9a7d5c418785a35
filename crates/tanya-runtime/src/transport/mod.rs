//! Transport adapters

pub mod memory;
pub mod websocket;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use websocket::WebSocketTransport;
