//! Wire protocol: data-channel messages and join links

pub mod link;
pub mod message;

pub use link::JoinLink;
pub use message::{Message, ReactionAction};
