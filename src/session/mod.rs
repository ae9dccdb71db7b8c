//! Conversation sessions and their store.

pub mod model;
pub mod store;

pub use model::{ConversationSession, Message, Role, RoutingState};
pub use store::{ConversationStore, SessionHandle, spawn_sweep_task};
