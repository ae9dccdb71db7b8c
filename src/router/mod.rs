//! Conversation routing: classification plus sticky worker binding.

pub mod classifier;
pub mod conversation;

pub use classifier::{Classifier, DEFAULT_WORKER, RoutingRule};
pub use conversation::{ConversationRouter, RoutingOutcome};
