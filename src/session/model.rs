//! Conversation session model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in a conversation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Worker that produced an assistant message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            worker: None,
        }
    }

    pub fn assistant(content: impl Into<String>, worker: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            worker: Some(worker.into()),
        }
    }
}

/// Routing state of a conversation. `Bound` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingState {
    Unbound,
    Bound,
}

/// State of one conversation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSession {
    pub id: String,
    messages: Vec<Message>,
    bound_worker: Option<String>,
    context: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl ConversationSession {
    /// New, unbound session with an empty log.
    pub fn new(id: impl Into<String>, context: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            bound_worker: None,
            context,
            created_at: now,
            last_active: now,
        }
    }

    pub fn state(&self) -> RoutingState {
        if self.bound_worker.is_some() {
            RoutingState::Bound
        } else {
            RoutingState::Unbound
        }
    }

    pub fn bound_worker(&self) -> Option<&str> {
        self.bound_worker.as_deref()
    }

    /// Bind the session if it is still unbound.
    ///
    /// `choose` only runs for an unbound session. Returns the bound worker and
    /// whether this call performed the binding.
    pub fn bind_with(&mut self, choose: impl FnOnce(&Self) -> String) -> (String, bool) {
        if let Some(worker) = &self.bound_worker {
            return (worker.clone(), false);
        }
        let worker = choose(self);
        self.bound_worker = Some(worker.clone());
        (worker, true)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Later keys overwrite earlier ones.
    pub fn merge_context(&mut self, context: Map<String, Value>) {
        self.context.extend(context);
    }

    pub fn push(&mut self, message: Message) {
        self.last_active = message.timestamp;
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
