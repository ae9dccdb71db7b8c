//! Sticky conversation routing.
//!
//! A conversation is routed once: the first message is classified and the
//! chosen worker is bound for the rest of the session. Later messages reuse
//! the bound worker without reclassifying, and a failed call never unbinds it.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::classifier::Classifier;
use crate::capabilities::CapabilityDirectory;
use crate::error::GatewayError;
use crate::gateway::InvocationRequest;
use crate::session::{ConversationSession, ConversationStore, Message};

/// Result of routing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingOutcome {
    Success {
        conversation_id: String,
        worker: String,
        output: String,
    },
    Failure {
        conversation_id: String,
        /// Bound worker, if binding happened before the failure.
        worker: Option<String>,
        error: GatewayError,
    },
}

impl RoutingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            Self::Success {
                conversation_id, ..
            }
            | Self::Failure {
                conversation_id, ..
            } => conversation_id,
        }
    }

    pub fn worker(&self) -> Option<&str> {
        match self {
            Self::Success { worker, .. } => Some(worker),
            Self::Failure { worker, .. } => worker.as_deref(),
        }
    }
}

/// Routes conversation messages to capabilities.
pub struct ConversationRouter {
    store: Arc<ConversationStore>,
    directory: Arc<CapabilityDirectory>,
    classifier: Arc<Classifier>,
}

impl ConversationRouter {
    pub fn new(
        store: Arc<ConversationStore>,
        directory: Arc<CapabilityDirectory>,
        classifier: Arc<Classifier>,
    ) -> Self {
        Self {
            store,
            directory,
            classifier,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Routing table used for unbound conversations.
    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    /// Worker for this session, classifying and binding it if still unbound.
    pub fn resolve_worker(&self, session: &mut ConversationSession, message: &str) -> String {
        let (worker, newly_bound) = session.bind_with(|s| {
            self.classifier
                .classify(message, s.context())
                .to_string()
        });
        if newly_bound {
            info!(conversation_id = %session.id, worker = %worker, "Conversation bound to worker");
        }
        worker
    }

    pub async fn route(
        &self,
        conversation_id: &str,
        message: &str,
        context: Map<String, Value>,
    ) -> RoutingOutcome {
        self.route_with_cancel(conversation_id, message, context, &CancellationToken::new())
            .await
    }

    /// Route one message.
    ///
    /// The session lock is held for the whole call, so messages in the same
    /// conversation are appended strictly in arrival order. If this future is
    /// dropped mid-call the worker is killed and nothing is appended for it.
    pub async fn route_with_cancel(
        &self,
        conversation_id: &str,
        message: &str,
        context: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> RoutingOutcome {
        let (handle, created) = self.store.get_or_create(conversation_id, context.clone());
        let mut session = handle.lock().await;
        if !created {
            session.merge_context(context);
        }

        session.push(Message::user(message));
        let worker = self.resolve_worker(&mut session, message);

        let request = match build_request(&session, &worker, message) {
            Ok(request) => request,
            Err(error) => {
                warn!(conversation_id = %conversation_id, error = %error, "Failed to build payload");
                return RoutingOutcome::Failure {
                    conversation_id: conversation_id.to_string(),
                    worker: Some(worker),
                    error,
                };
            }
        };

        match self.directory.dispatch(request, cancel).await {
            Ok(result) => {
                session.push(Message::assistant(result.output.clone(), worker.clone()));
                info!(
                    conversation_id = %conversation_id,
                    worker = %worker,
                    messages = session.len(),
                    "Conversation turn completed"
                );
                RoutingOutcome::Success {
                    conversation_id: conversation_id.to_string(),
                    worker,
                    output: result.output,
                }
            }
            Err(error) => {
                warn!(
                    conversation_id = %conversation_id,
                    worker = %worker,
                    kind = error.kind(),
                    error = %error,
                    "Conversation turn failed"
                );
                RoutingOutcome::Failure {
                    conversation_id: conversation_id.to_string(),
                    worker: Some(worker),
                    error,
                }
            }
        }
    }
}

/// `{ messages, message, context }` for the bound worker.
fn build_request(
    session: &ConversationSession,
    worker: &str,
    message: &str,
) -> Result<InvocationRequest, GatewayError> {
    let messages = serde_json::to_value(session.messages())
        .map_err(|e| GatewayError::Internal(format!("failed to encode message log: {e}")))?;

    let mut payload = Map::new();
    payload.insert("messages".to_string(), messages);
    payload.insert("message".to_string(), json!(message));
    Ok(InvocationRequest::new(worker, payload).with_context(session.context().clone()))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::gateway::ProcessGateway;
    use crate::registry::{WorkerDescriptor, WorkerRegistry};
    use crate::session::Role;

    fn sh_worker(id: &str, script: &str) -> WorkerDescriptor {
        WorkerDescriptor::new(id, "sh", vec!["-c".into(), script.into(), id.into()])
    }

    struct Harness {
        router: ConversationRouter,
        store: Arc<ConversationStore>,
        gateway: Arc<ProcessGateway>,
    }

    fn harness(workers: Vec<WorkerDescriptor>) -> Harness {
        let registry = Arc::new(WorkerRegistry::from_descriptors(workers).unwrap());
        let gateway =
            Arc::new(ProcessGateway::new(registry, 4).with_timeout(Duration::from_secs(5)));
        let classifier = Arc::new(Classifier::default_rules());
        let directory = Arc::new(CapabilityDirectory::for_workers(
            classifier.worker_ids(),
            Arc::clone(&gateway),
        ));
        let store = ConversationStore::new(100, Duration::from_secs(60));
        Harness {
            router: ConversationRouter::new(Arc::clone(&store), directory, classifier),
            store,
            gateway,
        }
    }

    /// Every classifier target answers with `<id>: <message>`.
    fn echo_workers() -> Vec<WorkerDescriptor> {
        Classifier::default_rules()
            .worker_ids()
            .into_iter()
            .map(|id| {
                sh_worker(
                    id,
                    &format!(
                        "printf '%s' \"$2\" | sed -n 's/.*\"message\":\"\\([^\"]*\\)\".*/{id}: \\1/p'"
                    ),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn review_then_follow_up_sticks_to_code_worker() {
        let h = harness(echo_workers());

        let first = h
            .router
            .route("c1", "please review this function", Map::new())
            .await;
        assert_eq!(
            first,
            RoutingOutcome::Success {
                conversation_id: "c1".into(),
                worker: "claude-code-mcp".into(),
                output: "claude-code-mcp: please review this function\n".into(),
            }
        );

        let session = h.store.snapshot("c1").await.unwrap();
        assert_eq!(session.len(), 2);
        assert_eq!(session.messages()[0].role, Role::User);
        assert_eq!(session.messages()[1].role, Role::Assistant);
        assert_eq!(session.messages()[1].worker.as_deref(), Some("claude-code-mcp"));

        let second = h
            .router
            .route("c1", "what about performance?", Map::new())
            .await;
        assert_eq!(second.worker(), Some("claude-code-mcp"));
        assert!(second.is_success());
        assert_eq!(h.store.snapshot("c1").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn binding_survives_messages_from_other_categories() {
        let h = harness(echo_workers());

        h.router.route("c2", "show my github repos", Map::new()).await;
        for msg in ["write some code", "research this", "think harder"] {
            let outcome = h.router.route("c2", msg, Map::new()).await;
            assert_eq!(outcome.worker(), Some("github"), "message: {msg}");
        }
    }

    #[tokio::test]
    async fn failed_call_keeps_binding_and_skips_assistant_message() {
        let h = harness(vec![sh_worker("github", "echo 'rate limited' >&2; exit 2")]);

        let outcome = h.router.route("c3", "list github issues", Map::new()).await;
        match outcome {
            RoutingOutcome::Failure {
                conversation_id,
                worker,
                error,
            } => {
                assert_eq!(conversation_id, "c3");
                assert_eq!(worker.as_deref(), Some("github"));
                assert_eq!(
                    error,
                    GatewayError::Process {
                        worker: "github".into(),
                        code: 2,
                        stderr: "rate limited\n".into(),
                    }
                );
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let session = h.store.snapshot("c3").await.unwrap();
        assert_eq!(session.bound_worker(), Some("github"));
        assert_eq!(session.len(), 1);
        assert_eq!(session.messages()[0].role, Role::User);
    }

    #[tokio::test]
    async fn unconfigured_worker_fails_without_spawning() {
        let h = harness(vec![]);

        let outcome = h.router.route("c4", "hello", Map::new()).await;
        assert!(matches!(
            outcome,
            RoutingOutcome::Failure {
                error: GatewayError::ConfigNotFound { .. },
                ..
            }
        ));
        assert_eq!(h.gateway.spawn_count(), 0);
    }

    #[tokio::test]
    async fn context_domain_routes_and_reaches_worker() {
        let h = harness(vec![sh_worker("react-mcp", "printf '%s' \"$2\"")]);
        let context = json!({"domain": "react", "project": "dashboard"})
            .as_object()
            .cloned()
            .unwrap();

        let outcome = h.router.route("c5", "hello", context).await;
        let RoutingOutcome::Success { output, worker, .. } = outcome else {
            panic!("expected success");
        };
        assert_eq!(worker, "react-mcp");

        let sent: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(sent["message"], "hello");
        assert_eq!(sent["context"]["project"], "dashboard");
        assert_eq!(sent["messages"].as_array().unwrap().len(), 1);
        assert_eq!(sent["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn same_conversation_requests_are_serialized() {
        let h = harness(vec![sh_worker(
            "server-sequential-thinking",
            "sleep 0.2; echo ok",
        )]);

        let (a, b) = tokio::join!(
            h.router.route("same", "first", Map::new()),
            h.router.route("same", "second", Map::new())
        );
        assert!(a.is_success() && b.is_success());

        let session = h.store.snapshot("same").await.unwrap();
        let roles: Vec<Role> = session.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn distinct_conversations_run_in_parallel() {
        let h = harness(vec![
            sh_worker("github", "sleep 1; echo gh"),
            sh_worker("react-mcp", "sleep 1; echo react"),
        ]);

        let started = Instant::now();
        let (a, b) = tokio::join!(
            h.router.route("left", "github stars", Map::new()),
            h.router.route("right", "react hooks", Map::new())
        );
        assert!(started.elapsed() < Duration::from_millis(1800));

        assert_eq!(a.worker(), Some("github"));
        assert_eq!(b.worker(), Some("react-mcp"));

        let left = h.store.snapshot("left").await.unwrap();
        let right = h.store.snapshot("right").await.unwrap();
        assert_eq!(left.messages()[1].content, "gh\n");
        assert_eq!(right.messages()[1].content, "react\n");
        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_turn_appends_nothing_for_the_worker() {
        let h = harness(vec![sh_worker("github", "sleep 10")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = h
            .router
            .route_with_cancel("c6", "github please", Map::new(), &cancel)
            .await;
        assert!(matches!(
            outcome,
            RoutingOutcome::Failure {
                error: GatewayError::Cancelled { .. },
                ..
            }
        ));

        let session = h.store.snapshot("c6").await.unwrap();
        assert_eq!(session.len(), 1);
        assert_eq!(session.bound_worker(), Some("github"));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropped_turn_kills_worker_and_appends_nothing() {
        use crate::gateway::testing::{read_pid, wait_until_gone};

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("worker.pid");
        let h = harness(vec![sh_worker(
            "github",
            &format!("echo $$ > '{}'; exec sleep 30", pid_file.display()),
        )]);

        let turn = h.router.route("c7", "github please", Map::new());
        assert!(tokio::time::timeout(Duration::from_millis(300), turn).await.is_err());

        let worker = read_pid(&pid_file).await;
        assert!(wait_until_gone(worker).await, "worker {worker} outlived the dropped turn");

        let session = h.store.snapshot("c7").await.unwrap();
        assert_eq!(session.len(), 1);
        assert_eq!(session.messages()[0].role, Role::User);
        assert_eq!(session.bound_worker(), Some("github"));
    }
}
