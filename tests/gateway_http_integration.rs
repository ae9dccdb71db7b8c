//! Integration tests for the gateway REST surface.
//!
//! Each test writes a worker configuration of `sh` scripts to a temp file,
//! spins up an Axum server on a random port, and drives it with reqwest.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use mcp_gateway::api::{AppState, gateway_routes};
use mcp_gateway::config::GatewayConfig;
use mcp_gateway::registry::WorkerRegistry;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Worker configuration used by every test.
///
/// `$1 $2` of each script are `--payload <json>`.
fn worker_config() -> Value {
    json!({
        "claude-code-mcp": {
            "command": "sh",
            "args": ["-c", "printf 'code review: '; sleep 0.05; printf 'looks good'", "claude-code-mcp"]
        },
        "github": {
            "command": "sh",
            "args": ["-c", "printf '%s' \"$2\"", "github"],
            "credential": { "param": "token", "value": "ghp_integration" },
            "description": "GitHub test double"
        },
        "fetch-mcp": {
            "command": "sh",
            "args": ["-c", "echo 'upstream unavailable' >&2; exit 2", "fetch-mcp"]
        },
        "smart-thinking": {
            "command": "sh",
            "args": ["-c", "sleep 10", "smart-thinking"]
        }
    })
}

/// Start an Axum server on a random port, return (port, state).
async fn start_server() -> (u16, AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mcp-config.json");
    std::fs::write(&path, worker_config().to_string()).unwrap();

    let config = GatewayConfig {
        workers_path: path.clone(),
        invocation_timeout: Duration::from_millis(500),
        ..GatewayConfig::default()
    };
    let registry = WorkerRegistry::load(&path).unwrap();
    let state = AppState::new(registry, &config);
    let app = gateway_routes(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, state, dir)
}

async fn post_json(port: u16, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}{path}"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

// ── Conversation Tests ──────────────────────────────────────────────

#[tokio::test]
async fn conversation_binds_and_sticks_to_code_worker() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state, _dir) = start_server().await;

        let (status, first) = post_json(
            port,
            "/api/conversation",
            json!({"conversationId": "c1", "message": "please review this function"}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(first["success"], true);
        assert_eq!(first["conversationId"], "c1");
        assert_eq!(first["mcpUsed"], "claude-code-mcp");
        assert_eq!(first["result"], "code review: looks good");

        let (_, second) = post_json(
            port,
            "/api/conversation",
            json!({"conversationId": "c1", "message": "what about performance?"}),
        )
        .await;
        assert_eq!(second["mcpUsed"], "claude-code-mcp");

        let view: Value = reqwest::get(format!("http://127.0.0.1:{port}/api/conversation/c1"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(view["state"], "bound");
        assert_eq!(view["boundWorker"], "claude-code-mcp");
        let messages = view["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["worker"], "claude-code-mcp");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn worker_failure_reports_exit_code_and_keeps_binding() {
    timeout(TEST_TIMEOUT, async {
        let (port, state, _dir) = start_server().await;

        let (status, body) = post_json(
            port,
            "/api/conversation",
            json!({"conversationId": "c2", "message": "fetch the changelog"}),
        )
        .await;
        assert_eq!(status, 502);
        assert_eq!(body["success"], false);
        assert_eq!(body["conversationId"], "c2");
        let error = body["error"].as_str().unwrap();
        assert!(error.contains("code 2"), "error: {error}");
        assert!(error.contains("upstream unavailable"), "error: {error}");

        let session = state.store().snapshot("c2").await.unwrap();
        assert_eq!(session.bound_worker(), Some("fetch-mcp"));
        assert_eq!(session.messages().len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn hung_worker_times_out() {
    timeout(TEST_TIMEOUT, async {
        let (port, state, _dir) = start_server().await;

        let (status, body) = post_json(
            port,
            "/api/conversation",
            json!({"conversationId": "c3", "message": "think about it"}),
        )
        .await;
        assert_eq!(status, 504);
        assert_eq!(body["success"], false);

        let session = state.store().snapshot("c3").await.unwrap();
        assert_eq!(session.messages().len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_conversation_view_is_not_found() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state, _dir) = start_server().await;

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/api/conversation/nope"))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    })
    .await
    .expect("test timed out");
}

// ── Direct Invocation Tests ─────────────────────────────────────────

#[tokio::test]
async fn direct_invoke_merges_credential() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state, _dir) = start_server().await;

        let (status, body) = post_json(
            port,
            "/api/invoke",
            json!({"workerId": "github", "payload": {"repo": "acme/widgets"}}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["success"], true);

        let sent: Value = serde_json::from_str(body["output"].as_str().unwrap()).unwrap();
        assert_eq!(sent["repo"], "acme/widgets");
        assert_eq!(sent["token"], "ghp_integration");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn direct_invoke_without_worker_id_is_bad_request() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state, _dir) = start_server().await;

        let (status, body) = post_json(port, "/api/invoke", json!({"payload": {}})).await;
        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("workerId"));
    })
    .await
    .expect("test timed out");
}

// ── Listing / Health ────────────────────────────────────────────────

#[tokio::test]
async fn capabilities_lists_every_routable_worker() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state, _dir) = start_server().await;

        let body: Value = reqwest::get(format!("http://127.0.0.1:{port}/api/capabilities"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let servers: Vec<&str> = body["servers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(servers.len(), 8);
        assert!(servers.contains(&"github"));
        assert!(servers.contains(&"server-sequential-thinking"));

        let github = body["capabilities"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["id"] == "github")
            .unwrap();
        assert_eq!(github["description"], "GitHub test double");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let (port, _state, _dir) = start_server().await;

        let body: Value = reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "healthy");
    })
    .await
    .expect("test timed out");
}
