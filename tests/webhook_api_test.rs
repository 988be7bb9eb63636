// Integration tests for POST /webhook and GET /health, /state

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use parley::api::{create_router, AppState};
use parley::backend::{
    BackendError, ContactPerson, Conversation, ConversationBackend, NewConversation, SendOutcome,
};
use parley::bridge::{
    ConversationBridge, InMemoryConversationStore, InboundMessage, ReplyTarget, ThreadKey,
};
use parley::config::SlackConfig;
use parley::credentials::CredentialManager;
use parley::slack::SlackClient;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const API_KEY: &str = "hook-key";

/// Backend that opens numbered conversations and accepts every message
#[derive(Default)]
struct AcceptingBackend {
    created: AtomicUsize,
}

#[async_trait]
impl ConversationBackend for AcceptingBackend {
    async fn create_conversation(
        &self,
        _request: &NewConversation,
    ) -> Result<Conversation, BackendError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Conversation {
            id: format!("conv-{}", n),
            metadata: Map::new(),
        })
    }

    async fn send_message(
        &self,
        _conversation_id: &str,
        _text: &str,
    ) -> Result<SendOutcome, BackendError> {
        Ok(SendOutcome::Ongoing(json!({})))
    }
}

#[derive(Default)]
struct RecordingReply {
    posted: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl ReplyTarget for RecordingReply {
    async fn post_reply(&self, text: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("not_in_channel");
        }
        self.posted.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

struct TestApp {
    router: Router,
    bridge: Arc<ConversationBridge>,
}

fn create_test_app() -> TestApp {
    let http = reqwest::Client::new();
    let bridge = Arc::new(ConversationBridge::new(
        Arc::new(AcceptingBackend::default()),
        Arc::new(InMemoryConversationStore::new()),
        "tp-1".to_string(),
        None,
    ));
    let credentials = Arc::new(CredentialManager::new(
        http.clone(),
        "http://127.0.0.1:1/oauth/token".to_string(),
        "id".to_string(),
        "secret".to_string(),
    ));
    let slack = Arc::new(SlackClient::new(
        http,
        &SlackConfig {
            bot_token: "xoxb-test".to_string(),
            signing_secret: None,
            bot_user_id: None,
            api_base: "http://127.0.0.1:1".to_string(),
            default_contact_email: "unknown@example.com".to_string(),
        },
    ));

    let state = Arc::new(AppState {
        bridge: Arc::clone(&bridge),
        credentials,
        slack,
        webhook_api_key: API_KEY.to_string(),
        signing_secret: None,
    });

    TestApp {
        router: create_router(state),
        bridge,
    }
}

/// Open a conversation for `thread` whose replies land in `reply`
async fn open_conversation(bridge: &ConversationBridge, thread: &str, reply: Arc<RecordingReply>) {
    bridge
        .handle_inbound(InboundMessage {
            thread: ThreadKey::new(thread),
            user_id: "U123".to_string(),
            text: "hello".to_string(),
            subtype: None,
            bot_id: None,
            contact: ContactPerson {
                name: None,
                email: "ada@example.com".to_string(),
            },
            reply,
        })
        .await
        .unwrap();
}

fn webhook_request(api_key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("X-Api-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Missing X-Api-Key is rejected with 401.
#[tokio::test]
async fn test_webhook_requires_api_key() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(webhook_request(
            None,
            json!({"conversation_id": "conv-1", "payload": {"content": "hi"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "API key not provided");
}

/// Wrong X-Api-Key is rejected and nothing is posted.
#[tokio::test]
async fn test_webhook_rejects_wrong_api_key() {
    let app = create_test_app();
    let reply = Arc::new(RecordingReply::default());
    open_conversation(&app.bridge, "C1:1", Arc::clone(&reply)).await;

    let response = app
        .router
        .oneshot(webhook_request(
            Some("guess"),
            json!({"conversation_id": "conv-1", "payload": {"content": "hi"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(reply.posted.lock().unwrap().is_empty());
}

/// Unknown conversation id maps to 404.
#[tokio::test]
async fn test_webhook_unknown_conversation() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(webhook_request(
            Some(API_KEY),
            json!({"conversation_id": "conv-404", "payload": {"content": "hi"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("conv-404"));
}

/// Known conversation: reply is posted into the originating thread.
#[tokio::test]
async fn test_webhook_delivers_reply() {
    let app = create_test_app();
    let reply = Arc::new(RecordingReply::default());
    open_conversation(&app.bridge, "C1:1", Arc::clone(&reply)).await;

    let response = app
        .router
        .oneshot(webhook_request(
            Some(API_KEY),
            json!({"conversation_id": "conv-1", "payload": {"content": "Your ticket is open"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "delivered");
    assert_eq!(
        *reply.posted.lock().unwrap(),
        vec!["Your ticket is open".to_string()]
    );
}

/// Payload without content is accepted but posts nothing.
#[tokio::test]
async fn test_webhook_without_content() {
    let app = create_test_app();
    let reply = Arc::new(RecordingReply::default());
    open_conversation(&app.bridge, "C1:1", Arc::clone(&reply)).await;

    let response = app
        .router
        .oneshot(webhook_request(
            Some(API_KEY),
            json!({"conversation_id": "conv-1"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "empty");
    assert!(reply.posted.lock().unwrap().is_empty());
}

/// Reply target failure maps to 502.
#[tokio::test]
async fn test_webhook_reply_failure() {
    let app = create_test_app();
    let reply = Arc::new(RecordingReply {
        fail: true,
        ..Default::default()
    });
    open_conversation(&app.bridge, "C1:1", reply).await;

    let response = app
        .router
        .oneshot(webhook_request(
            Some(API_KEY),
            json!({"conversation_id": "conv-1", "payload": {"content": "hi"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

/// Malformed body maps to 400.
#[tokio::test]
async fn test_webhook_invalid_body() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(webhook_request(Some(API_KEY), json!({"payload": {}})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// GET /health is always OK.
#[tokio::test]
async fn test_health() {
    let app = create_test_app();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

/// GET /state shows both maps and the token flag, never the token.
#[tokio::test]
async fn test_state_dump() {
    let app = create_test_app();
    open_conversation(&app.bridge, "C1:1", Arc::new(RecordingReply::default())).await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["threads"]["C1:1"], "conv-1");
    assert_eq!(body["conversations"]["conv-1"]["thread"], "C1:1");
    assert_eq!(body["conversations"]["conv-1"]["reply_target"], "recording");
    assert_eq!(body["has_token"], false);
    assert!(body.get("token").is_none());
}
