use super::*;
use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::Mutex};

const GOOD_KEY: &str = "good-key";

#[derive(Debug, Clone)]
struct CapturedRequest {
    call: String,
    key: Option<String>,
    query: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct MockGemini {
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
    reply_status: StatusCode,
    reply_body: Value,
}

impl MockGemini {
    async fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().await.clone()
    }
}

fn api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-goog-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn text_reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] }
        }]
    })
}

async fn generate_content(
    State(mock): State<MockGemini>,
    Path(call): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.captured.lock().await.push(CapturedRequest {
        call,
        key: api_key(&headers),
        query,
        body,
    });
    (mock.reply_status, Json(mock.reply_body.clone()))
}

async fn list_models(headers: HeaderMap) -> StatusCode {
    if api_key(&headers).as_deref() == Some(GOOD_KEY) {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
}

async fn spawn_mock(reply_status: StatusCode, reply_body: Value) -> (String, MockGemini) {
    let mock = MockGemini {
        captured: Arc::new(Mutex::new(Vec::new())),
        reply_status,
        reply_body,
    };
    let app = Router::new()
        .route("/v1beta/models", get(list_models))
        .route("/v1beta/models/:call", post(generate_content))
        .with_state(mock.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}/v1beta"), mock)
}

async fn client_for(endpoint: String, language: &str) -> GeminiGenerationClient {
    let client = GeminiGenerationClient::new(GenerationConfig {
        endpoint,
        model: "test-model".to_string(),
        output_language: language.to_string(),
    });
    client.set_credential(GOOD_KEY).await;
    client
}

fn user_parts(body: &Value) -> &Vec<Value> {
    body["contents"][0]["parts"]
        .as_array()
        .expect("user parts")
}

fn system_text(body: &Value) -> &str {
    body["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .expect("system instruction")
}

#[tokio::test]
async fn empty_prompt_without_file_sends_default_demo_prompt() {
    let (endpoint, mock) = spawn_mock(StatusCode::OK, text_reply("<html>demo</html>")).await;
    let client = client_for(endpoint, "French").await;

    let html = client.generate("", None).await.expect("generate");
    assert_eq!(html, "<html>demo</html>");

    let requests = mock.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].call, "test-model:generateContent");
    assert_eq!(requests[0].key.as_deref(), Some(GOOD_KEY));
    assert!(requests[0].query.is_none());

    let parts = user_parts(&requests[0].body);
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0]["text"], DEFAULT_DEMO_PROMPT);
    assert!(system_text(&requests[0].body).contains("French"));
}

#[tokio::test]
async fn prompt_is_sent_verbatim_and_fences_are_stripped() {
    let (endpoint, mock) = spawn_mock(
        StatusCode::OK,
        text_reply("```html\n<!DOCTYPE html><html>clock</html>\n```"),
    )
    .await;
    let client = client_for(endpoint, "English").await;

    let html = client
        .generate("an analog clock", None)
        .await
        .expect("generate");
    assert_eq!(html, "<!DOCTYPE html><html>clock</html>");

    let requests = mock.requests().await;
    assert_eq!(user_parts(&requests[0].body)[0]["text"], "an analog clock");
}

#[tokio::test]
async fn file_input_replaces_prompt_with_analysis_directive() {
    let (endpoint, mock) = spawn_mock(StatusCode::OK, text_reply("<html>pdf</html>")).await;
    let client = client_for(endpoint, "English").await;
    let file = FileInput::new(b"%PDF-1.4".to_vec(), "application/pdf");

    client
        .generate("ignored prompt", Some(&file))
        .await
        .expect("generate");

    let requests = mock.requests().await;
    let parts = user_parts(&requests[0].body);
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0]["text"], FILE_ANALYSIS_DIRECTIVE);
    assert_eq!(parts[1]["inlineData"]["mimeType"], "application/pdf");
    assert_eq!(parts[1]["inlineData"]["data"], file.to_base64());
}

#[tokio::test]
async fn revise_sends_current_document_under_revision_instruction() {
    let (endpoint, mock) = spawn_mock(StatusCode::OK, text_reply("<html>blue</html>")).await;
    let client = client_for(endpoint, "English").await;

    let html = client
        .revise("<html>red</html>", "make it blue")
        .await
        .expect("revise");
    assert_eq!(html, "<html>blue</html>");

    let requests = mock.requests().await;
    let text = user_parts(&requests[0].body)[0]["text"]
        .as_str()
        .expect("text")
        .to_string();
    assert!(text.contains("<html>red</html>"));
    assert!(text.contains("make it blue"));
    assert_eq!(system_text(&requests[0].body), REVISION_SYSTEM_INSTRUCTION);
}

#[tokio::test]
async fn missing_credential_fails_before_any_request() {
    let (endpoint, mock) = spawn_mock(StatusCode::OK, text_reply("<html></html>")).await;
    let client = GeminiGenerationClient::new(GenerationConfig {
        endpoint,
        ..GenerationConfig::default()
    });

    assert!(matches!(
        client.generate("x", None).await,
        Err(GenerationError::MissingCredential)
    ));
    assert!(matches!(
        client.revise("<p/>", "x").await,
        Err(GenerationError::MissingCredential)
    ));
    assert!(mock.requests().await.is_empty());

    client.set_credential(GOOD_KEY).await;
    assert!(client.has_credential().await);
    client.clear_credential().await;
    assert!(!client.has_credential().await);
}

#[tokio::test]
async fn rejected_key_is_reported_as_authorization_failure() {
    let (endpoint, _mock) = spawn_mock(
        StatusCode::BAD_REQUEST,
        json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT",
                "details": [{ "reason": "API_KEY_INVALID" }]
            }
        }),
    )
    .await;
    let client = client_for(endpoint, "English").await;

    let err = client.generate("x", None).await.expect_err("rejected");
    assert!(err.is_authorization_failure());
    assert!(matches!(err, GenerationError::Remote { status: Some(400), .. }));
}

#[tokio::test]
async fn server_failure_is_a_plain_remote_error() {
    let (endpoint, _mock) = spawn_mock(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": { "code": 500, "message": "internal", "status": "INTERNAL" } }),
    )
    .await;
    let client = client_for(endpoint, "English").await;

    let err = client.generate("x", None).await.expect_err("failure");
    assert!(!err.is_authorization_failure());
    assert!(matches!(err, GenerationError::Remote { status: Some(500), .. }));
}

#[tokio::test]
async fn empty_candidate_list_is_a_remote_error() {
    let (endpoint, _mock) = spawn_mock(StatusCode::OK, json!({ "candidates": [] })).await;
    let client = client_for(endpoint, "English").await;

    assert!(matches!(
        client.generate("x", None).await,
        Err(GenerationError::Remote { .. })
    ));
}

#[tokio::test]
async fn credential_check_never_propagates_failures() {
    let (endpoint, _mock) = spawn_mock(StatusCode::OK, text_reply("")).await;
    let client = GeminiGenerationClient::new(GenerationConfig {
        endpoint,
        ..GenerationConfig::default()
    });

    assert!(client.validate_credential(GOOD_KEY).await);
    assert!(!client.validate_credential("bad-key").await);
    assert!(!client.validate_credential("   ").await);

    let unreachable = GeminiGenerationClient::new(GenerationConfig {
        endpoint: "http://127.0.0.1:1/v1beta".to_string(),
        ..GenerationConfig::default()
    });
    assert!(!unreachable.validate_credential(GOOD_KEY).await);
}

#[tokio::test]
async fn transport_failure_does_not_leak_the_credential() {
    let secret = "SECRET-KEY-123";
    let client = GeminiGenerationClient::new(GenerationConfig {
        endpoint: "http://127.0.0.1:1/v1beta".to_string(),
        ..GenerationConfig::default()
    });
    client.set_credential(secret).await;

    let err = client.generate("x", None).await.expect_err("unreachable");
    assert!(!err.to_string().contains(secret));

    let app_error = crate::session::classify_generation_failure(&err);
    assert_eq!(app_error.code, shared::error::ErrorCode::Remote);
    assert!(!app_error.message.contains(secret));

    let err = client
        .revise("<html></html>", "x")
        .await
        .expect_err("unreachable");
    assert!(!err.to_string().contains(secret));
}
