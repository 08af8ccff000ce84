use super::*;
use crate::config::GenerationProvider;
use crate::database::{LogEntry, Severity};
use chrono::NaiveDate;
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/v1beta/models/gemini-test:generateContent";

fn config_for(server: &MockServer) -> GenerationConfig {
    GenerationConfig {
        provider: GenerationProvider::Gemini,
        api_url: server.uri(),
        model: "gemini-test".to_string(),
        api_key: Some("test-key".to_string()),
        timeout_seconds: 5,
    }
}

fn test_client(server: &MockServer) -> GeminiClient {
    GeminiClient::new(&config_for(server))
        .expect("Failed to create client")
        .with_backoff(Duration::from_millis(10))
}

fn reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "candidates": [
            {"content": {"parts": [{"text": text}], "role": "model"}}
        ]
    }))
}

fn candidate() -> RankedEntry {
    RankedEntry {
        entry: LogEntry {
            log_id: "log_000047".to_string(),
            file_id: "file_0badf00d".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2025, 3, 14)
                .and_then(|d| d.and_hms_opt(9, 26, 53))
                .expect("valid timestamp"),
            source: "UNIT-007".to_string(),
            severity: Severity::Critical,
            message: "Pressure drop in line 3".to_string(),
        },
        score: 0.91,
    }
}

#[test]
fn endpoint_includes_model() {
    let config = GenerationConfig {
        api_key: Some("k".to_string()),
        ..GenerationConfig::default()
    };
    let client = GeminiClient::new(&config).expect("Failed to create client");
    assert_eq!(
        client.endpoint().as_str(),
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
    );
    assert_eq!(client.model(), "gemini-2.5-flash");
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_parses_answer_and_followup() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header_exists("x-goog-api-key"))
        .and(body_string_contains("UNIT-007"))
        .respond_with(reply(
            "1) Answer: One critical pressure drop on UNIT-007.\n2) Followup: Inspect line 3.",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let answer = tokio::task::spawn_blocking(move || {
        client.generate("Any pressure problems?", &[candidate()])
    })
    .await
    .expect("join")
    .expect("answer");

    assert_eq!(answer.answer, "One critical pressure drop on UNIT-007.");
    assert_eq!(answer.suggested_followup, "Inspect line 3.");
}

#[tokio::test(flavor = "multi_thread")]
async fn unformatted_reply_becomes_the_answer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(reply("Pressure dropped once on UNIT-007."))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let answer = tokio::task::spawn_blocking(move || client.generate("pressure?", &[candidate()]))
        .await
        .expect("join")
        .expect("answer");

    assert_eq!(answer.answer, "Pressure dropped once on UNIT-007.");
    assert_eq!(answer.suggested_followup, crate::generation::DEFAULT_FOLLOWUP);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_reply_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": []
        })))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let result = tokio::task::spawn_blocking(move || client.generate("pressure?", &[candidate()]))
        .await
        .expect("join");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(reply("Answer: recovered\nFollowup: none"))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let text = tokio::task::spawn_blocking(move || client.generate_text("hello"))
        .await
        .expect("join")
        .expect("text after retry");

    assert_eq!(text, "Answer: recovered\nFollowup: none");
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server).with_retry_attempts(3);
    let result = tokio::task::spawn_blocking(move || client.generate_text("hello"))
        .await
        .expect("join");

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("403"));
}

#[test]
fn blank_prompt_skips_the_request() {
    let config = GenerationConfig {
        api_url: "http://127.0.0.1:9".to_string(),
        api_key: Some("k".to_string()),
        ..GenerationConfig::default()
    };
    let client = GeminiClient::new(&config).expect("Failed to create client");
    assert_eq!(client.generate_text("   ").expect("empty"), "");
}
