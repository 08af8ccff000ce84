use super::*;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, model: &str, batch_size: u32) -> OllamaConfig {
    let uri = Url::parse(&server.uri()).expect("mock server uri");
    OllamaConfig {
        protocol: "http".to_string(),
        host: uri.host_str().expect("host").to_string(),
        port: uri.port().expect("port"),
        model: model.to_string(),
        batch_size,
    }
}

fn test_client(server: &MockServer, model: &str, batch_size: u32) -> OllamaClient {
    OllamaClient::new(&config_for(server, model, batch_size))
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(5))
        .with_backoff(Duration::from_millis(10))
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model(), "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url().host_str(), Some("test-host"));
    assert_eq!(client.base_url().port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
    assert_eq!(EmbeddingBackend::name(&client), "test-model");
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5)
        .with_backoff(Duration::from_millis(5));

    assert_eq!(client.retry_attempts, 5);
    assert_eq!(client.backoff, Duration::from_millis(5));

    let clamped = client.with_retry_attempts(0);
    assert_eq!(clamped.retry_attempts, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_embeddings_are_chunked() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(serde_json::json!({
            "model": "nomic-embed-text",
            "input": ["a", "b"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[1.0, 0.0], [0.0, 1.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(serde_json::json!({
            "model": "nomic-embed-text",
            "input": ["c"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.5, 0.5]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server, "nomic-embed-text", 2);
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let embeddings = tokio::task::spawn_blocking(move || client.generate_embeddings_batch(&texts))
        .await
        .expect("join")
        .expect("embeddings");

    assert_eq!(
        embeddings,
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn response_count_mismatch_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server, "nomic-embed-text", 8);
    let texts = vec!["a".to_string(), "b".to_string()];

    let result = tokio::task::spawn_blocking(move || client.generate_embeddings_batch(&texts))
        .await
        .expect("join");

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("Mismatch"));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.25, 0.75]]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server, "nomic-embed-text", 8);

    let embedding = tokio::task::spawn_blocking(move || client.generate_embedding("disk full"))
        .await
        .expect("join")
        .expect("embedding after retry");

    assert_eq!(embedding, vec![0.25, 0.75]);
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server, "missing-model", 8);

    let result = tokio::task::spawn_blocking(move || client.generate_embedding("disk full"))
        .await
        .expect("join");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_accepts_latest_tag() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": [
                {"name": "llama3:8b", "size": 1, "digest": "abc"},
                {"name": "nomic-embed-text:latest", "size": 2, "digest": "def"}
            ]
        })))
        .mount(&server)
        .await;

    let bare = test_client(&server, "nomic-embed-text", 8);
    let missing = test_client(&server, "all-minilm", 8);

    let (bare_result, missing_result) = tokio::task::spawn_blocking(move || {
        (bare.health_check(), missing.validate_model())
    })
    .await
    .expect("join");

    assert!(bare_result.is_ok());
    let err = missing_result.unwrap_err();
    assert!(err.to_string().contains("all-minilm"));
}

#[tokio::test(flavor = "multi_thread")]
async fn backend_load_fails_when_server_is_down() {
    let server = MockServer::start().await;
    let client = test_client(&server, "nomic-embed-text", 8).with_retry_attempts(1);
    drop(server);

    let result = tokio::task::spawn_blocking(move || client.load())
        .await
        .expect("join");

    assert!(result.is_err());
}
