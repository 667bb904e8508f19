use super::*;

#[test]
fn client_configuration() {
    let config = GeminiConfig {
        api_key: String::new(),
        model: "models/test-embedding".to_string(),
        vector_size: 768,
    };
    let client = GeminiClient::new(&config, "secret").expect("Failed to create client");

    assert_eq!(client.model, "models/test-embedding");
    assert_eq!(client.api_key, "secret");
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
    assert_eq!(
        client.base_url.host_str(),
        Some("generativelanguage.googleapis.com")
    );
}

#[test]
fn client_builder_methods() {
    let config = GeminiConfig::default();
    let base = Url::parse("http://localhost:9999").expect("should parse URL");
    let client = GeminiClient::new(&config, "secret")
        .expect("Failed to create client")
        .with_base_url(base)
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
    assert_eq!(client.base_url.port(), Some(9999));
}

#[test]
fn embed_url_contains_model_and_key() {
    let config = GeminiConfig::default();
    let client = GeminiClient::new(&config, "secret").expect("Failed to create client");

    let url = client.embed_url().expect("should build embed URL");

    assert!(url.path().contains("models/text-embedding-004:embedContent"));
    assert!(url.query().is_some_and(|q| q.contains("key=secret")));
}

#[test]
fn task_type_names() {
    assert_eq!(
        task_type_name(EmbeddingTask::RetrievalDocument),
        "RETRIEVAL_DOCUMENT"
    );
    assert_eq!(
        task_type_name(EmbeddingTask::RetrievalQuery),
        "RETRIEVAL_QUERY"
    );
}

#[test]
fn size_limit_error_is_distinguishable() {
    let body = r#"{"error": {"message": "400 Request payload size exceeds the limit: 10000 bytes.", "status": "INVALID_ARGUMENT"}}"#;

    let error = classify_client_error(400, body, 12345);

    assert!(error.is_payload_too_large());
    if let EmbeddingError::PayloadTooLarge { size } = error {
        assert_eq!(size, 12345);
    }
}

#[test]
fn other_client_errors_are_api_errors() {
    let body = r#"{"error": {"message": "API key not valid.", "status": "INVALID_ARGUMENT"}}"#;

    let error = classify_client_error(400, body, 100);

    assert!(!error.is_payload_too_large());
    match error {
        EmbeddingError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "API key not valid.");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[test]
fn error_message_falls_back_to_raw_body() {
    let message = api_error_message("plain text failure");
    assert_eq!(message, "plain text failure");
}

#[test]
fn request_serialization_shape() {
    let request = EmbedContentRequest {
        model: "models/text-embedding-004",
        content: Content {
            parts: vec![Part { text: "hello" }],
        },
        task_type: "RETRIEVAL_DOCUMENT",
        title: Some("Greeting"),
    };

    let json = serde_json::to_string(&request).expect("should serialize");

    assert!(json.contains(r#""taskType":"RETRIEVAL_DOCUMENT""#));
    assert!(json.contains(r#""title":"Greeting""#));
    assert!(json.contains(r#""text":"hello""#));
}

#[test]
fn query_requests_omit_title() {
    let request = EmbedContentRequest {
        model: "models/text-embedding-004",
        content: Content {
            parts: vec![Part { text: "hello" }],
        },
        task_type: "RETRIEVAL_QUERY",
        title: None,
    };

    let json = serde_json::to_string(&request).expect("should serialize");
    assert!(!json.contains("title"));
}
