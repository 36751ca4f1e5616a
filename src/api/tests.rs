use super::client::error_from_status;
use super::*;
use mockito::Matcher;
use serde_json::json;
use serial_test::serial;

fn client_for(server: &mockito::ServerGuard) -> SpeechClient {
    SpeechClient::new(
        &format!("{}/v1", server.url()),
        ApiKey::new("test-key-1234"),
        None,
    )
    .unwrap()
}

#[test]
fn test_api_error_display() {
    let err = ApiError::QuotaExceeded("out of characters".to_string());
    assert_eq!(err.to_string(), "Quota exceeded: out of characters");

    let err = ApiError::Server {
        status: 500,
        message: "boom".to_string(),
    };
    assert_eq!(err.to_string(), "API returned 500: boom");

    assert_eq!(ApiError::RateLimited.to_string(), "Rate limit exceeded");
}

#[test]
fn test_error_from_status_quota_wins_over_code() {
    let body = r#"{"detail":{"status":"quota_exceeded","message":"This request exceeds your quota"}}"#;
    match error_from_status(429, body) {
        ApiError::QuotaExceeded(message) => assert_eq!(message, "This request exceeds your quota"),
        other => panic!("Expected QuotaExceeded, got {:?}", other),
    }
    assert!(error_from_status(401, body).is_quota());
}

#[test]
fn test_error_from_status_variants() {
    assert!(matches!(
        error_from_status(401, r#"{"detail":{"status":"invalid_api_key","message":"bad key"}}"#),
        ApiError::Unauthorized(ref m) if m == "bad key"
    ));
    assert!(matches!(error_from_status(429, "{}"), ApiError::RateLimited));
    assert!(matches!(
        error_from_status(422, r#"{"detail":"voice not found"}"#),
        ApiError::Server { status: 422, ref message } if message == "voice not found"
    ));
    assert!(matches!(
        error_from_status(502, ""),
        ApiError::Server { status: 502, ref message } if message == "HTTP 502"
    ));
}

#[test]
fn test_secret_error_maps_to_api_error() {
    let err: ApiError = SecretError::NotFound("ELEVEN_LABS_API_KEY".to_string()).into();
    assert!(matches!(err, ApiError::Unauthorized(_)));

    let err: ApiError = SecretError::Transport("connection refused".to_string()).into();
    assert!(matches!(err, ApiError::Network(_)));
}

#[test]
fn test_api_key_debug_is_redacted() {
    let key = ApiKey::new("sk_supersecretvalue9876");
    let printed = format!("{:?}", key);
    assert!(!printed.contains("supersecret"));
    assert!(printed.ends_with("9876)"));
}

#[tokio::test]
async fn test_list_voices_parses_catalog() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/voices")
        .match_header("xi-api-key", "test-key-1234")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "voices": [
                    {"voice_id": "aria-01", "name": "Aria", "labels": {"language": "en", "accent": "american", "gender": "female"}, "preview_url": "https://cdn.example/aria.mp3"},
                    {"voice_id": "laila", "name": "Laila", "labels": {"language": "arabic"}}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let voices = client_for(&server).list_voices().await.unwrap();
    mock.assert_async().await;

    assert_eq!(voices.len(), 2);
    assert_eq!(voices[0].id, "aria-01");
    assert_eq!(voices[0].accent_label, "american");
    assert_eq!(voices[1].language_label, "arabic");
    assert!(voices[1].preview_url.is_none());
}

#[tokio::test]
async fn test_list_voices_unauthorized() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/voices")
        .with_status(401)
        .with_body(r#"{"detail":{"status":"invalid_api_key","message":"Invalid API key"}}"#)
        .create_async()
        .await;

    let result = client_for(&server).list_voices().await;
    assert!(matches!(result, Err(ApiError::Unauthorized(_))));
}

#[tokio::test]
async fn test_synthesize_returns_audio() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/text-to-speech/aria-01")
        .match_header("xi-api-key", "test-key-1234")
        .match_header("accept", "audio/mpeg")
        .match_body(Matcher::PartialJson(json!({
            "text": "hello",
            "model_id": "eleven_multilingual_v2",
            "voice_settings": {"stability": 0.5, "similarity_boost": 0.5}
        })))
        .with_status(200)
        .with_header("content-type", "audio/mpeg")
        .with_body(vec![0xFFu8, 0xFB, 0x90, 0x00])
        .create_async()
        .await;

    let payload = client_for(&server)
        .synthesize(&SynthesisRequest::new("hello", "aria-01"))
        .await
        .unwrap();
    mock.assert_async().await;

    assert_eq!(payload.mime(), "audio/mpeg");
    assert_eq!(payload.bytes().as_ref(), &[0xFF, 0xFB, 0x90, 0x00]);
}

#[tokio::test]
async fn test_synthesize_quota_exceeded() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/text-to-speech/aria-01")
        .with_status(429)
        .with_body(r#"{"detail":{"status":"quota_exceeded","message":"Quota exceeded"}}"#)
        .create_async()
        .await;

    let result = client_for(&server)
        .synthesize(&SynthesisRequest::new("hello", "aria-01"))
        .await;
    assert!(matches!(result, Err(ApiError::QuotaExceeded(_))));
}

#[tokio::test]
async fn test_synthesize_validation_happens_before_network() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let result = client_for(&server)
        .synthesize(&SynthesisRequest::new("   ", "aria-01"))
        .await;
    assert!(matches!(result, Err(ApiError::Validation(_))));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_synthesize_rejects_oversized_audio() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/text-to-speech/aria-01")
        .with_status(200)
        .with_header("content-type", "audio/mpeg")
        .with_body(vec![0u8; 64])
        .create_async()
        .await;

    let client = client_for(&server).with_max_audio_bytes(16);
    let result = client
        .synthesize(&SynthesisRequest::new("hello", "aria-01"))
        .await;
    assert!(matches!(result, Err(ApiError::PayloadTooLarge(16))));
}

#[tokio::test]
async fn test_synthesize_server_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/text-to-speech/aria-01")
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let result = client_for(&server)
        .synthesize(&SynthesisRequest::new("hello", "aria-01"))
        .await;
    match result {
        Err(ApiError::Server { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "upstream unavailable");
        }
        other => panic!("Expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_convert_recording_sends_multipart() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/voice-generation/aria-01")
        .match_header("xi-api-key", "test-key-1234")
        .match_header(
            "content-type",
            Matcher::Regex("^multipart/form-data; boundary=.*".to_string()),
        )
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="audio"; filename="recording.wav""#.to_string()),
            Matcher::Regex(r#"name="model_id""#.to_string()),
            Matcher::Regex("eleven_multilingual_v2".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "audio/mpeg")
        .with_body(vec![7u8; 8])
        .create_async()
        .await;

    let request = ConversionRequest::new(
        crate::audio::AudioPayload::new(b"RIFF....WAVE".to_vec(), "audio/wav"),
        "aria-01",
    );
    let payload = client_for(&server).convert_recording(&request).await.unwrap();
    mock.assert_async().await;
    assert_eq!(payload.len(), 8);
}

#[tokio::test]
async fn test_fetch_audio_rejects_non_http_scheme() {
    let server = mockito::Server::new_async().await;
    let result = client_for(&server).fetch_audio("file:///etc/passwd").await;
    assert!(matches!(result, Err(ApiError::Validation(_))));
}

#[tokio::test]
async fn test_fetch_audio_downloads_preview() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/previews/aria.mp3")
        .with_status(200)
        .with_header("content-type", "audio/mpeg; charset=binary")
        .with_body(vec![1u8, 2, 3])
        .create_async()
        .await;

    let url = format!("{}/previews/aria.mp3", server.url());
    let payload = client_for(&server).fetch_audio(&url).await.unwrap();
    assert_eq!(payload.mime(), "audio/mpeg");
    assert_eq!(payload.len(), 3);
}

#[test]
fn test_secret_name_allow_list() {
    assert_eq!(
        SecretName::parse("ELEVEN_LABS_API_KEY").unwrap(),
        SecretName::ElevenLabsApiKey
    );
    assert_eq!(
        SecretName::parse("FIREBASE_API_KEY").unwrap(),
        SecretName::FirebaseApiKey
    );
    assert!(matches!(
        SecretName::parse("DATABASE_URL"),
        Err(SecretError::InvalidName(_))
    ));
}

#[tokio::test]
async fn test_remote_secret_store_returns_value() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/functions/v1/get-secret")
        .match_header("authorization", "Bearer id-token")
        .match_body(Matcher::Json(json!({"secret_name": "ELEVEN_LABS_API_KEY"})))
        .with_status(200)
        .with_body(r#"{"ELEVEN_LABS_API_KEY":"sk_from_server"}"#)
        .create_async()
        .await;

    let store = RemoteSecretStore::new(format!("{}/functions/v1/get-secret", server.url()))
        .with_bearer_token("id-token");
    let key = secrets::resolve_api_key(&store).await.unwrap();
    mock.assert_async().await;
    assert_eq!(key.expose(), "sk_from_server");
}

#[tokio::test]
async fn test_remote_secret_store_error_statuses() {
    let mut server = mockito::Server::new_async().await;
    let _missing = server
        .mock("POST", "/missing")
        .with_status(404)
        .with_body(r#"{"error":"Secret not found"}"#)
        .create_async()
        .await;
    let _invalid = server
        .mock("POST", "/invalid")
        .with_status(400)
        .with_body(r#"{"error":"Invalid secret name"}"#)
        .create_async()
        .await;

    let missing = RemoteSecretStore::new(format!("{}/missing", server.url()));
    assert!(matches!(
        missing.get(SecretName::FirebaseApiKey).await,
        Err(SecretError::NotFound(_))
    ));

    let invalid = RemoteSecretStore::new(format!("{}/invalid", server.url()));
    assert!(matches!(
        invalid.get(SecretName::FirebaseApiKey).await,
        Err(SecretError::InvalidName(_))
    ));
}

#[tokio::test]
async fn test_get_named_rejects_unlisted_name_without_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let store = RemoteSecretStore::new(server.url());
    let result = store.get_named("AWS_SECRET_ACCESS_KEY").await;
    assert!(matches!(result, Err(SecretError::InvalidName(_))));
    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_env_secret_store() {
    std::env::set_var("FIREBASE_API_KEY", "fb-test-value");
    let store = EnvSecretStore;
    assert_eq!(
        store.get(SecretName::FirebaseApiKey).await.unwrap(),
        "fb-test-value"
    );

    std::env::set_var("FIREBASE_API_KEY", "   ");
    assert!(matches!(
        store.get(SecretName::FirebaseApiKey).await,
        Err(SecretError::NotFound(_))
    ));
    std::env::remove_var("FIREBASE_API_KEY");
}
