//! Integration tests for the HTTP API surface
//!
//! Drives the axum router directly with tower's oneshot, using in-memory
//! storage and (where a live model is needed) a wiremock provider behind
//! the OpenAI base URL override.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modelcompare::config::{
    AuthConfig, BreakerConfig, Config, DatabaseConfig, LogFormat, LoggingConfig, ProviderKeys,
    ProvidersConfig, RequestConfig, ServerConfig, StorageBackend, StripeConfig, TemplateConfig,
    TemplatePolicy,
};
use modelcompare::providers::ProviderRegistry;
use modelcompare::server::{build_router, AppState};
use modelcompare::storage::MemoryStorage;
use modelcompare::templates::TemplateCatalog;

fn keys(api_key: Option<&str>, base_url: &str) -> ProviderKeys {
    ProviderKeys {
        api_key: api_key.map(str::to_string),
        base_url: base_url.to_string(),
    }
}

/// Test config; `openai_url` points the OpenAI adapter at a mock server
/// with a key set, None leaves every provider unconfigured.
fn test_config(openai_url: Option<&str>) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        providers: ProvidersConfig {
            openai: match openai_url {
                Some(url) => keys(Some("test-api-key"), url),
                None => keys(None, "https://api.openai.com/v1"),
            },
            anthropic: keys(None, "https://api.anthropic.com"),
            google: keys(None, "https://generativelanguage.googleapis.com"),
            deepseek: keys(None, "https://api.deepseek.com/v1"),
            openrouter: keys(None, "https://openrouter.ai/api/v1"),
            xai: keys(None, "https://api.x.ai/v1"),
        },
        breaker: BreakerConfig::default(),
        request: RequestConfig {
            timeout_ms: 5000,
            health_check_timeout_ms: 1000,
        },
        database: DatabaseConfig {
            backend: StorageBackend::Memory,
            path: PathBuf::from(":memory:"),
            max_connections: 1,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
        },
        templates: TemplateConfig {
            prompts_dir: PathBuf::from("./prompts"),
            policy: TemplatePolicy::Warn,
        },
        stripe: StripeConfig {
            secret_key: None,
            base_url: "https://api.stripe.com".to_string(),
        },
        auth: AuthConfig {
            google_client_id: None,
            google_client_secret: None,
            redirect_url: "http://localhost:5000/api/auth/google/callback".to_string(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
        },
    }
}

fn app(config: Config) -> Router {
    let registry = ProviderRegistry::from_config(&config).unwrap();
    let templates = TemplateCatalog::load(&config.templates).unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let state = Arc::new(AppState::new(config, registry, storage, templates).unwrap());
    build_router(state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn patch_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_reports_providers() {
    let app = app(test_config(None));

    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 6);
    assert!(providers.iter().all(|p| p["configured"] == false));
}

#[tokio::test]
async fn test_models_empty_without_keys() {
    let app = app(test_config(None));

    let response = app.oneshot(get("/api/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["models"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_models_listed_when_configured() {
    let app = app(test_config(Some("http://localhost:1")));

    let response = app.oneshot(get("/api/models")).await.unwrap();
    let body = body_json(response).await;

    let models = body["models"].as_array().unwrap();
    assert!(!models.is_empty());
    assert!(models.iter().any(|m| m["id"] == "gpt-4o"));
    assert!(models.iter().all(|m| m["provider"] == "openai"));
}

#[tokio::test]
async fn test_compare_rejects_empty_prompt() {
    let app = app(test_config(None));

    let response = app
        .oneshot(post_json(
            "/api/compare",
            json!({ "prompt": "   ", "modelIds": ["gpt-4o"] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("prompt"));
}

#[tokio::test]
async fn test_compare_rejects_no_models() {
    let app = app(test_config(None));

    let response = app
        .oneshot(post_json(
            "/api/compare",
            json!({ "prompt": "hello", "modelIds": [] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_compare_end_to_end() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "mocked answer" } }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 3 }
        })))
        .mount(&mock_server)
        .await;

    let app = app(test_config(Some(&mock_server.uri())));

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/compare",
            json!({ "prompt": "what is rust?", "modelIds": ["gpt-4o", "gpt-4o-mini"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let comparison = &body["comparison"];
    assert_eq!(comparison["prompt"], "what is rust?");
    assert_eq!(comparison["responses"]["gpt-4o"]["content"], "mocked answer");
    assert_eq!(comparison["responses"].as_object().unwrap().len(), 2);
    assert!(comparison["totalCost"].as_f64().unwrap() > 0.0);
    assert!(body["errors"].as_object().unwrap().is_empty());

    // The comparison is persisted and fetchable
    let id = comparison["id"].as_str().unwrap().to_string();
    let response = app
        .clone()
        .oneshot(get(&format!("/api/comparisons/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/api/comparisons")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["comparisons"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_compare_reports_partial_failures() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "still here" } }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 3 }
        })))
        .mount(&mock_server)
        .await;

    let app = app(test_config(Some(&mock_server.uri())));

    // One real model, one unknown: the call succeeds with a recorded error
    let response = app
        .oneshot(post_json(
            "/api/compare",
            json!({ "prompt": "hi", "modelIds": ["gpt-4o", "made-up-model"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["comparison"]["responses"].as_object().unwrap().len(), 1);
    assert!(body["errors"]["made-up-model"].is_string());
}

#[tokio::test]
async fn test_comparison_not_found() {
    let app = app(test_config(None));

    let response = app.oneshot(get("/api/comparisons/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_battle_continue_rejects_unknown_type() {
    let app = app(test_config(None));

    let response = app
        .oneshot(post_json(
            "/api/battle/continue",
            json!({
                "prompt": "p",
                "response": "r",
                "modelId": "gpt-4o",
                "battleType": "annihilate"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_debate_init_rejects_unknown_model() {
    let app = app(test_config(Some("http://localhost:1")));

    let response = app
        .oneshot(post_json(
            "/api/debate",
            json!({ "topic": "tabs vs spaces", "modelA": "gpt-4o", "modelB": "not-real" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("not-real"));
}

#[tokio::test]
async fn test_debate_init_rejects_self_debate() {
    let app = app(test_config(Some("http://localhost:1")));

    let response = app
        .oneshot(post_json(
            "/api/debate",
            json!({ "topic": "tabs vs spaces", "modelA": "gpt-4o", "modelB": "gpt-4o" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_debate_lifecycle() {
    let app = app(test_config(Some("http://localhost:1")));

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/debate",
            json!({
                "topic": "tabs vs spaces",
                "modelA": "gpt-4o",
                "modelB": "gpt-4o-mini",
                "intensity": 8
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let session = body_json(response).await;
    assert_eq!(session["status"], "active");
    assert_eq!(session["intensity"], 8);
    let id = session["id"].as_str().unwrap().to_string();

    // Snapshot: no messages yet, pro side (model A) speaks first
    let response = app
        .clone()
        .oneshot(get(&format!("/api/debate/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["messages"].as_array().unwrap().is_empty());
    assert_eq!(body["resume"]["nextTurnNumber"], 1);
    assert_eq!(body["resume"]["nextModelId"], "gpt-4o");

    // Complete, then streaming is refused
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/debate/{id}/complete"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get(&format!("/api/debate/{id}/stream")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_debate_not_found() {
    let app = app(test_config(None));

    let response = app.oneshot(get("/api/debate/ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stripe_packages_listed() {
    let app = app(test_config(None));

    let response = app.oneshot(get("/api/stripe/packages")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let packages = body["packages"].as_array().unwrap();
    assert_eq!(packages.len(), 4);
    assert!(packages.iter().any(|p| p["id"] == "starter"));
}

#[tokio::test]
async fn test_payment_intent_requires_stripe_key() {
    let app = app(test_config(None));

    let response = app
        .oneshot(post_json(
            "/api/stripe/create-payment-intent",
            json!({ "packageId": "starter" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_auth_user_requires_session() {
    let app = app(test_config(None));

    let response = app.oneshot(get("/api/auth/user")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_google_requires_configuration() {
    let app = app(test_config(None));

    let response = app.oneshot(get("/api/auth/google")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_arc_run_lifecycle() {
    let app = app(test_config(None));

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/arc/runs",
            json!({ "taskId": "puzzle-12", "metadata": { "size": 5 } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let run = body_json(response).await;
    assert_eq!(run["status"], "running");
    assert_eq!(run["taskId"], "puzzle-12");
    let id = run["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/arc/runs/{id}/messages"),
            json!({ "role": "user", "content": "solve it" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/arc/runs/{id}/artifacts"),
            json!({ "artifactType": "grid", "content": "[[1]]" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(patch_json(
            &format!("/api/arc/runs/{id}"),
            json!({ "status": "solved" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get(&format!("/api/arc/runs/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["run"]["status"], "solved");
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(body["artifacts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_arc_message_rejects_unknown_run() {
    let app = app(test_config(None));

    let response = app
        .oneshot(post_json(
            "/api/arc/runs/missing/messages",
            json!({ "role": "user", "content": "hi" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
