//! Routing through the public API
//!
//! Model selection across endpoints, fallback policies loaded from JSON, and
//! a client dispatching to different servers by model.

mod support;

use serde_json::json;
use siumai_engine::prelude::*;
use siumai_engine::routing::route;

fn table() -> Vec<Endpoint> {
    vec![
        Endpoint::new("a", "https://a.example/v1", Dialect::OpenAi).with_model("m1"),
        Endpoint::new("b", "https://b.example/v1", Dialect::Anthropic).with_model("m2"),
    ]
}

#[test]
fn declared_models_route_to_their_endpoint() {
    let endpoints = table();
    assert_eq!(route("m2", &endpoints).unwrap().name, "b");
    assert_eq!(route("m1", &endpoints).unwrap().name, "a");

    let err = route("m3", &endpoints).unwrap_err();
    assert!(matches!(err, LlmError::RoutingError(_)));
}

#[test]
fn single_endpoint_takes_every_model() {
    let endpoints = vec![Endpoint::new("only", "https://x.example", Dialect::Ollama).with_model("m1")];
    assert_eq!(route("anything", &endpoints).unwrap().name, "only");
}

#[test]
fn json_config_selects_model_family_fallback() {
    let config = EngineConfig::from_json_str(
        r#"{
            "retry": { "max_retries": 1 },
            "endpoints": [
                { "name": "openai", "base_url": "https://api.openai.com/v1", "dialect": "openai" },
                { "name": "claude", "base_url": "https://api.anthropic.com/v1", "dialect": "anthropic" }
            ],
            "fallback": "model_family",
            "cache_capacity": 8
        }"#,
    )
    .unwrap();

    let router = config.build_router();
    assert_eq!(router.route("claude-3-5-haiku").unwrap().name, "claude");
    assert_eq!(router.route("gpt-4o-mini").unwrap().name, "openai");
    assert_eq!(router.cached_decisions(), 2);
    assert!(router.route("unheard-of-model").is_err());
}

#[test]
fn custom_heuristic_is_consulted_for_unknown_models() {
    let router = Router::new(table()).with_fallback(FallbackPolicy::heuristic(
        |model: &str, candidates: &[&Endpoint]| {
            candidates
                .iter()
                .position(|e| model.starts_with("big-") && e.name == "b")
        },
    ));
    assert_eq!(router.route("big-model").unwrap().name, "b");
    assert!(router.route("small-model").is_err());
}

#[test]
fn invalid_tables_are_rejected_by_config() {
    let duplicate = EngineConfig::new()
        .with_endpoint(Endpoint::new("x", "https://one.example", Dialect::OpenAi))
        .with_endpoint(Endpoint::new("x", "https://two.example", Dialect::OpenAi));
    assert!(matches!(
        duplicate.validate(),
        Err(LlmError::ConfigurationError(_))
    ));

    let bad_url = EngineConfig::new().with_endpoint(Endpoint::new("x", "ftp://nope", Dialect::OpenAi));
    assert!(bad_url.validate().is_err());
}

#[tokio::test]
async fn client_dispatches_by_model_to_separate_servers() {
    let mut first = support::start().await;
    let mut second = support::start().await;

    let first_mock = first
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(support::sse(&[
            r#"{"choices":[{"delta":{"content":"from first"}}]}"#,
            "[DONE]",
        ]))
        .expect(1)
        .create_async()
        .await;
    let second_mock = second
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(support::sse(&[
            r#"{"choices":[{"delta":{"content":"from second"}}]}"#,
            "[DONE]",
        ]))
        .expect(1)
        .create_async()
        .await;

    let client = StreamingClient::new(support::engine(
        vec![
            Endpoint::new("first", first.url(), Dialect::OpenAi).with_model("m1"),
            Endpoint::new("second", second.url(), Dialect::OpenAi).with_model("m2"),
        ],
        0,
    ))
    .unwrap();

    let one = client.generate("m1", json!({"messages": []}), None).await.unwrap();
    let two = client.generate("m2", json!({"messages": []}), None).await.unwrap();
    assert_eq!(one.text, "from first");
    assert_eq!(two.text, "from second");
    assert_eq!(one.provider, "first");

    let missing = client.generate("m3", json!({"messages": []}), None).await;
    assert!(matches!(missing, Err(LlmError::RoutingError(_))));

    first_mock.assert_async().await;
    second_mock.assert_async().await;
}
