//! Full tool calls through the default dispatcher against a scripted upstream.

mod common;

use common::{chat_body, client, delta, fim_body, policy, ScriptedTransport, Step};
use diffusion_gateway::cache::{CacheConfig, ResponseCache};
use diffusion_gateway::client::RetryPolicy;
use diffusion_gateway::config::GatewayConfig;
use diffusion_gateway::tools::{default_dispatcher, ToolContext, ToolDispatcher};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    transport: Arc<ScriptedTransport>,
    cache: Arc<ResponseCache>,
    dispatcher: ToolDispatcher,
}

fn harness_with(steps: Vec<Step>, retry: RetryPolicy) -> Harness {
    let transport = ScriptedTransport::new(steps);
    let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
    let ctx = ToolContext::new(
        Arc::new(client(&transport, retry)),
        Arc::clone(&cache),
        Arc::new(GatewayConfig::default()),
    );
    Harness {
        transport,
        cache,
        dispatcher: default_dispatcher(&ctx).unwrap(),
    }
}

fn harness(steps: Vec<Step>) -> Harness {
    harness_with(steps, RetryPolicy::none())
}

fn user(content: &str) -> Value {
    json!({"messages": [{"role": "user", "content": content}]})
}

#[tokio::test]
async fn test_tools_are_listed_in_order() {
    let h = harness(vec![]);
    let names: Vec<String> = h.dispatcher.list().into_iter().map(|t| t.name).collect();
    assert_eq!(
        names,
        vec!["chat_completion", "chat_completion_stream", "fim_completion", "list_models"]
    );
    let listed = serde_json::to_value(h.dispatcher.list()).unwrap();
    assert_eq!(listed[0]["inputSchema"]["required"], json!(["messages"]));
}

#[tokio::test]
async fn test_unknown_tool_envelope() {
    let h = harness(vec![]);
    let resp = h.dispatcher.call("translate", json!({})).await;
    assert!(resp.is_error);
    let body = resp.error_body().unwrap();
    assert_eq!(body["type"], "tool_not_found");
    assert_eq!(body["available_tools"].as_array().unwrap().len(), 4);
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn test_empty_messages_never_reach_upstream() {
    let h = harness(vec![Step::ok(chat_body("unused"))]);
    let resp = h
        .dispatcher
        .call("chat_completion", json!({"messages": []}))
        .await;
    let body = resp.error_body().unwrap();
    assert_eq!(body["type"], "validation_error");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("at least one message"));
    assert_eq!(body["errors"][0]["path"], "messages");
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn test_chat_applies_defaults_and_reports_metadata() {
    let h = harness(vec![Step::ok(chat_body("Hello!"))]);
    let resp = h
        .dispatcher
        .call(
            "chat_completion",
            json!({"messages": [{"role": "user", "content": "hi"}], "diffusion_steps": 90}),
        )
        .await;

    assert!(!resp.is_error);
    assert_eq!(resp.text_content(), "Hello!");
    let meta = resp.metadata.unwrap();
    assert_eq!(meta["model"], "mercury-coder-small");
    assert_eq!(meta["usage"]["total_tokens"], 20);
    assert_eq!(meta["finish_reason"], "stop");
    assert_eq!(meta["diffusion"]["steps_completed"], 20);
    assert_eq!(meta["attempts"], 1);
    assert!(meta["performance"]["latency_ms"].is_u64());

    let sent = h.transport.recorded()[0].body.clone().unwrap();
    assert_eq!(sent["model"], "mercury-coder-small");
    assert_eq!(sent["diffusion_steps"], 50);
    assert_eq!(sent["temperature"], 0.7);
    assert!(sent.get("stream").is_none());
}

#[tokio::test]
async fn test_whole_float_counts_are_accepted() {
    let h = harness(vec![Step::ok(chat_body("ok"))]);
    let mut args = user("hi");
    args["max_tokens"] = json!(10.0);
    args["diffusion_steps"] = json!(25.0);
    let resp = h.dispatcher.call("chat_completion", args).await;

    assert!(!resp.is_error, "{:?}", resp.error_body());
    let sent = h.transport.recorded()[0].body.clone().unwrap();
    assert_eq!(sent["max_tokens"], json!(10));
    assert_eq!(sent["diffusion_steps"], json!(25));
}

#[tokio::test]
async fn test_malformed_tool_fields_are_validation_errors() {
    let h = harness(vec![Step::ok(chat_body("unused"))]);

    let mut args = user("hi");
    args["tools"] = json!("not-a-list");
    let body = h.dispatcher.call("chat_completion", args).await.error_body().unwrap();
    assert_eq!(body["type"], "validation_error");
    assert_eq!(body["errors"][0]["path"], "tools");

    let mut args = user("hi");
    args["tool_choice"] = json!("sometimes");
    let body = h
        .dispatcher
        .call("chat_completion_stream", args)
        .await
        .error_body()
        .unwrap();
    assert_eq!(body["type"], "validation_error");
    assert_eq!(body["errors"][0]["path"], "tool_choice");

    let mut args = user("hi");
    args["user"] = json!(42);
    let body = h.dispatcher.call("chat_completion", args).await.error_body().unwrap();
    assert_eq!(body["type"], "validation_error");

    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn test_function_tools_are_forwarded() {
    let h = harness(vec![Step::ok(chat_body("calling"))]);
    let tools = json!([{
        "type": "function",
        "function": {
            "name": "lookup",
            "description": "Find a symbol",
            "parameters": {"type": "object", "properties": {"q": {"type": "string"}}}
        }
    }]);
    let mut args = user("where is main?");
    args["tools"] = tools.clone();
    args["tool_choice"] = json!({"type": "function", "function": {"name": "lookup"}});
    args["user"] = json!("u-7");
    let resp = h.dispatcher.call("chat_completion", args).await;

    assert!(!resp.is_error, "{:?}", resp.error_body());
    let sent = h.transport.recorded()[0].body.clone().unwrap();
    assert_eq!(sent["tools"], tools);
    assert_eq!(sent["tool_choice"]["function"]["name"], "lookup");
    assert_eq!(sent["user"], "u-7");
}

#[tokio::test]
async fn test_deterministic_chat_is_served_from_cache() {
    let h = harness(vec![Step::ok(chat_body("cached answer"))]);

    let first = h.dispatcher.call("chat_completion", user("same question")).await;
    let second = h.dispatcher.call("chat_completion", user("same question")).await;

    assert_eq!(h.transport.calls(), 1);
    assert_eq!(second.text_content(), "cached answer");
    assert_eq!(
        first.metadata.unwrap()["usage"],
        second.metadata.unwrap()["usage"]
    );
    let stats = h.cache.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.size, 1);
}

#[tokio::test]
async fn test_creative_chat_is_not_cached() {
    let h = harness(vec![Step::ok(chat_body("one")), Step::ok(chat_body("two"))]);
    let mut args = user("tell me a story");
    args["temperature"] = json!(0.9);

    let first = h.dispatcher.call("chat_completion", args.clone()).await;
    let second = h.dispatcher.call("chat_completion", args).await;

    assert_eq!(h.transport.calls(), 2);
    assert_eq!(first.text_content(), "one");
    assert_eq!(second.text_content(), "two");
}

#[tokio::test]
async fn test_authentication_failure_envelope() {
    let h = harness(vec![Step::error(401, "invalid_api_key", "Invalid API key")]);
    let resp = h.dispatcher.call("chat_completion", user("hi")).await;
    let body = resp.error_body().unwrap();
    assert_eq!(body["type"], "authentication_error");
    assert_eq!(body["message"], "Invalid API key");
    assert_eq!(body["retryable"], false);
    assert!(body["suggested_fix"].as_str().unwrap().contains("API key"));
}

#[tokio::test]
async fn test_convergence_failure_suggests_steps() {
    let h = harness(vec![Step::json(
        422,
        json!({"error": {
            "message": "Diffusion did not converge",
            "type": "diffusion_convergence_error",
            "steps_completed": 20,
            "convergence_score": 0.41
        }}),
    )]);
    let resp = h.dispatcher.call("chat_completion", user("prove it")).await;
    let body = resp.error_body().unwrap();
    assert_eq!(body["type"], "model_convergence_error");
    assert_eq!(body["retryable"], true);
    assert_eq!(body["suggested_steps"], 30);
    assert_eq!(body["suggested_fix"], "Increase diffusion_steps or adjust temperature");
    assert_eq!(body["metadata"]["steps_completed"], 20);
    assert_eq!(body["metadata"]["convergence_score"], 0.41);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_is_retried_inside_one_call() {
    let h = harness_with(
        vec![Step::rate_limited(Duration::from_secs(5)), Step::ok(chat_body("after wait"))],
        policy(3),
    );
    let mut args = user("hi");
    args["temperature"] = json!(0.5);
    let resp = h.dispatcher.call("chat_completion", args).await;
    assert_eq!(resp.text_content(), "after wait");
    assert_eq!(resp.metadata.unwrap()["attempts"], 2);
}

#[tokio::test]
async fn test_streaming_accumulates_and_counts() {
    let h = harness(vec![Step::sse(&[delta("Diff"), delta("usion"), delta(" rocks")])]);
    let resp = h.dispatcher.call("chat_completion_stream", user("hi")).await;

    assert!(!resp.is_error);
    assert_eq!(resp.text_content(), "Diffusion rocks");
    let meta = resp.metadata.unwrap();
    assert_eq!(meta["streaming"], true);
    assert_eq!(meta["chunks"], 3);
    assert_eq!(meta["total_tokens"], 3);
    assert_eq!(meta["skipped_events"], 0);
    assert_eq!(h.transport.recorded()[0].body.as_ref().unwrap()["stream"], true);
}

#[tokio::test]
async fn test_streaming_failure_keeps_partial_content() {
    let h = harness(vec![Step::sse_then_reset(&[delta("Half "), delta("done")])]);
    let resp = h.dispatcher.call("chat_completion_stream", user("hi")).await;

    let body = resp.error_body().unwrap();
    assert_eq!(body["type"], "network_error");
    assert_eq!(body["partial_content"], "Half done");
    assert_eq!(h.transport.calls(), 1);
}

#[tokio::test]
async fn test_fim_rejects_empty_context_without_calling_upstream() {
    let h = harness(vec![Step::ok(fim_body(&[("x", 0.9)]))]);
    let resp = h
        .dispatcher
        .call("fim_completion", json!({"prompt": "", "suffix": ""}))
        .await;
    let body = resp.error_body().unwrap();
    assert_eq!(body["type"], "fim_boundary_error");
    assert_eq!(
        body["suggested_fix"],
        "Ensure prefix and suffix provide clear context boundaries"
    );
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn test_fim_picks_most_confident_alternative() {
    let h = harness(vec![Step::ok(fim_body(&[
        ("a + b", 0.72),
        ("a.wrapping_add(b)", 0.95),
        ("b + a", 0.95),
    ]))]);
    let args = json!({
        "prompt": "fn add(a: i32, b: i32) -> i32 {\n    ",
        "suffix": "\n}",
        "alternative_completions": 3
    });
    let resp = h.dispatcher.call("fim_completion", args.clone()).await;

    assert_eq!(resp.text_content(), "a.wrapping_add(b)");
    let meta = resp.metadata.clone().unwrap();
    assert_eq!(meta["confidence"], 0.95);
    assert_eq!(meta["alternatives"].as_array().unwrap().len(), 3);

    let sent = h.transport.recorded()[0].body.clone().unwrap();
    assert_eq!(sent["max_tokens"], 256);
    assert_eq!(sent["temperature"], 0.2);
    assert_eq!(sent["alternative_completions"], 3);

    // Confident and deterministic: the repeat is a cache hit
    let again = h.dispatcher.call("fim_completion", args).await;
    assert_eq!(again.text_content(), resp.text_content());
    assert_eq!(h.transport.calls(), 1);
}

#[tokio::test]
async fn test_fim_accepts_whole_float_token_budget() {
    let h = harness(vec![Step::ok(fim_body(&[("x", 0.9)]))]);
    let resp = h
        .dispatcher
        .call(
            "fim_completion",
            json!({"prompt": "let x = ", "suffix": ";", "max_middle_tokens": 64.0}),
        )
        .await;

    assert!(!resp.is_error, "{:?}", resp.error_body());
    let sent = h.transport.recorded()[0].body.clone().unwrap();
    assert_eq!(sent["max_tokens"], json!(64));
    assert_eq!(sent["max_middle_tokens"], json!(64));
}

#[tokio::test]
async fn test_low_confidence_fim_is_not_cached() {
    let h = harness(vec![
        Step::ok(fim_body(&[("guess", 0.5)])),
        Step::ok(fim_body(&[("guess again", 0.6)])),
    ]);
    let args = json!({"prompt": "let x = ", "suffix": ";", "max_middle_tokens": 16});

    h.dispatcher.call("fim_completion", args.clone()).await;
    let second = h.dispatcher.call("fim_completion", args).await;

    assert_eq!(second.text_content(), "guess again");
    assert_eq!(h.transport.calls(), 2);
    assert_eq!(h.transport.recorded()[0].body.as_ref().unwrap()["max_tokens"], 16);
}

#[tokio::test]
async fn test_models_are_enriched_and_cached() {
    let h = harness(vec![Step::ok(json!({"data": [
        {"id": "mercury-coder-small", "created": 1_700_000_000, "owned_by": "inception-labs"},
        {"id": "mercury-general", "created": 1_700_000_000, "owned_by": "inception-labs", "context_window": 65536}
    ]}))]);

    let resp = h.dispatcher.call("list_models", json!({})).await;
    let listing: Value = serde_json::from_str(&resp.text_content()).unwrap();
    assert_eq!(listing["total_models"], 2);
    assert_eq!(listing["default_model"], "mercury-coder-small");
    assert_eq!(listing["models"][0]["specifications"]["supports_fim"], true);
    assert_eq!(listing["models"][1]["specifications"]["context_window"], 65536);
    assert_eq!(listing["models"][1]["specifications"]["supports_fim"], false);

    let again = h.dispatcher.call("list_models", json!({})).await;
    assert_eq!(again, resp);
    assert_eq!(h.transport.calls(), 1);
}

#[tokio::test]
async fn test_model_listing_failure_carries_fallback() {
    let h = harness(vec![Step::error(503, "server_error", "maintenance")]);
    let resp = h.dispatcher.call("list_models", Value::Null).await;
    let body = resp.error_body().unwrap();
    assert_eq!(body["type"], "server_error");
    assert_eq!(body["fallback"]["models"][0]["id"], "mercury-coder-small");
}
