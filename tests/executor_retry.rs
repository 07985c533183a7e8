//! Retry, backoff and timeout behavior of the request executor, driven by a
//! scripted transport on a paused clock.

mod common;

use common::{chat_body, client, delta, policy, ScriptedTransport, Step};
use diffusion_gateway::client::{classify, Operation, RequestSpec};
use diffusion_gateway::types::{ChatCompletionRequest, Message};
use diffusion_gateway::{Error, ErrorKind};
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;

fn chat_request() -> ChatCompletionRequest {
    ChatCompletionRequest::new("mercury-coder-small", vec![Message::user("hello")])
}

#[tokio::test(start_paused = true)]
async fn test_retry_bound_is_max_retries_plus_one() {
    let transport = ScriptedTransport::new(vec![
        Step::error(503, "server_error", "overloaded"),
        Step::error(503, "server_error", "overloaded"),
        Step::error(503, "server_error", "overloaded"),
        Step::error(503, "server_error", "overloaded"),
        Step::ok(chat_body("never reached")),
    ]);
    let client = client(&transport, policy(3));

    let start = Instant::now();
    let err = client.chat_completion(&chat_request()).await.unwrap_err();

    assert_eq!(transport.calls(), 4);
    assert!(matches!(err, Error::Remote { status: 503, .. }));
    assert_eq!(classify(&err).kind, ErrorKind::Server);
    // 1s + 2s + 4s of backoff
    assert!(start.elapsed() >= Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_overrides_backoff() {
    let transport = ScriptedTransport::new(vec![
        Step::rate_limited(Duration::from_secs(5)),
        Step::ok(chat_body("hi")),
    ]);
    let client = client(&transport, policy(3));

    let start = Instant::now();
    let (resp, stats) = client.chat_completion(&chat_request()).await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(5));
    assert_eq!(resp.content(), "hi");
    assert_eq!(stats.total_attempts(), 2);
    assert_eq!(stats.attempts[0].attempt_number, 1);
    assert_eq!(stats.attempts[0].cause, ErrorKind::RateLimit);
    assert_eq!(stats.attempts[0].delay, Duration::from_secs(5));
    assert_eq!(stats.http_status, Some(200));
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_is_not_capped() {
    let transport = ScriptedTransport::new(vec![
        Step::rate_limited(Duration::from_secs(30)),
        Step::ok(chat_body("late")),
    ]);
    let client = client(&transport, policy(1));

    let (_, stats) = client.chat_completion(&chat_request()).await.unwrap();
    assert_eq!(stats.attempts[0].delay, Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_authentication_failure_is_not_retried() {
    let transport = ScriptedTransport::new(vec![
        Step::error(401, "invalid_api_key", "Invalid API key"),
        Step::ok(chat_body("never reached")),
    ]);
    let client = client(&transport, policy(3));

    let err = client.chat_completion(&chat_request()).await.unwrap_err();
    assert_eq!(transport.calls(), 1);
    let c = classify(&err);
    assert_eq!(c.kind, ErrorKind::Authentication);
    assert!(!c.retryable);
    assert_eq!(err.user_message(), "Invalid API key");
}

#[tokio::test(start_paused = true)]
async fn test_hung_attempt_times_out_and_is_retried() {
    let transport = ScriptedTransport::new(vec![Step::Hang, Step::ok(chat_body("second try"))]);
    let client = client(&transport, policy(2));
    let spec = RequestSpec::new(Operation::ChatCompletions)
        .with_body(json!({"model": "m", "messages": []}))
        .with_timeout(Duration::from_secs(2));

    let start = Instant::now();
    let (body, stats) = client.executor().execute_with_stats::<Value>(&spec).await.unwrap();

    assert_eq!(body["choices"][0]["message"]["content"], "second try");
    assert_eq!(stats.attempts.len(), 1);
    assert_eq!(stats.attempts[0].cause, ErrorKind::Timeout);
    // 2s timeout + 1s backoff
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_surfaces_after_exhaustion() {
    let transport = ScriptedTransport::new(vec![Step::Hang, Step::Hang]);
    let client = client(&transport, policy(1));
    let spec = RequestSpec::new(Operation::ListModels).with_timeout(Duration::from_millis(500));

    let err = client.executor().execute::<Value>(&spec).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_network_error_is_retried_with_one_request_id() {
    let transport = ScriptedTransport::new(vec![
        Step::ConnectionError("connection refused"),
        Step::ok(json!({"data": [{"id": "mercury-coder-small", "owned_by": "inception-labs"}]})),
    ]);
    let client = client(&transport, policy(3));

    let (models, stats) = client.list_models().await.unwrap();
    assert_eq!(models.data[0].id, "mercury-coder-small");
    assert_eq!(stats.attempts[0].cause, ErrorKind::Network);

    let seen = transport.recorded();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].request_id, seen[1].request_id);
    assert_eq!(seen[0].request_id, stats.client_request_id);
    assert_eq!(stats.client_request_id.len(), 36);
    assert_eq!(
        stats.upstream_request_id.as_deref(),
        Some(format!("up-{}", stats.client_request_id).as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn test_convergence_signal_in_body_is_retryable() {
    let transport = ScriptedTransport::new(vec![
        Step::error(422, "diffusion_convergence_error", "Diffusion failed to converge"),
        Step::ok(chat_body("converged")),
    ]);
    let client = client(&transport, policy(2));

    let (resp, stats) = client.chat_completion(&chat_request()).await.unwrap();
    assert_eq!(resp.content(), "converged");
    assert_eq!(stats.attempts[0].cause, ErrorKind::ModelConvergence);
}

#[tokio::test(start_paused = true)]
async fn test_stream_handshake_is_retried() {
    let transport = ScriptedTransport::new(vec![
        Step::error(502, "server_error", "bad gateway"),
        Step::sse(&[delta("Hel"), delta("lo")]),
    ]);
    let client = client(&transport, policy(2));

    let (mut chunks, stats) = client.chat_completion_stream(&chat_request()).await.unwrap();
    let mut text = String::new();
    while let Some(chunk) = chunks.next().await {
        text.push_str(chunk.unwrap().content().unwrap_or_default());
    }

    assert_eq!(text, "Hello");
    assert_eq!(stats.total_attempts(), 2);
    let seen = transport.recorded();
    assert!(seen.iter().all(|r| r.stream));
    assert_eq!(seen[1].body.as_ref().unwrap()["stream"], true);
}

#[tokio::test(start_paused = true)]
async fn test_mid_stream_failure_is_not_replayed() {
    let transport = ScriptedTransport::new(vec![
        Step::sse_then_reset(&[delta("partial")]),
        Step::sse(&[delta("should not be used")]),
    ]);
    let client = client(&transport, policy(3));

    let (mut chunks, _) = client.chat_completion_stream(&chat_request()).await.unwrap();
    let first = chunks.next().await.unwrap().unwrap();
    assert_eq!(first.content(), Some("partial"));
    let err = chunks.next().await.unwrap().unwrap_err();
    assert_eq!(classify(&err).kind, ErrorKind::Network);
    assert!(chunks.next().await.is_none());
    assert_eq!(transport.calls(), 1);
}
