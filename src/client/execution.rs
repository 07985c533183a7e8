//! Request execution: one logical upstream call with per-attempt timeout,
//! bounded retries and rate-limit-aware backoff.

use super::classification::classify;
use super::policy::{Decision, RetryPolicy};
use super::request::{Operation, RequestSpec};
use crate::error_kind::ErrorKind;
use crate::transport::{HttpReply, Transport};
use crate::types::ApiErrorBody;
use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// A failed attempt that was retried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryAttempt {
    /// 1-based number of the failed attempt
    pub attempt_number: u32,
    pub cause: ErrorKind,
    /// Wait before the next attempt
    #[serde(serialize_with = "serialize_millis", rename = "delay_ms")]
    pub delay: Duration,
}

fn serialize_millis<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Per-call statistics, reported alongside a successful result.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStats {
    /// UUID v4 sent as `x-request-id`
    pub client_request_id: String,
    pub operation: Operation,
    pub http_status: Option<u16>,
    pub attempts: Vec<RetryAttempt>,
    pub duration: Duration,
    pub upstream_request_id: Option<String>,
}

impl CallStats {
    /// Total attempts made, including the successful one.
    pub fn total_attempts(&self) -> u32 {
        self.attempts.len() as u32 + 1
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

enum Outcome {
    /// Fully read 2xx body
    Body {
        status: u16,
        upstream_request_id: Option<String>,
        bytes: Vec<u8>,
    },
    /// 2xx reply whose body is still unread
    Stream(HttpReply),
}

pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            transport,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<T> {
        self.execute_with_stats(spec).await.map(|(value, _)| value)
    }

    /// Send, read the full body, deserialize into `T`; retry per policy.
    pub async fn execute_with_stats<T: DeserializeOwned>(
        &self,
        spec: &RequestSpec,
    ) -> Result<(T, CallStats)> {
        let (outcome, mut stats) = self.run(spec, false).await?;
        let Outcome::Body {
            status,
            upstream_request_id,
            bytes,
        } = outcome
        else {
            return Err(Error::runtime("streaming outcome for a buffered request"));
        };
        stats.http_status = Some(status);
        stats.upstream_request_id = upstream_request_id;

        let value = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(
                operation = spec.operation.name(),
                client_request_id = stats.client_request_id.as_str(),
                error = %e,
                "upstream returned an undecodable body"
            );
            Error::Serialization(e)
        })?;
        Ok((value, stats))
    }

    /// Retries only until 2xx headers arrive; the body feed is then handed
    /// back as-is and never replayed.
    pub async fn execute_stream(
        &self,
        spec: &RequestSpec,
    ) -> Result<(BoxStream<'static, Bytes>, CallStats)> {
        let (outcome, mut stats) = self.run(spec, true).await?;
        let Outcome::Stream(reply) = outcome else {
            return Err(Error::runtime("buffered outcome for a streaming request"));
        };
        stats.http_status = Some(reply.status);
        stats.upstream_request_id = reply.upstream_request_id;
        Ok((reply.body, stats))
    }

    async fn run(&self, spec: &RequestSpec, streaming: bool) -> Result<(Outcome, CallStats)> {
        let client_request_id = Uuid::new_v4().to_string();
        let per_attempt = spec.timeout.unwrap_or(self.timeout);
        let start = Instant::now();
        let mut attempts: Vec<RetryAttempt> = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            let result =
                match tokio::time::timeout(per_attempt, self.attempt(spec, &client_request_id, streaming))
                    .await
                {
                    Ok(r) => r,
                    // Dropping the attempt future aborts the in-flight HTTP call
                    Err(_) => Err(Error::Timeout { after: per_attempt }),
                };

            match result {
                Ok(outcome) => {
                    let stats = CallStats {
                        client_request_id,
                        operation: spec.operation,
                        http_status: None,
                        attempts,
                        duration: start.elapsed(),
                        upstream_request_id: None,
                    };
                    info!(
                        operation = spec.operation.name(),
                        attempts = stats.total_attempts(),
                        duration_ms = stats.duration_ms(),
                        client_request_id = stats.client_request_id.as_str(),
                        "upstream request succeeded"
                    );
                    return Ok((outcome, stats));
                }
                Err(err) => {
                    let classification = classify(&err);
                    match self.policy.decide(&classification, attempt) {
                        Decision::Retry { delay } => {
                            warn!(
                                operation = spec.operation.name(),
                                attempt = attempt + 1,
                                error_kind = classification.kind.name(),
                                delay_ms = delay.as_millis() as u64,
                                client_request_id = client_request_id.as_str(),
                                error = %err,
                                "upstream attempt failed, retrying"
                            );
                            attempts.push(RetryAttempt {
                                attempt_number: attempt + 1,
                                cause: classification.kind,
                                delay,
                            });
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        Decision::Fail => {
                            info!(
                                operation = spec.operation.name(),
                                attempts = attempt + 1,
                                error_kind = classification.kind.name(),
                                retryable = classification.retryable,
                                duration_ms = start.elapsed().as_millis() as u64,
                                client_request_id = client_request_id.as_str(),
                                "upstream request failed"
                            );
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    /// One attempt. Non-2xx replies become `Error::Remote` with the parsed body.
    async fn attempt(&self, spec: &RequestSpec, request_id: &str, streaming: bool) -> Result<Outcome> {
        let reply = self.transport.send(spec, request_id).await?;

        if !reply.is_success() {
            return Err(remote_error(reply).await);
        }
        if streaming {
            return Ok(Outcome::Stream(reply));
        }
        let HttpReply {
            status,
            upstream_request_id,
            body,
            ..
        } = reply;
        let bytes = read_body(body).await?;
        Ok(Outcome::Body {
            status,
            upstream_request_id,
            bytes,
        })
    }
}

async fn read_body(mut body: BoxStream<'static, Bytes>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf)
}

async fn remote_error(reply: HttpReply) -> Error {
    let HttpReply {
        status,
        reason,
        retry_after,
        body,
        ..
    } = reply;
    // A body that fails mid-read still yields a status-based error
    let bytes = read_body(body).await.unwrap_or_default();
    let (parsed, details) = ApiErrorBody::parse(&bytes, status, &reason);
    Error::Remote {
        status,
        error_type: parsed.error.error_type,
        code: parsed.error.code,
        message: parsed.error.message,
        retry_after,
        details,
    }
}
