//! Failure classification.
//!
//! Maps any [`Error`] onto an [`ErrorKind`] plus the facts the retry policy and
//! the error envelope need. Domain signals in an upstream error body (diffusion
//! convergence, FIM boundary) win over the HTTP status table.

use crate::error_kind::ErrorKind;
use crate::Error;
use serde_json::{json, Map, Value};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub retryable: bool,
    /// Server-requested wait before the next attempt
    pub retry_after: Option<Duration>,
    /// Kind-specific facts, e.g. `{steps_completed, convergence_score}`
    pub metadata: Option<Value>,
}

impl Classification {
    fn of(kind: ErrorKind) -> Self {
        Self {
            kind,
            retryable: kind.retryable(),
            retry_after: None,
            metadata: None,
        }
    }
}

/// Classify a failure. Pure: inspects the error only.
pub fn classify(err: &Error) -> Classification {
    match err {
        Error::Remote {
            status,
            error_type,
            code,
            message,
            retry_after,
            details,
        } => classify_remote(*status, error_type, code.as_ref(), message, *retry_after, details.as_ref()),
        Error::Convergence {
            steps_completed,
            confidence,
        } => {
            let mut c = Classification::of(ErrorKind::ModelConvergence);
            let mut meta = Map::new();
            meta.insert("steps_completed".into(), json!(steps_completed));
            if let Some(score) = confidence {
                meta.insert("convergence_score".into(), json!(score));
            }
            c.metadata = Some(Value::Object(meta));
            c
        }
        Error::FimBoundary { .. } => Classification::of(ErrorKind::FimBoundary),
        Error::Timeout { .. } => Classification::of(ErrorKind::Timeout),
        Error::Transport(t) if t.is_timeout() => Classification::of(ErrorKind::Timeout),
        Error::Transport(_) => Classification::of(ErrorKind::Network),
        Error::Validation { .. } => Classification::of(ErrorKind::Validation),
        Error::Configuration { .. }
        | Error::Runtime { .. }
        | Error::Io(_)
        | Error::Serialization(_)
        | Error::Yaml(_) => Classification::of(ErrorKind::Execution),
    }
}

fn classify_remote(
    status: u16,
    error_type: &str,
    code: Option<&Value>,
    message: &str,
    retry_after: Option<Duration>,
    details: Option<&Value>,
) -> Classification {
    let code = code
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let error_type = error_type.to_ascii_lowercase();
    let names = [error_type.as_str(), code.as_str()];
    let by_status = ErrorKind::from_http_status(status);
    // A bare message is only trusted where the status itself is generic
    let message_hint = matches!(by_status, ErrorKind::Server | ErrorKind::Client)
        && message.to_ascii_lowercase().contains("converge");

    if names.iter().any(|n| n.contains("convergence")) || message_hint {
        let mut c = Classification::of(ErrorKind::ModelConvergence);
        c.retry_after = retry_after;
        c.metadata = details.and_then(convergence_metadata);
        return c;
    }

    if names
        .iter()
        .any(|n| n.contains("fim_boundary") || n.contains("context_mismatch"))
    {
        return Classification::of(ErrorKind::FimBoundary);
    }

    let mut c = Classification::of(by_status);
    if c.retryable {
        c.retry_after = retry_after;
    }
    c
}

fn convergence_metadata(details: &Value) -> Option<Value> {
    let pick = |keys: &[&str]| keys.iter().find_map(|k| details.get(*k)).cloned();
    let mut meta = Map::new();
    if let Some(steps) = pick(&["steps_completed", "stepsCompleted"]) {
        meta.insert("steps_completed".into(), steps);
    }
    if let Some(score) = pick(&["convergence_score", "convergenceScore"]) {
        meta.insert("convergence_score".into(), score);
    }
    if meta.is_empty() {
        None
    } else {
        Some(Value::Object(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    fn remote(status: u16, error_type: &str, message: &str) -> Error {
        Error::Remote {
            status,
            error_type: error_type.into(),
            code: None,
            message: message.into(),
            retry_after: None,
            details: None,
        }
    }

    #[test]
    fn test_status_table() {
        let cases = [
            (401, ErrorKind::Authentication, false),
            (429, ErrorKind::RateLimit, true),
            (500, ErrorKind::Server, true),
            (503, ErrorKind::Server, true),
            (400, ErrorKind::Client, false),
            (404, ErrorKind::Client, false),
        ];
        for (status, kind, retryable) in cases {
            let c = classify(&remote(status, "api_error", "boom"));
            assert_eq!(c.kind, kind, "status {}", status);
            assert_eq!(c.retryable, retryable, "status {}", status);
        }
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let err = Error::Remote {
            status: 429,
            error_type: "rate_limit_exceeded".into(),
            code: None,
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(5)),
            details: None,
        };
        let c = classify(&err);
        assert_eq!(c.kind, ErrorKind::RateLimit);
        assert_eq!(c.retry_after, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_convergence_signal_overrides_status() {
        let err = Error::Remote {
            status: 400,
            error_type: "invalid_request_error".into(),
            code: Some(json!("model_convergence_failed")),
            message: "generation failed".into(),
            retry_after: None,
            details: Some(json!({"steps_completed": 12, "convergence_score": 0.41})),
        };
        let c = classify(&err);
        assert_eq!(c.kind, ErrorKind::ModelConvergence);
        assert!(c.retryable);
        assert_eq!(
            c.metadata,
            Some(json!({"steps_completed": 12, "convergence_score": 0.41}))
        );

        let c = classify(&remote(500, "api_error", "Diffusion failed to converge"));
        assert_eq!(c.kind, ErrorKind::ModelConvergence);
        assert_eq!(c.metadata, None);
    }

    #[test]
    fn test_converge_wording_does_not_mask_auth_or_rate_limit() {
        let c = classify(&remote(401, "authentication_error", "token failed to converge"));
        assert_eq!(c.kind, ErrorKind::Authentication);
        assert!(!c.retryable);

        let c = classify(&remote(429, "rate_limit_exceeded", "queue did not converge"));
        assert_eq!(c.kind, ErrorKind::RateLimit);

        let c = classify(&remote(422, "invalid_request_error", "did not converge"));
        assert_eq!(c.kind, ErrorKind::ModelConvergence);
    }

    #[test]
    fn test_fim_boundary_signal() {
        let c = classify(&remote(422, "fim_boundary_error", "prefix and suffix overlap"));
        assert_eq!(c.kind, ErrorKind::FimBoundary);
        assert!(!c.retryable);
        let c = classify(&remote(400, "context_mismatch", "bad context"));
        assert_eq!(c.kind, ErrorKind::FimBoundary);
    }

    #[test]
    fn test_local_failures() {
        let c = classify(&Error::Timeout {
            after: Duration::from_secs(30),
        });
        assert_eq!((c.kind, c.retryable), (ErrorKind::Timeout, true));

        let c = classify(&Error::Transport(TransportError::Connection(
            "connection refused".into(),
        )));
        assert_eq!((c.kind, c.retryable), (ErrorKind::Network, true));

        let c = classify(&Error::runtime("handler bug"));
        assert_eq!((c.kind, c.retryable), (ErrorKind::Execution, false));

        let c = classify(&Error::Convergence {
            steps_completed: 20,
            confidence: Some(0.3),
        });
        assert_eq!(c.kind, ErrorKind::ModelConvergence);
        assert_eq!(
            c.metadata,
            Some(json!({"steps_completed": 20, "convergence_score": 0.3}))
        );
    }
}
