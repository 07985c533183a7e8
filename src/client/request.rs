//! Upstream request description handed to the executor.

use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Upstream endpoint being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ChatCompletions,
    FimCompletions,
    ListModels,
}

impl Operation {
    pub fn method(&self) -> Method {
        match self {
            Operation::ChatCompletions | Operation::FimCompletions => Method::POST,
            Operation::ListModels => Method::GET,
        }
    }

    /// Path relative to the configured base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Operation::ChatCompletions => "/chat/completions",
            Operation::FimCompletions => "/fim/completions",
            Operation::ListModels => "/models",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::ChatCompletions => "chat_completions",
            Operation::FimCompletions => "fim_completions",
            Operation::ListModels => "list_models",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One logical upstream call: what to send and how long each attempt may take.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub operation: Operation,
    /// JSON body; `None` for GET requests
    pub body: Option<Value>,
    /// Per-attempt timeout overriding the executor default
    pub timeout: Option<Duration>,
    /// Ask for an event-stream response
    pub stream: bool,
}

impl RequestSpec {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            body: None,
            timeout: None,
            stream: false,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}
