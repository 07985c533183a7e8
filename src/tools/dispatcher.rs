//! Tool registry and dispatch.
//!
//! The registry is assembled once through [`ToolDispatcherBuilder`] and is
//! read-only afterwards. Every call goes through the same wrapper: look up,
//! validate, run, and turn any failure (including a panic) into an envelope.

use super::envelope::{ErrorEnvelope, ToolDescriptor, ToolResponse};
use crate::error::ErrorContext;
use crate::error_kind::ErrorKind;
use crate::logging::redact;
use crate::validation::ValidationGate;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::FutureExt;
use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A callable tool.
///
/// `run` receives arguments that already passed the descriptor's input
/// schema, with schema defaults filled in. Upstream failures should be
/// returned as `Ok` error envelopes; an `Err` is reported as `execution_error`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn run(&self, params: Value) -> Result<ToolResponse>;
}

struct Registered {
    descriptor: ToolDescriptor,
    gate: ValidationGate,
    tool: Arc<dyn Tool>,
}

#[derive(Default)]
pub struct ToolDispatcherBuilder {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolDispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Rejects duplicate names and input schemas that are not valid draft-7.
    pub fn build(self) -> Result<ToolDispatcher> {
        let mut entries = Vec::with_capacity(self.tools.len());
        let mut index = HashMap::new();

        for tool in self.tools {
            let descriptor = tool.descriptor();
            if index.contains_key(&descriptor.name) {
                return Err(Error::configuration_with_context(
                    format!("Tool '{}' is registered twice", descriptor.name),
                    ErrorContext::new().with_field_path(descriptor.name.clone()),
                ));
            }
            JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&descriptor.input_schema)
                .map_err(|e| {
                    Error::configuration_with_context(
                        format!("Tool '{}' has an invalid input schema: {}", descriptor.name, e),
                        ErrorContext::new()
                            .with_field_path(format!("{}.inputSchema", descriptor.name)),
                    )
                })?;

            index.insert(descriptor.name.clone(), entries.len());
            entries.push(Registered {
                gate: ValidationGate::new(descriptor.input_schema.clone()),
                descriptor,
                tool,
            });
        }

        Ok(ToolDispatcher { entries, index })
    }
}

/// Routes `tools/call` requests to registered tools.
pub struct ToolDispatcher {
    entries: Vec<Registered>,
    index: HashMap<String, usize>,
}

impl ToolDispatcher {
    pub fn builder() -> ToolDispatcherBuilder {
        ToolDispatcherBuilder::new()
    }

    /// Descriptors in registration order.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.entries.iter().map(|e| e.descriptor.clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.descriptor.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke `name`. Never fails: every failure is an error envelope.
    pub async fn call(&self, name: &str, arguments: Value) -> ToolResponse {
        let start = Instant::now();
        let Some(entry) = self.index.get(name).map(|&i| &self.entries[i]) else {
            warn!(tool = name, "unknown tool requested");
            return ErrorEnvelope::new(ErrorKind::ToolNotFound, format!("Unknown tool: {}", name))
                .with_field("available_tools", json!(self.names()))
                .into_response();
        };

        debug!(tool = name, arguments = %redact(&arguments), "tool call received");

        let validated = entry.gate.validate(&arguments);
        if !validated.is_valid() {
            let messages = validated.error_messages();
            warn!(tool = name, errors = ?messages, "tool arguments rejected");
            return ErrorEnvelope::new(
                ErrorKind::Validation,
                format!("Invalid input parameters: {}", messages.join("; ")),
            )
            .with_field("errors", json!(validated.errors))
            .into_response();
        }
        let params = validated.data.unwrap_or(Value::Null);

        let outcome = AssertUnwindSafe(entry.tool.run(params)).catch_unwind().await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                error!(tool = name, error = %err, "tool handler failed");
                execution_error(name, err.user_message())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(tool = name, panic = message.as_str(), "tool handler panicked");
                execution_error(name, message)
            }
        };

        info!(
            tool = name,
            is_error = response.is_error,
            duration_ms = start.elapsed().as_millis() as u64,
            "tool call finished"
        );
        response
    }
}

fn execution_error(tool: &str, message: String) -> ToolResponse {
    ErrorEnvelope::new(ErrorKind::Execution, message)
        .with_field("tool", tool)
        .into_response()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Tool execution failed".to_string()
    }
}
