//! Newline-delimited JSON-RPC 2.0 server for the tool protocol.
//!
//! Reads one request per line, handles each on its own task, and writes
//! replies through a single writer task so lines never interleave. Runs over
//! any `AsyncRead`/`AsyncWrite` pair; the binary uses stdin/stdout.

use crate::tools::{ToolDispatcher, ToolInvocation};
use crate::Result;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;
const REPLY_QUEUE: usize = 64;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Inbound message. A missing `id` marks a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Name and version reported by `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub struct ToolServer {
    dispatcher: Arc<ToolDispatcher>,
    info: ServerInfo,
}

impl ToolServer {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self {
            dispatcher,
            info: ServerInfo::default(),
        }
    }

    pub fn with_info(mut self, info: ServerInfo) -> Self {
        self.info = info;
        self
    }

    /// Serve until `reader` reaches EOF, then wait for in-flight requests.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<String>(REPLY_QUEUE);
        let writer_task = tokio::spawn(async move {
            let mut sink = FramedWrite::new(writer, LinesCodec::new());
            while let Some(line) = rx.recv().await {
                if let Err(e) = sink.send(line).await {
                    warn!(error = %e, "failed to write reply, closing output");
                    break;
                }
            }
        });

        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        info!(tools = self.dispatcher.len(), "tool server ready");

        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!(max = MAX_LINE_LENGTH, "inbound line too long, dropped");
                    let reply = JsonRpcResponse::failure(
                        Value::Null,
                        JsonRpcError::new(PARSE_ERROR, "Message too large"),
                    );
                    send(&tx, &reply).await;
                    continue;
                }
                Err(LinesCodecError::Io(e)) => {
                    drop(tx);
                    let _ = writer_task.await;
                    return Err(e.into());
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let request = match parse_request(&line) {
                Ok(request) => request,
                Err(reply) => {
                    send(&tx, &reply).await;
                    continue;
                }
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            let info = self.info.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(reply) = handle(&dispatcher, &info, request).await {
                    send(&tx, &reply).await;
                }
            });
        }

        info!("input closed, draining in-flight requests");
        // The writer ends once every request task has dropped its sender
        drop(tx);
        let _ = writer_task.await;
        Ok(())
    }
}

async fn send(tx: &mpsc::Sender<String>, reply: &JsonRpcResponse) {
    match serde_json::to_string(reply) {
        Ok(line) => {
            if tx.send(line).await.is_err() {
                debug!("output closed, reply dropped");
            }
        }
        Err(e) => warn!(error = %e, "reply is not serializable"),
    }
}

fn parse_request(line: &str) -> std::result::Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        warn!(error = %e, "inbound line is not JSON");
        JsonRpcResponse::failure(Value::Null, JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e)))
    })?;
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
        JsonRpcResponse::failure(
            id,
            JsonRpcError::new(INVALID_REQUEST, format!("Invalid request: {}", e)),
        )
    })
}

/// Handle one request; notifications produce no reply.
pub async fn handle(
    dispatcher: &ToolDispatcher,
    info: &ServerInfo,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let Some(id) = request.id else {
        debug!(method = request.method.as_str(), "notification received");
        return None;
    };
    let start = Instant::now();

    let outcome = match request.method.as_str() {
        "initialize" => {
            let version = request
                .params
                .as_ref()
                .and_then(|p| p.get("protocolVersion"))
                .and_then(Value::as_str)
                .unwrap_or(PROTOCOL_VERSION);
            Ok(json!({
                "protocolVersion": version,
                "capabilities": {"tools": {}},
                "serverInfo": info,
            }))
        }
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": dispatcher.list() })),
        "tools/call" => {
            let params = request.params.unwrap_or(Value::Null);
            match serde_json::from_value::<ToolInvocation>(params) {
                Ok(call) => {
                    let response = dispatcher.call(&call.name, call.arguments).await;
                    serde_json::to_value(response)
                        .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
                }
                Err(e) => Err(JsonRpcError::new(
                    INVALID_PARAMS,
                    format!("Invalid tools/call params: {}", e),
                )),
            }
        }
        other => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        )),
    };

    info!(
        method = request.method.as_str(),
        ok = outcome.is_ok(),
        duration_ms = start.elapsed().as_millis() as u64,
        "request handled"
    );
    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}
