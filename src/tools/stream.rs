use super::chat::{build_request, chat_schema};
use super::dispatcher::Tool;
use super::envelope::{ErrorEnvelope, ToolDescriptor, ToolResponse};
use super::{failure_envelope, performance, ToolContext};
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const STREAM_TOOL: &str = "chat_completion_stream";

/// Streamed chat completion, accumulated into one response.
///
/// Only the opening handshake is retried. A failure after the first chunk
/// returns an envelope carrying whatever content had arrived.
pub struct StreamingChatTool {
    ctx: ToolContext,
}

impl StreamingChatTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for StreamingChatTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: STREAM_TOOL.to_string(),
            description: "Generate a chat completion over a server-sent event stream. Output is \
                          accumulated and returned whole, with chunk statistics in metadata."
                .to_string(),
            input_schema: chat_schema(),
        }
    }

    async fn run(&self, params: Value) -> Result<ToolResponse> {
        let start = Instant::now();
        let diffusion = &self.ctx.config.diffusion;
        let request = match build_request(params, &self.ctx) {
            Ok(request) => request,
            Err(err) => return Ok(ErrorEnvelope::from_error(&err).into_response()),
        };
        let steps = request.diffusion_steps.unwrap_or(diffusion.default_steps);

        info!(
            tool = STREAM_TOOL,
            model = request.model.as_str(),
            messages = request.messages.len(),
            "starting streamed chat completion"
        );

        let (mut chunks, stats) = match self.ctx.client.chat_completion_stream(&request).await {
            Ok(ok) => ok,
            Err(err) => {
                warn!(tool = STREAM_TOOL, error = %err, "stream could not be opened");
                return Ok(failure_envelope(&err, steps, diffusion).into_response());
            }
        };

        let mut content = String::new();
        let mut chunk_count: u64 = 0;
        let mut content_chunks: u64 = 0;
        let mut finish_reason: Option<String> = None;

        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    chunk_count += 1;
                    if let Some(delta) = chunk.content() {
                        content.push_str(delta);
                        content_chunks += 1;
                    }
                    if let Some(reason) = chunk.finish_reason() {
                        finish_reason = Some(reason.to_string());
                    }
                    if chunk_count % 10 == 0 {
                        debug!(chunks = chunk_count, tokens = content_chunks, "stream progress");
                    }
                }
                Err(err) => {
                    chunks.close();
                    warn!(
                        tool = STREAM_TOOL,
                        chunks = chunk_count,
                        error = %err,
                        "stream failed mid-way"
                    );
                    let mut envelope = failure_envelope(&err, steps, diffusion);
                    if !content.is_empty() {
                        envelope = envelope.with_field("partial_content", content);
                    }
                    return Ok(envelope.into_response());
                }
            }
        }
        let elapsed = start.elapsed();
        let skipped = chunks.skipped_lines();

        info!(
            tool = STREAM_TOOL,
            chunks = chunk_count,
            total_tokens = content_chunks,
            skipped_events = skipped,
            duration_ms = elapsed.as_millis() as u64,
            "streamed chat completion finished"
        );

        Ok(ToolResponse::text(content).with_metadata(json!({
            "model": request.model,
            "streaming": true,
            "chunks": chunk_count,
            "total_tokens": content_chunks,
            "skipped_events": skipped,
            "finish_reason": finish_reason,
            "performance": performance(content_chunks, elapsed),
            "attempts": stats.total_attempts(),
        })))
    }
}
