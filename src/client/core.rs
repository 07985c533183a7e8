use super::execution::{CallStats, RequestExecutor};
use super::request::{Operation, RequestSpec};
use crate::pipeline::{ChunkStream, StreamDecoder};
use crate::types::{
    ChatCompletionRequest, ChatCompletionResponse, FimCompletionRequest, FimCompletionResponse,
    ModelList, StreamChunk,
};
use crate::Result;

/// Typed client for the diffusion-LLM endpoints.
///
/// Every call goes through the shared [`RequestExecutor`], so all of them get
/// the same timeout, retry and backoff behavior.
pub struct UpstreamClient {
    pub(crate) executor: RequestExecutor,
    pub(crate) decoder: StreamDecoder,
}

impl UpstreamClient {
    /// The executor behind every typed call.
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<(ChatCompletionResponse, CallStats)> {
        let mut body = request.clone();
        body.stream = false;
        let spec = RequestSpec::new(Operation::ChatCompletions).with_body(serde_json::to_value(&body)?);
        self.executor().execute_with_stats(&spec).await
    }

    /// Open a streamed chat completion. Only the handshake is retried.
    pub async fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<(ChunkStream<StreamChunk>, CallStats)> {
        let mut body = request.clone();
        body.stream = true;
        let spec = RequestSpec::new(Operation::ChatCompletions)
            .with_body(serde_json::to_value(&body)?)
            .streaming();
        let (feed, stats) = self.executor().execute_stream(&spec).await?;
        Ok((self.decoder.decode(feed), stats))
    }

    pub async fn fim_completion(
        &self,
        request: &FimCompletionRequest,
    ) -> Result<(FimCompletionResponse, CallStats)> {
        let spec = RequestSpec::new(Operation::FimCompletions).with_body(serde_json::to_value(request)?);
        self.executor().execute_with_stats(&spec).await
    }

    pub async fn list_models(&self) -> Result<(ModelList, CallStats)> {
        let spec = RequestSpec::new(Operation::ListModels);
        self.executor().execute_with_stats(&spec).await
    }
}
