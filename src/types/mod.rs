//! # Types Module
//!
//! Strongly-typed representations of the upstream diffusion-LLM wire format.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`message`] | Chat messages and roles |
//! | [`request`] | Chat and fill-in-the-middle request bodies |
//! | [`response`] | Completion, model list, and error bodies |
//! | [`stream`] | Incremental chunks of a streamed chat completion |
//! | [`tool`] | Function-calling definitions forwarded to the model |
//!
//! Response types default every optional field so a partial or newer upstream
//! body still deserializes.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{Message, MessageRole};
pub use request::{ChatCompletionRequest, FimCompletionRequest, NoiseSchedule, StopSequence};
pub use response::{
    ApiErrorBody, ApiErrorDetail, ChatChoice, ChatCompletionResponse, DiffusionMetadata,
    FimChoice, FimCompletionResponse, FimMetadata, Model, ModelList, Usage,
};
pub use stream::{Delta, StreamChoice, StreamChunk};
pub use tool::{FunctionCall, FunctionDefinition, ToolCall, ToolDefinition};
