//! Upstream client: request execution, retry policy, and failure classification.
//!
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod classification;
pub mod core;
pub mod execution;
pub mod policy;
pub mod request;

pub use builder::UpstreamClientBuilder;
pub use classification::{classify, Classification};
pub use core::UpstreamClient;
pub use execution::{CallStats, RequestExecutor, RetryAttempt};
pub use policy::{Decision, RetryPolicy};
pub use request::{Operation, RequestSpec};
