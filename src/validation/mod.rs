//! Tool input validation.
//!
//! Every tool declares a JSON Schema for its arguments. [`ValidationGate`]
//! checks inbound arguments against it before a handler runs, reporting each
//! violation as `<field.path>: <message>` and filling in declared defaults.
//!
//! Supported keywords: `type`, `enum`, `const`, `minLength`, `maxLength`,
//! `pattern`, `minimum`, `maximum`, `exclusiveMinimum`, `exclusiveMaximum`,
//! `minItems`, `maxItems`, `items`, `required`, `properties`,
//! `additionalProperties`, `anyOf`, `default`, and `errorMessage`.
//!
//! ```rust
//! use diffusion_gateway::validation::ValidationGate;
//! use serde_json::json;
//!
//! let gate = ValidationGate::new(json!({
//!     "type": "object",
//!     "properties": {"prompt": {"type": "string"}},
//!     "required": ["prompt"]
//! }));
//! let result = gate.validate(&json!({}));
//! assert_eq!(result.error_messages(), vec!["prompt: Required".to_string()]);
//! ```

pub mod error;
pub mod validator;

pub use error::{ValidationError, ValidationResult};
pub use validator::ValidationGate;
