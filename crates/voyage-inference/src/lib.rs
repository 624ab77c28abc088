//! Voyage Inference crate - stateless access to the language model.
//!
//! Provides the `InferenceGateway` trait (text completion, schema-constrained
//! JSON generation, token streaming), an OpenAI-compatible HTTP
//! implementation that also serves embeddings, and a scripted gateway for
//! tests and offline runs.

mod error;
pub mod gateway;
pub mod mock;
mod openai;
mod types;

pub use error::GatewayError;
pub use gateway::{parse_json_output, InferenceGateway, TextStream};
pub use mock::{Reply, ScriptedGateway};
pub use openai::OpenAiCompatGateway;
pub use types::{CompletionRequest, Message, Role};
