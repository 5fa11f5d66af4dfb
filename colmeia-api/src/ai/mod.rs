//! AI microservice proxy: client, reply interpretation, interaction history
//! and the task assistant's workspace context.

pub mod client;
pub mod context;
pub mod history;
pub mod proxy;

pub use client::{AiCallOutcome, AiClient, AiTransportError};
pub use context::build_workspace_context;
pub use proxy::{interpret, AiCall, AiFailure};
