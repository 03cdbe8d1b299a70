pub mod client;
pub mod types;

pub use client::{AiClient, AiClientError, ChatCompleter};
pub use types::{ChatMessage, ChatRole, CompletionRequest, CompletionResponse};
