pub mod client;
pub mod errors;
pub mod retry;
pub mod types;

pub use client::{ClaudeClient, ClaudeClientConfig};
pub use errors::ClaudeApiError;
pub use retry::RetryPolicy;
pub use types::{ContentBlock, Message, MessageRequest, MessageResponse, Usage};
