pub mod provider;
pub mod providers;
pub mod reply;

pub use provider::{Decoding, LlmError, LlmProvider, Prompt};
pub use providers::create_provider;
pub use reply::{LlmReply, ModelError, NlqModel};
