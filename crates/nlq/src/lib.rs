//! The natural-language query pipeline.
//!
//! One request flows: tenancy → schema → cache lookup → prompt → model →
//! validator → executor (with bounded self-correction) → cache store →
//! shaping. The validator and executor live in their own crates; this one
//! owns prompt construction, the correction state machine, the result
//! cache, the response envelope, and the wiring.

pub mod cache;
pub mod controller;
pub mod envelope;
pub mod pipeline;
pub mod prompt;
pub mod shape;

pub use cache::{CacheError, CacheKey, DynamoCache, MemoryCache, ResponseCache};
pub use controller::{correct_and_execute, Outcome};
pub use envelope::AskResponse;
pub use pipeline::{AskError, NlqPipeline};
pub use prompt::PromptContext;
pub use shape::{shape, Shaped};
