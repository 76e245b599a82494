use shopsight_nlq::NlqPipeline;

/// Shared application state.
///
/// The pipeline is `None` when required configuration (LLM credentials,
/// Athena output location) is missing; `/ask` then answers 503 instead of
/// the process refusing to start.
pub struct AppState {
    pub pipeline: Option<NlqPipeline>,
}
