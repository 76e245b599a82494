pub mod config;
pub mod identity;

pub use config::Config;
pub use identity::{AskRequest, Caller};
