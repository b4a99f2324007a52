pub mod agent;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod render;
pub mod schema;

pub use error::{Error, Result};
pub use orchestration::{Pipeline, PipelineOutcome};
