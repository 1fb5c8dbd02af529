pub mod config;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod schema;
pub mod sink;
pub mod source;

pub use error::{Origin, PipelineError, Result};
pub use pipeline::{Destination, Pipeline, RunConfig, RunSummary};
