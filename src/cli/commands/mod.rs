//! CLI command implementations.

mod config;
mod doctor;
mod run;
mod summarize;
mod transcribe;

pub use config::run_config;
pub use doctor::run_doctor;
pub use run::{run_pipeline, RunOptions};
pub use summarize::{run_summarize, SummarizeOptions};
pub use transcribe::run_transcribe;
