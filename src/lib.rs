//! tubedigest - YouTube channel monitor and summarizer
//!
//! Watches a set of channels for videos published in a time window, fetches
//! their audio, transcribes it and writes a Markdown summary report per video.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `feed` - Channel feed resolution and time-window filtering
//! - `media` - Audio acquisition (yt-dlp) and ffmpeg helpers
//! - `transcription` - Speech-to-text with throttled progress
//! - `dispatcher` - Key-rotating, rate-limit-aware generative API access
//! - `summary` - Two-phase abstract and summary prompting
//! - `report` - Report naming and Markdown rendering
//! - `pipeline` - Per-item stage driver with failure isolation
//! - `log` - Operator-facing run log
//! - `config` - Settings and prompt templates
//!
//! # Example
//!
//! ```rust,no_run
//! use tubedigest::config::Settings;
//! use tubedigest::feed::TimeWindow;
//! use tubedigest::log::RunLogger;
//! use tubedigest::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let keys = settings.resolve_api_keys();
//!     let mut pipeline = Pipeline::from_settings(&settings, keys, RunLogger::console())?;
//!
//!     let window = TimeWindow::parse("2025-01-01 06:00", "2025-01-01 08:00")?;
//!     let run = pipeline.run(&settings.general.channels, window).await?;
//!     println!("Wrote {} reports", run.created_reports.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod feed;
pub mod log;
pub mod media;
pub mod openai;
pub mod pipeline;
pub mod report;
pub mod summary;
pub mod transcription;

pub use error::{DigestError, Result};
