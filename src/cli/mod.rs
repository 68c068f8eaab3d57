//! CLI module for tubedigest.

pub mod commands;
mod output;
pub mod preflight;

pub use output::{mask_secret, Output, TranscriptionBar};

use crate::config::TranscriptionProvider;
use clap::{Parser, Subcommand, ValueEnum};

/// tubedigest - YouTube channel monitor and summarizer
///
/// Finds new videos on a set of channels, transcribes them and writes a
/// Markdown summary report for each one.
#[derive(Parser, Debug)]
#[command(name = "tubedigest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Transcription engine selectable on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderArg {
    /// Hosted OpenAI Whisper
    Whisper,
    /// Local whisper.cpp binary
    Local,
}

impl From<ProviderArg> for TranscriptionProvider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Whisper => TranscriptionProvider::Whisper,
            ProviderArg::Local => TranscriptionProvider::Local,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check channels for videos in a time window and write summary reports
    Run {
        /// Channel URL (repeatable). Replaces the configured channel list.
        #[arg(long = "channel", value_name = "URL")]
        channels: Vec<String>,

        /// Window start: RFC 3339, or "YYYY-MM-DD HH:MM[:SS]" in local time
        #[arg(long, conflicts_with = "last")]
        start: Option<String>,

        /// Window end (defaults to now)
        #[arg(long, conflicts_with = "last")]
        end: Option<String>,

        /// Look back this many hours from now instead of giving --start/--end
        #[arg(long, value_name = "HOURS")]
        last: Option<u32>,

        /// Directory for run output
        #[arg(short, long)]
        output_dir: Option<String>,

        /// Transcription model
        #[arg(short, long)]
        model: Option<String>,

        /// Transcription engine
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,

        /// Gemini API key (repeatable, tried in order)
        #[arg(long = "api-key", value_name = "KEY")]
        api_keys: Vec<String>,

        /// Do not persist channels, output directory and model to the config file
        #[arg(long)]
        no_save: bool,
    },

    /// Transcribe a local audio or video file
    Transcribe {
        /// Path to the media file
        input: String,

        /// Write the transcript to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Transcription model
        #[arg(short, long)]
        model: Option<String>,

        /// Transcription engine
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,
    },

    /// Summarize an existing transcript file
    Summarize {
        /// Path to a plain-text transcript
        transcript: String,

        /// Video title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// Channel name
        #[arg(long, default_value = "Unknown Channel")]
        channel: String,

        /// Video link
        #[arg(long, default_value = "")]
        link: String,

        /// Write a full Markdown report to this file instead of printing the summary
        #[arg(short, long)]
        output: Option<String>,

        /// Gemini API key (repeatable, tried in order)
        #[arg(long = "api-key", value_name = "KEY")]
        api_keys: Vec<String>,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
