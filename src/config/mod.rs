//! Configuration module for tubedigest.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, SummaryPrompts};
pub use settings::{
    split_keys, DispatcherSettings, GeneralSettings, PromptSettings, Settings, SummarySettings,
    TranscriptionProvider, TranscriptionSettings,
};
