//! Summarize command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Prompts, Settings};
use crate::feed::VideoItem;
use crate::log::RunLogger;
use crate::pipeline::build_summarizer;
use crate::report::render_report;
use crate::summary::{SourceRef, Summarizer};
use anyhow::Result;
use chrono::Utc;
use std::path::Path;

/// Options for the summarize command.
#[derive(Debug)]
pub struct SummarizeOptions {
    pub transcript: String,
    pub title: Option<String>,
    pub channel: String,
    pub link: String,
    pub output: Option<String>,
    pub api_keys: Vec<String>,
}

/// Summarize an existing transcript file.
pub async fn run_summarize(options: SummarizeOptions, settings: Settings) -> Result<()> {
    let api_keys = if options.api_keys.is_empty() {
        settings.resolve_api_keys()
    } else {
        options.api_keys.clone()
    };

    if let Err(e) = preflight::check(Operation::Summarize, &settings, &api_keys) {
        Output::error(&format!("{}", e));
        Output::info("Run 'tubedigest doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let transcript_path = Settings::expand_path(&options.transcript);
    let transcript = std::fs::read_to_string(&transcript_path).map_err(|e| {
        anyhow::anyhow!("Failed to read {}: {}", transcript_path.display(), e)
    })?;
    if transcript.trim().is_empty() {
        Output::error("Transcript file is empty.");
        return Err(anyhow::anyhow!("Empty transcript: {}", transcript_path.display()));
    }

    let source = SourceRef {
        title: options
            .title
            .clone()
            .unwrap_or_else(|| title_from_path(&transcript_path)),
        channel: options.channel.clone(),
        link: options.link.clone(),
    };

    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;
    let mut summarizer = build_summarizer(&settings, api_keys, prompts)?;

    let log = RunLogger::console();
    let Some(summary) = summarizer.summarize(&transcript, &source, &log).await else {
        Output::error("Summary generation failed. See the log above for details.");
        return Err(anyhow::anyhow!("Summary generation failed"));
    };

    match &options.output {
        Some(path) => {
            let item = VideoItem {
                id: String::new(),
                title: source.title.clone(),
                channel_name: source.channel.clone(),
                published: Utc::now(),
                link: source.link.clone(),
            };
            let path = Settings::expand_path(path);
            std::fs::write(&path, render_report(&item, &summary))?;
            Output::success(&format!("Report written to {}", path.display()));
        }
        None => println!("\n{}\n", summary.summary_content),
    }

    Ok(())
}

fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.replace(['_', '-'], " "))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_path() {
        assert_eq!(title_from_path(Path::new("/tmp/my_talk-notes.txt")), "my talk notes");
        assert_eq!(title_from_path(Path::new("/")), "Untitled");
    }
}
