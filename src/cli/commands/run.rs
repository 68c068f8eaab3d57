//! Run command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::{Output, ProviderArg};
use crate::config::Settings;
use crate::feed::{parse_bound, TimeWindow};
use crate::log::RunLogger;
use crate::pipeline::Pipeline;
use anyhow::Result;
use chrono::{Duration, Utc};
use std::path::Path;

/// Default look-back when no window is given.
const DEFAULT_WINDOW_HOURS: u32 = 24;

/// Options for the run command.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub channels: Vec<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub last: Option<u32>,
    pub output_dir: Option<String>,
    pub model: Option<String>,
    pub provider: Option<ProviderArg>,
    pub api_keys: Vec<String>,
    pub no_save: bool,
}

/// Run the monitor once over the requested window.
pub async fn run_pipeline(options: RunOptions, mut settings: Settings, config_path: &Path) -> Result<()> {
    let window = resolve_window(&options)?;
    apply_overrides(&mut settings, &options);

    if !options.no_save {
        settings.save_to(&config_path.to_path_buf())?;
    }

    let api_keys = if options.api_keys.is_empty() {
        settings.resolve_api_keys()
    } else {
        options.api_keys.clone()
    };

    if let Err(e) = preflight::check(Operation::Run, &settings, &api_keys) {
        Output::error(&format!("{}", e));
        Output::info("Run 'tubedigest doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    if settings.general.channels.is_empty() {
        Output::warning("No channels configured. Pass --channel or add them to the config file.");
    }

    let log = RunLogger::console();
    let mut pipeline = Pipeline::from_settings(&settings, api_keys, log)?;

    match pipeline.run(&settings.general.channels, window).await {
        Ok(run) => {
            Output::header("Run complete");
            Output::kv("Output", &run.output_root.display().to_string());
            Output::kv("Videos found", &run.discovered.to_string());
            Output::kv("Reports", &run.created_reports.len().to_string());
            for report in &run.created_reports {
                Output::list_item(&report.display().to_string());
            }
            if !run.skipped.is_empty() {
                Output::kv("Skipped", &run.skipped.len().to_string());
                for skipped in &run.skipped {
                    Output::list_item(&format!("{} ({})", skipped.title, skipped.reason));
                }
            }
            if !run.deferred_live.is_empty() {
                Output::warning(&format!(
                    "{} live event(s) deferred, run again once they have ended.",
                    run.deferred_live.len()
                ));
            }
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Run aborted: {}", e));
            Err(e.into())
        }
    }
}

/// Work out the time window from the command line.
fn resolve_window(options: &RunOptions) -> Result<TimeWindow> {
    let now = Utc::now();

    if let Some(hours) = options.last {
        return Ok(TimeWindow::new(now - Duration::hours(i64::from(hours)), now)?);
    }

    let end = match &options.end {
        Some(raw) => parse_bound(raw)?,
        None => now,
    };
    let start = match &options.start {
        Some(raw) => parse_bound(raw)?,
        None => end - Duration::hours(i64::from(DEFAULT_WINDOW_HOURS)),
    };

    Ok(TimeWindow::new(start, end)?)
}

fn apply_overrides(settings: &mut Settings, options: &RunOptions) {
    if !options.channels.is_empty() {
        settings.general.channels = options
            .channels
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
    }
    if let Some(dir) = &options.output_dir {
        settings.general.output_dir = dir.clone();
    }
    if let Some(model) = &options.model {
        settings.transcription.model = model.clone();
    }
    if let Some(provider) = options.provider {
        settings.transcription.provider = provider.into();
    }
}
