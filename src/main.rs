//! tubedigest CLI entry point.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tubedigest::cli::commands::{self, RunOptions, SummarizeOptions};
use tubedigest::cli::{Cli, Commands};
use tubedigest::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("tubedigest={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let config_path = cli
        .config
        .as_ref()
        .map(|p| Settings::expand_path(p))
        .unwrap_or_else(Settings::default_config_path);
    let settings = Settings::load_from(Some(&config_path))?;

    // Execute command
    match cli.command {
        Commands::Run {
            channels,
            start,
            end,
            last,
            output_dir,
            model,
            provider,
            api_keys,
            no_save,
        } => {
            let options = RunOptions {
                channels,
                start,
                end,
                last,
                output_dir,
                model,
                provider,
                api_keys,
                no_save,
            };
            commands::run_pipeline(options, settings, &config_path).await?;
        }

        Commands::Transcribe {
            input,
            output,
            model,
            provider,
        } => {
            commands::run_transcribe(&input, output, model, provider, settings).await?;
        }

        Commands::Summarize {
            transcript,
            title,
            channel,
            link,
            output,
            api_keys,
        } => {
            let options = SummarizeOptions {
                transcript,
                title,
                channel,
                link,
                output,
                api_keys,
            };
            commands::run_summarize(options, settings).await?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings, &config_path)?;
        }

        Commands::Config { action } => {
            commands::run_config(&action, settings, &config_path)?;
        }
    }

    Ok(())
}
