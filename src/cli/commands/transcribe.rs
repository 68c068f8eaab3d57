//! Transcribe command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::{Output, ProviderArg, TranscriptionBar};
use crate::config::{Settings, TranscriptionProvider};
use crate::transcription::{LocalWhisperTranscriber, Transcriber, WhisperTranscriber};
use anyhow::Result;
use std::path::Path;
use std::time::Duration;

/// Transcribe one local media file, printing or saving the text.
pub async fn run_transcribe(
    input: &str,
    output: Option<String>,
    model: Option<String>,
    provider: Option<ProviderArg>,
    mut settings: Settings,
) -> Result<()> {
    if let Some(provider) = provider {
        settings.transcription.provider = provider.into();
    }
    let model = model.unwrap_or_else(|| settings.transcription.model.clone());

    if let Err(e) = preflight::check(Operation::Transcribe, &settings, &[]) {
        Output::error(&format!("{}", e));
        Output::info("Run 'tubedigest doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let input_path = Settings::expand_path(input);
    if !input_path.is_file() {
        Output::error(&format!("File not found: {}", input_path.display()));
        return Err(anyhow::anyhow!("File not found: {}", input_path.display()));
    }

    let interval = Duration::from_secs(settings.transcription.progress_interval_secs);
    let transcriber: Box<dyn Transcriber> = match settings.transcription.provider {
        TranscriptionProvider::Whisper => Box::new(WhisperTranscriber::with_config(
            settings.transcription.segment_seconds,
            interval,
        )?),
        TranscriptionProvider::Local => Box::new(LocalWhisperTranscriber::new(
            settings.transcription.whisper_cli.clone(),
            interval,
        )),
    };

    Output::info(&format!(
        "Transcribing {} with {} ({})",
        input_path.display(),
        model,
        settings.transcription.provider
    ));

    let bar = TranscriptionBar::new("Transcribing...");
    let result = transcriber.transcribe(&input_path, &model, &bar).await;
    bar.finish();

    let transcript = match result {
        Ok(text) => text,
        Err(e) => {
            Output::error(&format!("Transcription failed: {}", e));
            return Err(e.into());
        }
    };

    match output {
        Some(path) => {
            let path = Settings::expand_path(&path);
            write_transcript(&path, &transcript)?;
            Output::success(&format!(
                "Transcript ({} characters) written to {}",
                transcript.chars().count(),
                path.display()
            ));
        }
        None => println!("{}", transcript),
    }

    Ok(())
}

fn write_transcript(path: &Path, transcript: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, transcript)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_transcript_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");
        write_transcript(&path, "hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }
}
