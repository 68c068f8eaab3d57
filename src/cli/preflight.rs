//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and credentials are available before a
//! command starts work that would otherwise fail midway.

use crate::config::{Settings, TranscriptionProvider};
use crate::error::{DigestError, Result};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Full run: download tools, a transcription engine and Gemini keys.
    Run,
    /// Manual transcription needs ffmpeg and a transcription engine.
    Transcribe,
    /// Summarizing needs Gemini keys only.
    Summarize,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings, api_keys: &[String]) -> Result<()> {
    match operation {
        Operation::Run => {
            check_tool("yt-dlp")?;
            check_tool("ffmpeg")?;
            check_tool("ffprobe")?;
            check_transcription(settings)?;
            check_gemini_keys(api_keys)?;
        }
        Operation::Transcribe => {
            check_tool("ffmpeg")?;
            check_tool("ffprobe")?;
            check_transcription(settings)?;
        }
        Operation::Summarize => {
            check_gemini_keys(api_keys)?;
        }
    }
    Ok(())
}

fn check_transcription(settings: &Settings) -> Result<()> {
    match settings.transcription.provider {
        TranscriptionProvider::Whisper => check_openai_api_key(),
        TranscriptionProvider::Local => check_tool_present(&settings.transcription.whisper_cli),
    }
}

fn check_gemini_keys(api_keys: &[String]) -> Result<()> {
    if api_keys.iter().any(|k| !k.trim().is_empty()) {
        Ok(())
    } else {
        Err(DigestError::Config(
            "No Gemini API key. Set it with: export GEMINI_API_KEY='...' (or GEMINI_API_KEYS=key1,key2)"
                .to_string(),
        ))
    }
}

/// Check if OpenAI API key is configured.
fn check_openai_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(DigestError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(DigestError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

/// Check if an external tool is available and answers a version query.
fn check_tool(name: &str) -> Result<()> {
    // ffmpeg/ffprobe use -version (single dash), others use --version
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    };
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(DigestError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(DigestError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(DigestError::ToolNotFound(format!("{}: {}", name, e))),
    }
}

/// Check that a binary can be launched at all. Its exit status is ignored.
fn check_tool_present(name: &str) -> Result<()> {
    match Command::new(name).arg("-h").output() {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(DigestError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(DigestError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
