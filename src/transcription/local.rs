//! Local whisper.cpp transcription.
//!
//! `whisper-cli` has no progress callback, so the timestamped lines it prints
//! are parsed here and turned into [`TranscriptionProgress`] events. Nothing
//! outside this adapter looks at the tool's output.

use super::{ProgressSink, ProgressThrottle, Transcriber, TranscriptionProgress};
use crate::error::{DigestError, Result};
use crate::media::ffmpeg::{convert_to_wav, probe_duration};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// One parsed output line: the end timestamp and the spoken text.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedLine {
    pub end_seconds: f64,
    pub text: String,
}

/// Parse a `[00:00:01.000 --> 00:00:04.500]  text` line.
pub fn parse_progress_line(line: &str) -> Option<TimedLine> {
    static LINE_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = LINE_PATTERN.get_or_init(|| {
        Regex::new(
            r"^\s*\[(\d+):(\d{2}):(\d{2})[.,](\d{3})\s*-->\s*(\d+):(\d{2}):(\d{2})[.,](\d{3})\]\s*(.*)$",
        )
        .expect("Invalid regex")
    });

    let caps = pattern.captures(line)?;
    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<f64>().ok());

    let end_seconds = field(5)? * 3600.0 + field(6)? * 60.0 + field(7)? + field(8)? / 1000.0;
    let text = caps.get(9).map(|m| m.as_str().trim().to_string())?;

    Some(TimedLine { end_seconds, text })
}

/// Runs a local `whisper-cli` binary.
pub struct LocalWhisperTranscriber {
    binary: String,
    progress_interval: Duration,
}

impl LocalWhisperTranscriber {
    pub fn new(binary: impl Into<String>, progress_interval: Duration) -> Self {
        Self {
            binary: binary.into(),
            progress_interval,
        }
    }
}

#[async_trait]
impl Transcriber for LocalWhisperTranscriber {
    #[instrument(skip(self, progress), fields(audio_path = %audio_path.display()))]
    async fn transcribe(
        &self,
        audio_path: &Path,
        model: &str,
        progress: &dyn ProgressSink,
    ) -> Result<String> {
        let temp_dir = tempfile::tempdir()?;
        let wav_path = temp_dir.path().join("input.wav");
        convert_to_wav(audio_path, &wav_path).await?;

        let total_seconds = probe_duration(&wav_path).await.unwrap_or_else(|e| {
            warn!("Could not determine duration, progress will be partial: {}", e);
            0.0
        });

        let text = self
            .run_whisper(model, &wav_path, total_seconds, progress)
            .await;
        drop(temp_dir);
        text
    }
}

impl LocalWhisperTranscriber {
    /// Run `whisper-cli` on a prepared WAV file and collect its transcript lines.
    ///
    /// The child is killed if this future returns early or is dropped.
    async fn run_whisper(
        &self,
        model: &str,
        wav_path: &Path,
        total_seconds: f64,
        progress: &dyn ProgressSink,
    ) -> Result<String> {
        info!("Running {} with model {}", self.binary, model);
        let mut child = Command::new(&self.binary)
            .arg("-m").arg(model)
            .arg("-f").arg(wav_path)
            .arg("-l").arg("auto")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DigestError::ToolNotFound(self.binary.clone())
                } else {
                    DigestError::ToolFailed(format!("Failed to run {}: {}", self.binary, e))
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DigestError::ToolFailed("whisper-cli stdout unavailable".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DigestError::ToolFailed("whisper-cli stderr unavailable".into()))?;

        // Drain stderr concurrently so a chatty tool cannot block on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut throttle = ProgressThrottle::new(self.progress_interval);
        let mut texts = Vec::new();
        let mut last_end = 0.0_f64;
        let mut lines = BufReader::new(stdout).lines();

        while let Some(line) = lines.next_line().await? {
            let Some(timed) = parse_progress_line(&line) else {
                continue;
            };
            last_end = last_end.max(timed.end_seconds);
            if !timed.text.is_empty() {
                texts.push(timed.text);
            }
            throttle.emit(
                progress,
                &TranscriptionProgress {
                    processed_seconds: timed.end_seconds,
                    total_seconds,
                    segments_done: texts.len(),
                    segments_total: None,
                },
            );
        }

        let status = child.wait().await?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let tail = stderr_text.lines().last().unwrap_or("").to_string();
            return Err(DigestError::Transcription(format!(
                "{} exited with {}: {}",
                self.binary, status, tail
            )));
        }

        throttle.emit_final(
            progress,
            &TranscriptionProgress {
                processed_seconds: last_end.max(total_seconds),
                total_seconds,
                segments_done: texts.len(),
                segments_total: None,
            },
        );

        debug!("Collected {} transcript lines", texts.len());
        Ok(texts.join(" "))
    }
}
