//! Transcription module for tubedigest.
//!
//! Converts a local media file to text. Engines report structured progress
//! through a [`ProgressSink`], rate-limited by a [`ProgressThrottle`] so long
//! inputs neither flood nor starve the observer.
//!
//! # Engines
//!
//! - **Whisper** (default): hosted OpenAI Whisper, audio split into fixed
//!   windows and sent one window at a time.
//! - **Local**: whisper.cpp `whisper-cli`; progress is derived from the
//!   timestamps it prints.

mod local;
mod whisper;

pub use local::{parse_progress_line, LocalWhisperTranscriber};
pub use whisper::WhisperTranscriber;

use crate::error::Result;
use crate::log::RunLogger;
use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};

/// Trait for transcription engines.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a media file with the given model selector.
    ///
    /// Any segment failure fails the whole call.
    async fn transcribe(
        &self,
        audio_path: &Path,
        model: &str,
        progress: &dyn ProgressSink,
    ) -> Result<String>;
}

/// A progress update from a running transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionProgress {
    /// Audio covered so far, in seconds.
    pub processed_seconds: f64,
    /// Total audio length, in seconds (0 when unknown).
    pub total_seconds: f64,
    /// Segments finished so far.
    pub segments_done: usize,
    /// Total segments, when the engine works in fixed windows.
    pub segments_total: Option<usize>,
}

impl TranscriptionProgress {
    /// Completion ratio in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total_seconds <= 0.0 {
            return 0.0;
        }
        (self.processed_seconds / self.total_seconds).clamp(0.0, 1.0)
    }
}

/// Receives transcription progress.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: &TranscriptionProgress);
}

/// Discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _progress: &TranscriptionProgress) {}
}

/// Writes progress into the run log.
pub struct LogProgress {
    log: RunLogger,
}

impl LogProgress {
    pub fn new(log: RunLogger) -> Self {
        Self { log }
    }
}

impl ProgressSink for LogProgress {
    fn on_progress(&self, progress: &TranscriptionProgress) {
        self.log.info(format!(
            "Transcribing... {:.0}% ({} / {})",
            progress.fraction() * 100.0,
            format_clock(progress.processed_seconds),
            format_clock(progress.total_seconds)
        ));
    }
}

/// Lets at most one event through per interval. The first event always passes.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Whether an event at `now` may be emitted. Records the emission if so.
    pub fn allow(&mut self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }

    /// Forward `progress` to `sink` if the throttle allows it now.
    pub fn emit(&mut self, sink: &dyn ProgressSink, progress: &TranscriptionProgress) {
        if self.allow(Instant::now()) {
            sink.on_progress(progress);
        }
    }

    /// Forward the completion event regardless of the interval.
    pub fn emit_final(&mut self, sink: &dyn ProgressSink, progress: &TranscriptionProgress) {
        self.last_emit = Some(Instant::now());
        sink.on_progress(progress);
    }
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_clock(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
