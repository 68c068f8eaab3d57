//! OpenAI Whisper transcription implementation.

use super::{ProgressSink, ProgressThrottle, Transcriber, TranscriptionProgress};
use crate::error::{DigestError, Result};
use crate::media::ffmpeg::{split_audio, AudioSegment};
use crate::openai::create_client;
use async_openai::types::{AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// OpenAI Whisper-based transcriber.
pub struct WhisperTranscriber {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    segment_seconds: u32,
    progress_interval: Duration,
}

impl WhisperTranscriber {
    /// Create a new Whisper transcriber with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(600, Duration::from_secs(10))
    }

    /// Create a new Whisper transcriber with custom configuration.
    pub fn with_config(segment_seconds: u32, progress_interval: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            segment_seconds,
            progress_interval,
        })
    }

    /// Transcribe a single segment (no splitting).
    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn transcribe_segment(&self, audio_path: &Path, model: &str) -> Result<String> {
        debug!("Transcribing audio segment");

        let file_bytes = tokio::fs::read(audio_path).await?;

        let request = CreateTranscriptionRequestArgs::default()
            .file(async_openai::types::AudioInput::from_vec_u8(
                audio_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("audio.mp3")
                    .to_string(),
                file_bytes,
            ))
            .model(model)
            .response_format(AudioResponseFormat::VerboseJson)
            .build()
            .map_err(|e| DigestError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| DigestError::Transcription(format!("Whisper API error: {}", e)))?;

        Ok(response.text.trim().to_string())
    }

    /// Transcribe segments one after another, failing on the first error.
    async fn transcribe_segments(
        &self,
        segments: &[AudioSegment],
        model: &str,
        progress: &dyn ProgressSink,
    ) -> Result<String> {
        let total_seconds: f64 = segments.iter().map(|s| s.duration_seconds).sum();
        let mut throttle = ProgressThrottle::new(self.progress_interval);
        let mut texts = Vec::with_capacity(segments.len());

        for (idx, segment) in segments.iter().enumerate() {
            let text = self
                .transcribe_segment(&segment.path, model)
                .await
                .map_err(|e| {
                    DigestError::Transcription(format!(
                        "Segment {} at {:.0}s failed: {}",
                        idx, segment.offset_seconds, e
                    ))
                })?;
            texts.push(text);

            let event = TranscriptionProgress {
                processed_seconds: segment.offset_seconds + segment.duration_seconds,
                total_seconds,
                segments_done: idx + 1,
                segments_total: Some(segments.len()),
            };
            if idx + 1 == segments.len() {
                throttle.emit_final(progress, &event);
            } else {
                throttle.emit(progress, &event);
            }
        }

        Ok(texts
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    #[instrument(skip(self, progress), fields(audio_path = %audio_path.display()))]
    async fn transcribe(
        &self,
        audio_path: &Path,
        model: &str,
        progress: &dyn ProgressSink,
    ) -> Result<String> {
        let temp_dir = tempfile::tempdir()?;
        let segments = split_audio(audio_path, temp_dir.path(), self.segment_seconds).await?;
        info!("Processing {} audio segment(s) with {}", segments.len(), model);

        let text = self.transcribe_segments(&segments, model, progress).await;

        // Segment files live in temp_dir and go with it.
        drop(temp_dir);
        text
    }
}
