//! Pipeline controller.
//!
//! Drives each discovered video through acquire, transcribe, summarize and
//! persist. Items are processed one at a time; a recoverable fault costs only
//! the item it happened in. Upcoming live broadcasts are deferred and reported
//! together once the run is over.

use crate::config::{Prompts, Settings, TranscriptionProvider};
use crate::dispatcher::{ApiKeyPool, GeminiClient, KeyRotationDispatcher};
use crate::error::{DigestError, Result, StageOutcome};
use crate::feed::{discover, FeedResolver, TimeWindow, VideoItem, YoutubeFeedResolver};
use crate::log::RunLogger;
use crate::media::{AcquisitionResult, MediaFetcher, MediaFile, YtDlpFetcher};
use crate::report::{run_dir_name, write_report};
use crate::summary::{SourceRef, Summarizer, SummaryOrchestrator};
use crate::transcription::{
    LocalWhisperTranscriber, LogProgress, ProgressSink, Transcriber, WhisperTranscriber,
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Name of the scratch folder for downloaded audio inside a run directory.
pub const MEDIA_DIR_NAME: &str = ".media";

/// An item that was dropped, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub title: String,
    pub link: String,
    pub reason: String,
}

/// The outcome of one run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Directory this run wrote into.
    pub output_root: PathBuf,
    pub window: TimeWindow,
    pub transcription_model: String,
    /// Items discovered inside the window.
    pub discovered: usize,
    pub created_reports: Vec<PathBuf>,
    /// Links of live broadcasts that have not finished yet.
    pub deferred_live: Vec<String>,
    pub skipped: Vec<SkippedItem>,
}

/// What happened to an item that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Reported(PathBuf),
    DeferredLive,
}

/// The main pipeline controller.
pub struct Pipeline {
    resolver: Box<dyn FeedResolver>,
    fetcher: Box<dyn MediaFetcher>,
    transcriber: Box<dyn Transcriber>,
    summarizer: Box<dyn Summarizer>,
    transcription_model: String,
    output_dir: PathBuf,
    progress: Box<dyn ProgressSink>,
    log: RunLogger,
}

impl Pipeline {
    /// Build a pipeline from settings with the production collaborators.
    ///
    /// `api_keys` is the resolved key list; an empty list is a configuration
    /// error.
    pub fn from_settings(settings: &Settings, api_keys: Vec<String>, log: RunLogger) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let summarizer = build_summarizer(settings, api_keys, prompts)?;
        let transcriber = build_transcriber(settings)?;

        Ok(Self::with_components(
            Box::new(YoutubeFeedResolver::new()?),
            Box::new(YtDlpFetcher::new()),
            transcriber,
            summarizer,
            settings.transcription.model.clone(),
            settings.output_dir(),
            log,
        ))
    }

    /// Create a pipeline with custom components.
    pub fn with_components(
        resolver: Box<dyn FeedResolver>,
        fetcher: Box<dyn MediaFetcher>,
        transcriber: Box<dyn Transcriber>,
        summarizer: Box<dyn Summarizer>,
        transcription_model: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        log: RunLogger,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            transcriber,
            summarizer,
            transcription_model: transcription_model.into(),
            output_dir: output_dir.into(),
            progress: Box::new(LogProgress::new(log.clone())),
            log,
        }
    }

    /// Replace the transcription progress sink.
    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Process every video from `references` published inside `window`.
    ///
    /// Returns `Err` only for faults that make the whole run pointless, such
    /// as an output directory that cannot be created.
    #[instrument(skip(self, references), fields(references = references.len()))]
    pub async fn run(&mut self, references: &[String], window: TimeWindow) -> Result<PipelineRun> {
        self.log.info("Starting processing...");
        self.log.info(format!(
            "Time Period: {} - {}",
            window.start().format("%Y-%m-%d %H:%M:%S UTC"),
            window.end().format("%Y-%m-%d %H:%M:%S UTC")
        ));
        self.log.info(format!("Model: {}", self.transcription_model));

        let output_root = self.output_dir.join(run_dir_name(&Utc::now(), &window));
        let media_dir = output_root.join(MEDIA_DIR_NAME);
        if let Err(e) = std::fs::create_dir_all(&media_dir) {
            let err = DigestError::Config(format!(
                "Cannot create output directory {}: {}",
                output_root.display(),
                e
            ));
            self.log.critical(err.to_string());
            return Err(err);
        }
        self.log.info(format!("Output Directory: {}", output_root.display()));

        let mut run = PipelineRun {
            output_root: output_root.clone(),
            window,
            transcription_model: self.transcription_model.clone(),
            discovered: 0,
            created_reports: Vec::new(),
            deferred_live: Vec::new(),
            skipped: Vec::new(),
        };

        if references.is_empty() {
            self.log.warning("No channels provided.");
        } else {
            self.log.info(format!("Processing {} channels.", references.len()));
        }

        let items = discover(self.resolver.as_ref(), references, &window, &self.log).await;
        run.discovered = items.len();
        if items.is_empty() {
            self.log.info("No videos found in the specified time period.");
        }

        for item in &items {
            match self.process_item(item, &output_root, &media_dir).await {
                StageOutcome::Completed(ItemOutcome::Reported(path)) => {
                    run.created_reports.push(path);
                }
                StageOutcome::Completed(ItemOutcome::DeferredLive) => {
                    run.deferred_live.push(item.link.clone());
                }
                StageOutcome::Recoverable(reason) => {
                    self.log
                        .warning(format!("Skipping '{}': {}", item.title, reason));
                    run.skipped.push(SkippedItem {
                        title: item.title.clone(),
                        link: item.link.clone(),
                        reason,
                    });
                }
                StageOutcome::Fatal(err) => {
                    self.log.critical(err.to_string());
                    return Err(err);
                }
            }
            self.log.info(format!("Finished processing {}", item.title));
        }

        if !run.deferred_live.is_empty() {
            self.log.warning(deferred_notice(&run.deferred_live));
        }

        // Only removed when every download was cleaned up.
        if let Err(e) = std::fs::remove_dir(&media_dir) {
            debug!("Media directory left in place: {}", e);
        }

        self.log.info(format!(
            "Run complete: {} report(s), {} skipped, {} deferred",
            run.created_reports.len(),
            run.skipped.len(),
            run.deferred_live.len()
        ));
        Ok(run)
    }

    /// Push one item through every stage. The media file never outlives this call.
    async fn process_item(
        &mut self,
        item: &VideoItem,
        output_root: &Path,
        media_dir: &Path,
    ) -> StageOutcome<ItemOutcome> {
        self.log.info(format!("Processing video: {}", item.title));

        let media = match self.fetcher.fetch(&item.link, media_dir).await {
            AcquisitionResult::Ready(media) => media,
            AcquisitionResult::LiveEventPending => {
                self.log.info(format!(
                    "'{}' is an upcoming or ongoing live event, deferring",
                    item.title
                ));
                return StageOutcome::Completed(ItemOutcome::DeferredLive);
            }
            AcquisitionResult::Unavailable(reason) => {
                return StageOutcome::Recoverable(format!("media unavailable: {}", reason));
            }
        };

        let outcome = self.transcribe_and_summarize(item, &media, output_root).await;
        self.release_media(media);
        outcome
    }

    async fn transcribe_and_summarize(
        &mut self,
        item: &VideoItem,
        media: &MediaFile,
        output_root: &Path,
    ) -> StageOutcome<ItemOutcome> {
        self.log.info(format!(
            "Transcribing {} with {}",
            media.path().display(),
            self.transcription_model
        ));
        let transcript = match self
            .transcriber
            .transcribe(media.path(), &self.transcription_model, self.progress.as_ref())
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => return StageOutcome::Recoverable("transcription produced no text".into()),
            Err(e) => return StageOutcome::from_error(e),
        };
        self.log.info(format!(
            "Transcription complete ({} characters)",
            transcript.chars().count()
        ));

        let source = SourceRef {
            title: item.title.clone(),
            channel: item.channel_name.clone(),
            link: item.link.clone(),
        };
        let Some(summary) = self
            .summarizer
            .summarize(&transcript, &source, &self.log)
            .await
        else {
            return StageOutcome::Recoverable("summary generation failed".into());
        };

        match write_report(output_root, item, &summary) {
            Ok(path) => {
                self.log.info(format!("Report saved to: {}", path.display()));
                StageOutcome::Completed(ItemOutcome::Reported(path))
            }
            Err(e) => StageOutcome::from_error(e),
        }
    }

    fn release_media(&self, media: MediaFile) {
        let path = media.path().to_path_buf();
        match media.remove() {
            Ok(()) => self
                .log
                .info(format!("Removed temp audio: {}", path.display())),
            Err(e) => self.log.warning(format!(
                "Failed to remove temp audio {}: {}",
                path.display(),
                e
            )),
        }
    }
}

/// One message naming every deferred live broadcast.
pub fn deferred_notice(links: &[String]) -> String {
    let mut notice = format!(
        "{} live event(s) have not finished yet and were not processed. Run again later for:",
        links.len()
    );
    for link in links {
        notice.push_str("\n  - ");
        notice.push_str(link);
    }
    notice
}

fn build_transcriber(settings: &Settings) -> Result<Box<dyn Transcriber>> {
    let interval = Duration::from_secs(settings.transcription.progress_interval_secs);
    Ok(match settings.transcription.provider {
        TranscriptionProvider::Whisper => Box::new(WhisperTranscriber::with_config(
            settings.transcription.segment_seconds,
            interval,
        )?),
        TranscriptionProvider::Local => Box::new(LocalWhisperTranscriber::new(
            settings.transcription.whisper_cli.clone(),
            interval,
        )),
    })
}

/// Build the two-phase summarizer on top of a key-rotating Gemini dispatcher.
pub fn build_summarizer(
    settings: &Settings,
    api_keys: Vec<String>,
    prompts: Prompts,
) -> Result<Box<dyn Summarizer>> {
    let pool = ApiKeyPool::new(api_keys)?;
    let client = GeminiClient::new(
        settings.summary.api_base.clone(),
        Duration::from_secs(settings.summary.timeout_secs),
    )?;
    let dispatcher =
        KeyRotationDispatcher::new(Box::new(client), pool, settings.dispatcher.retry_policy());

    Ok(Box::new(
        SummaryOrchestrator::new(
            dispatcher,
            settings.summary.abstract_model.clone(),
            settings.summary.summary_model.clone(),
        )
        .with_prompts(prompts)
        .with_max_transcript_chars(settings.summary.max_transcript_chars),
    ))
}
