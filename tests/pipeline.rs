use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};
use tubedigest::error::{DigestError, Result};
use tubedigest::feed::{FeedDocument, FeedEntry, FeedResolver, TimeWindow};
use tubedigest::log::{LogLevel, MemorySink, RunLogger};
use tubedigest::media::{AcquisitionResult, MediaFetcher, MediaFile};
use tubedigest::pipeline::{Pipeline, MEDIA_DIR_NAME};
use tubedigest::summary::{SourceRef, Summarizer, SummaryResult};
use tubedigest::transcription::{NoProgress, ProgressSink, Transcriber};

const CHANNEL: &str = "https://www.youtube.com/@systems";

fn link(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

fn entry(id: &str, title: &str, published: &str) -> FeedEntry {
    FeedEntry {
        id: format!("yt:video:{}", id),
        title: title.to_string(),
        link: link(id),
        published: published.to_string(),
    }
}

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

struct MockResolver {
    entries: Vec<FeedEntry>,
}

#[async_trait]
impl FeedResolver for MockResolver {
    async fn resolve(&self, reference: &str) -> Option<String> {
        Some(format!("{}/feed", reference))
    }

    async fn fetch_feed(&self, _feed_url: &str) -> Result<FeedDocument> {
        Ok(FeedDocument {
            channel_title: "Systems Weekly".to_string(),
            entries: self.entries.clone(),
        })
    }
}

#[derive(Clone, Copy)]
enum Fetch {
    Ready,
    Unavailable,
    Live,
}

#[derive(Clone, Default)]
struct MockFetcher {
    behavior: Arc<HashMap<String, Fetch>>,
    calls: Arc<Mutex<Vec<String>>>,
    created: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockFetcher {
    fn new(behavior: &[(&str, Fetch)]) -> Self {
        Self {
            behavior: Arc::new(
                behavior
                    .iter()
                    .map(|(id, fetch)| (link(id), *fetch))
                    .collect(),
            ),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(&self, link: &str, dest_dir: &Path) -> AcquisitionResult {
        self.calls.lock().unwrap().push(link.to_string());
        match self.behavior.get(link).copied().unwrap_or(Fetch::Ready) {
            Fetch::Ready => {
                let id = link.rsplit("v=").next().unwrap_or("media");
                let path = dest_dir.join(format!("{}.mp3", id));
                std::fs::write(&path, b"fake audio").unwrap();
                self.created.lock().unwrap().push(path.clone());
                AcquisitionResult::Ready(MediaFile::new(path))
            }
            Fetch::Unavailable => AcquisitionResult::Unavailable("video is private".to_string()),
            Fetch::Live => AcquisitionResult::LiveEventPending,
        }
    }
}

/// Fails for files whose name is listed, with a transcription or a config error.
#[derive(Clone, Default)]
struct MockTranscriber {
    failing: Arc<HashMap<String, bool>>,
    calls: Arc<Mutex<Vec<(PathBuf, bool)>>>,
}

impl MockTranscriber {
    fn failing(files: &[(&str, bool)]) -> Self {
        Self {
            failing: Arc::new(files.iter().map(|(f, fatal)| (f.to_string(), *fatal)).collect()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(
        &self,
        audio_path: &Path,
        _model: &str,
        _progress: &dyn ProgressSink,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((audio_path.to_path_buf(), audio_path.exists()));

        let name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        match self.failing.get(&name) {
            Some(true) => Err(DigestError::Config("model file missing".to_string())),
            Some(false) => Err(DigestError::Transcription("decoder crashed".to_string())),
            None => Ok(format!("transcript of {}", name)),
        }
    }
}

#[derive(Clone, Default)]
struct MockSummarizer {
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(
        &mut self,
        transcript: &str,
        source: &SourceRef,
        _log: &RunLogger,
    ) -> Option<SummaryResult> {
        self.calls.lock().unwrap().push(source.title.clone());
        if source.title.contains("no summary") {
            return None;
        }
        Some(SummaryResult {
            summary_content: format!("Summary of {}", source.title),
            detailed_transcript: transcript.to_string(),
        })
    }
}

struct Harness {
    pipeline: Pipeline,
    fetcher: MockFetcher,
    transcriber: MockTranscriber,
    summarizer: MockSummarizer,
    sink: MemorySink,
    _output: tempfile::TempDir,
}

fn harness(entries: Vec<FeedEntry>, fetcher: MockFetcher, transcriber: MockTranscriber) -> Harness {
    let output = tempfile::tempdir().unwrap();
    let sink = MemorySink::new();
    let summarizer = MockSummarizer::default();

    let pipeline = Pipeline::with_components(
        Box::new(MockResolver { entries }),
        Box::new(fetcher.clone()),
        Box::new(transcriber.clone()),
        Box::new(summarizer.clone()),
        "whisper-1",
        output.path(),
        RunLogger::new(Arc::new(sink.clone())),
    )
    .with_progress(Box::new(NoProgress));

    Harness {
        pipeline,
        fetcher,
        transcriber,
        summarizer,
        sink,
        _output: output,
    }
}

#[tokio::test]
async fn test_live_pending_item_is_deferred_once_and_skips_later_stages() {
    let entries = vec![
        entry("live1", "Launch Stream", "2025-01-01T10:00:00+00:00"),
        entry("vod1", "Recorded Talk", "2025-01-01T11:00:00+00:00"),
    ];
    let mut h = harness(
        entries,
        MockFetcher::new(&[("live1", Fetch::Live)]),
        MockTranscriber::default(),
    );

    let run = assert_ok!(h.pipeline.run(&[CHANNEL.to_string()], window()).await);

    assert_eq!(run.deferred_live, vec![link("live1")]);
    assert_eq!(run.created_reports.len(), 1);
    assert!(run.skipped.is_empty());

    // Only the recorded video reached transcription and summarization.
    assert_eq!(h.transcriber.calls.lock().unwrap().len(), 1);
    assert_eq!(*h.summarizer.calls.lock().unwrap(), vec!["Recorded Talk"]);

    let notices: Vec<String> = h
        .sink
        .messages(LogLevel::Warning)
        .into_iter()
        .filter(|m| m.contains("live event"))
        .collect();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].matches(&link("live1")).count(), 1);
}

#[tokio::test]
async fn test_failure_in_one_item_does_not_affect_others() {
    let entries = vec![
        entry("a", "First", "2025-01-01T01:00:00Z"),
        entry("b", "Second", "2025-01-01T02:00:00Z"),
        entry("c", "Third no summary", "2025-01-01T03:00:00Z"),
        entry("d", "Fourth", "2025-01-01T04:00:00Z"),
    ];
    let mut h = harness(
        entries,
        MockFetcher::new(&[("b", Fetch::Unavailable)]),
        MockTranscriber::failing(&[("a.mp3", false)]),
    );

    let run = assert_ok!(h.pipeline.run(&[CHANNEL.to_string()], window()).await);

    assert_eq!(run.discovered, 4);
    assert_eq!(run.created_reports.len(), 1);
    assert!(run.created_reports[0]
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .ends_with("_Systems Weekly_Fourth.md"));

    let skipped: Vec<&str> = run.skipped.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(skipped, vec!["First", "Second", "Third no summary"]);
    assert!(run.skipped[0].reason.contains("decoder crashed"));
    assert!(run.skipped[1].reason.contains("video is private"));

    assert_eq!(h.fetcher.calls.lock().unwrap().len(), 4);
    assert_eq!(
        *h.summarizer.calls.lock().unwrap(),
        vec!["Third no summary", "Fourth"]
    );

    let report = std::fs::read_to_string(&run.created_reports[0]).unwrap();
    assert!(report.contains("Summary of Fourth"));
    assert!(report.contains("transcript of d.mp3"));
}

#[tokio::test]
async fn test_media_never_outlives_its_item() {
    let entries = vec![
        entry("ok", "Works", "2025-01-01T01:00:00Z"),
        entry("bad", "Breaks", "2025-01-01T02:00:00Z"),
        entry("nosum", "Has no summary", "2025-01-01T03:00:00Z"),
    ];
    let mut h = harness(
        entries,
        MockFetcher::default(),
        MockTranscriber::failing(&[("bad.mp3", false)]),
    );

    let run = assert_ok!(h.pipeline.run(&[CHANNEL.to_string()], window()).await);

    let created = h.fetcher.created.lock().unwrap().clone();
    assert_eq!(created.len(), 3);
    for path in &created {
        assert!(!path.exists(), "{} was left behind", path.display());
    }

    // Every transcription saw its file present.
    assert!(h.transcriber.calls.lock().unwrap().iter().all(|(_, existed)| *existed));
    assert!(!run.output_root.join(MEDIA_DIR_NAME).exists());
}

#[tokio::test]
async fn test_window_bounds_are_inclusive() {
    let entries = vec![
        entry("before", "Too early", "2024-12-31T23:59:59Z"),
        entry("start", "At start", "2025-01-01T00:00:00Z"),
        entry("end", "At end", "2025-01-02T00:00:00Z"),
        entry("after", "Too late", "2025-01-02T00:00:01Z"),
    ];
    let mut h = harness(entries, MockFetcher::default(), MockTranscriber::default());

    let run = assert_ok!(h.pipeline.run(&[CHANNEL.to_string()], window()).await);

    assert_eq!(run.discovered, 2);
    assert_eq!(*h.summarizer.calls.lock().unwrap(), vec!["At start", "At end"]);
}

#[tokio::test]
async fn test_fatal_fault_stops_the_run() {
    let entries = vec![
        entry("x", "Needs model", "2025-01-01T01:00:00Z"),
        entry("y", "Never reached", "2025-01-01T02:00:00Z"),
    ];
    let mut h = harness(
        entries,
        MockFetcher::default(),
        MockTranscriber::failing(&[("x.mp3", true)]),
    );

    let err = assert_err!(h.pipeline.run(&[CHANNEL.to_string()], window()).await);

    assert!(matches!(err, DigestError::Config(_)));
    assert_eq!(h.fetcher.calls.lock().unwrap().len(), 1);
    assert!(h.summarizer.calls.lock().unwrap().is_empty());
    assert_eq!(h.sink.messages(LogLevel::Critical).len(), 1);

    // The aborted item's media was still cleaned up.
    let created = h.fetcher.created.lock().unwrap().clone();
    assert!(created.iter().all(|p| !p.exists()));
}

#[tokio::test]
async fn test_unwritable_output_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    let sink = MemorySink::new();

    let mut pipeline = Pipeline::with_components(
        Box::new(MockResolver { entries: Vec::new() }),
        Box::new(MockFetcher::default()),
        Box::new(MockTranscriber::default()),
        Box::new(MockSummarizer::default()),
        "whisper-1",
        &blocker,
        RunLogger::new(Arc::new(sink.clone())),
    );

    let err = assert_err!(pipeline.run(&[CHANNEL.to_string()], window()).await);

    assert!(matches!(err, DigestError::Config(ref msg) if msg.contains("output directory")));
    assert_eq!(sink.messages(LogLevel::Critical).len(), 1);
}

#[tokio::test]
async fn test_run_directory_layout() {
    let entries = vec![entry("a", "A/B: Test?", "2025-01-01T00:00:00Z")];
    let mut h = harness(entries, MockFetcher::default(), MockTranscriber::default());

    let run = assert_ok!(h.pipeline.run(&[CHANNEL.to_string()], window()).await);

    let run_dir = run.output_root.file_name().unwrap().to_str().unwrap().to_string();
    assert!(run_dir.starts_with("Trigger_"));
    assert!(run_dir.ends_with("_From_2025-01-01_00-00-00_2025-01-02_00-00-00"));
    assert_eq!(
        run.created_reports,
        vec![run
            .output_root
            .join("2025-01-01_00-00-00_Systems Weekly_AB Test.md")]
    );
}
