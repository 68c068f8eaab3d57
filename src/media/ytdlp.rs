//! yt-dlp based media fetcher.

use super::{AcquisitionResult, MediaFetcher, MediaFile};
use crate::error::{DigestError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Why a yt-dlp invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Upcoming or still-running live broadcast / premiere.
    LivePending,
    /// Anything else.
    Unavailable,
}

/// Classify yt-dlp error output.
pub fn classify_failure(stderr: &str) -> FailureKind {
    static LIVE_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = LIVE_PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(live event will begin|premieres? in|is (currently )?live|is_upcoming|is_live|live stream recording is not available|post_live|waiting for the (live )?stream|scheduled to start)",
        )
        .expect("Invalid regex")
    });

    if pattern.is_match(stderr) {
        FailureKind::LivePending
    } else {
        FailureKind::Unavailable
    }
}

/// Whether a yt-dlp `live_status` value means the broadcast is not over yet.
pub fn live_status_pending(live_status: &str) -> bool {
    matches!(live_status, "is_live" | "is_upcoming" | "post_live")
}

/// Downloads audio with yt-dlp.
pub struct YtDlpFetcher {
    binary: String,
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
        }
    }

    /// Use a specific yt-dlp binary.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DigestError::ToolNotFound(self.binary.clone())
                } else {
                    DigestError::ToolFailed(format!("Failed to run {}: {}", self.binary, e))
                }
            })
    }

    /// Look up the video id and live status without downloading.
    async fn probe(&self, link: &str) -> std::result::Result<ProbeInfo, AcquisitionResult> {
        let output = self
            .run(&["--dump-json", "--no-download", "--no-warnings", "--no-playlist", link])
            .await
            .map_err(|e| AcquisitionResult::Unavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(failure_result(&String::from_utf8_lossy(&output.stderr)));
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            AcquisitionResult::Unavailable(format!("Failed to parse yt-dlp output: {}", e))
        })?;

        let id = json["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AcquisitionResult::Unavailable("yt-dlp returned no video id".into()))?;

        Ok(ProbeInfo {
            id,
            live_status: json["live_status"].as_str().map(str::to_string),
        })
    }

    /// Download into `dest_dir`. Anything yt-dlp left behind for `id` is
    /// removed unless the audio is handed out as a [`MediaFile`].
    async fn download(&self, link: &str, id: &str, dest_dir: &Path) -> AcquisitionResult {
        let result = self.try_download(link, id, dest_dir).await;
        if !matches!(result, AcquisitionResult::Ready(_)) {
            remove_leftovers(dest_dir, id);
        }
        result
    }

    async fn try_download(&self, link: &str, id: &str, dest_dir: &Path) -> AcquisitionResult {
        if let Err(e) = std::fs::create_dir_all(dest_dir) {
            return AcquisitionResult::Unavailable(format!("Cannot create {}: {}", dest_dir.display(), e));
        }

        let template = dest_dir.join(format!("{}.%(ext)s", id));
        let template = template.to_string_lossy();

        info!("Downloading audio from {}", link);
        let output = match self
            .run(&[
                "--extract-audio",
                "--audio-format", "mp3",
                "--audio-quality", "5",
                "--output", template.as_ref(),
                "--no-playlist",
                "--quiet",
                "--no-warnings",
                link,
            ])
            .await
        {
            Ok(output) => output,
            Err(e) => return AcquisitionResult::Unavailable(e.to_string()),
        };

        if !output.status.success() {
            return failure_result(&String::from_utf8_lossy(&output.stderr));
        }

        match find_audio_file(dest_dir, id) {
            Ok(path) => AcquisitionResult::Ready(MediaFile::new(path)),
            Err(e) => AcquisitionResult::Unavailable(e.to_string()),
        }
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

struct ProbeInfo {
    id: String,
    live_status: Option<String>,
}

fn failure_result(stderr: &str) -> AcquisitionResult {
    match classify_failure(stderr) {
        FailureKind::LivePending => AcquisitionResult::LiveEventPending,
        FailureKind::Unavailable => {
            let reason = stderr.trim();
            AcquisitionResult::Unavailable(if reason.is_empty() {
                "yt-dlp failed without output".to_string()
            } else {
                reason.lines().last().unwrap_or(reason).to_string()
            })
        }
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    #[instrument(skip(self, dest_dir))]
    async fn fetch(&self, link: &str, dest_dir: &Path) -> AcquisitionResult {
        let info = match self.probe(link).await {
            Ok(info) => info,
            Err(result) => return result,
        };

        if let Some(status) = info.live_status.as_deref() {
            debug!(live_status = status, "Probed video");
            if live_status_pending(status) {
                return AcquisitionResult::LiveEventPending;
            }
        }

        self.download(link, &info.id, dest_dir).await
    }
}

/// Delete partial downloads and intermediate files for a video ID.
fn remove_leftovers(dir: &Path, video_id: &str) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with(video_id) {
            continue;
        }
        let path = entry.path();
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match removed {
            Ok(()) => debug!(path = %path.display(), "Removed leftover download"),
            Err(e) => warn!(path = %path.display(), "Failed to remove leftover download: {}", e),
        }
    }
}

/// Locates a downloaded audio file by video ID.
fn find_audio_file(dir: &Path, video_id: &str) -> Result<PathBuf> {
    for ext in &["mp3", "m4a", "opus", "webm", "ogg"] {
        let candidate = dir.join(format!("{}.{}", video_id, ext));
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| DigestError::MediaAcquisition(format!("Cannot read directory: {e}")))?;

    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(video_id) {
            return Ok(entry.path());
        }
    }

    Err(DigestError::MediaAcquisition(
        "Audio file not found after download".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_live_messages() {
        let upcoming = "ERROR: [youtube] abc: This live event will begin in 3 hours.";
        assert_eq!(classify_failure(upcoming), FailureKind::LivePending);

        let premiere = "ERROR: [youtube] abc: Premieres in 20 minutes";
        assert_eq!(classify_failure(premiere), FailureKind::LivePending);

        let processing = "ERROR: [youtube] abc: This live stream recording is not available.";
        assert_eq!(classify_failure(processing), FailureKind::LivePending);
    }

    #[test]
    fn test_classify_unavailable_messages() {
        let private = "ERROR: [youtube] abc: Private video. Sign in if you've been granted access";
        assert_eq!(classify_failure(private), FailureKind::Unavailable);

        let removed = "ERROR: [youtube] abc: Video unavailable. This video has been removed";
        assert_eq!(classify_failure(removed), FailureKind::Unavailable);

        assert_eq!(classify_failure(""), FailureKind::Unavailable);
    }

    #[test]
    fn test_live_status_values() {
        assert!(live_status_pending("is_live"));
        assert!(live_status_pending("is_upcoming"));
        assert!(live_status_pending("post_live"));
        assert!(!live_status_pending("was_live"));
        assert!(!live_status_pending("not_live"));
    }

    #[test]
    fn test_failure_result_keeps_last_line() {
        match failure_result("WARNING: something\nERROR: Video unavailable\n") {
            AcquisitionResult::Unavailable(reason) => assert_eq!(reason, "ERROR: Video unavailable"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_find_audio_file_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc123.flac"), b"x").unwrap();
        let found = find_audio_file(dir.path(), "abc123").unwrap();
        assert!(found.ends_with("abc123.flac"));
        assert!(find_audio_file(dir.path(), "missing").is_err());
    }

    #[test]
    fn test_remove_leftovers_only_touches_item_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc.webm.part"), b"x").unwrap();
        std::fs::write(dir.path().join("abc.webm"), b"x").unwrap();
        std::fs::write(dir.path().join("other.mp3"), b"x").unwrap();

        remove_leftovers(dir.path(), "abc");

        assert_eq!(dir_entries(dir.path()), vec!["other.mp3".to_string()]);
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Writes a stand-in yt-dlp that reports a regular video, then drops
    /// `download_file` next to the output template and exits with `exit_code`
    /// and `stderr`.
    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path, download_file: &str, exit_code: i32, stderr: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = format!(
            r#"#!/bin/sh
for arg in "$@"; do
  if [ "$arg" = "--dump-json" ]; then
    echo '{{"id":"abc","live_status":"not_live"}}'
    exit 0
  fi
done
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--output" ]; then out="$arg"; fi
  prev="$arg"
done
echo partial > "$(dirname "$out")/{download_file}"
echo "{stderr}" >&2
exit {exit_code}
"#
        );

        let path = dir.join("yt-dlp");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_download_leaves_no_partial_files() {
        let bin_dir = tempfile::tempdir().unwrap();
        let media_dir = tempfile::tempdir().unwrap();
        let binary = fake_ytdlp(
            bin_dir.path(),
            "abc.webm.part",
            1,
            "ERROR: unable to download video data: HTTP Error 403",
        );
        let fetcher = YtDlpFetcher::with_binary(binary.to_string_lossy());

        let result = fetcher.fetch("https://youtu.be/abc", media_dir.path()).await;

        match result {
            AcquisitionResult::Unavailable(reason) => assert!(reason.contains("403")),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(dir_entries(media_dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_live_pending_download_leaves_no_partial_files() {
        let bin_dir = tempfile::tempdir().unwrap();
        let media_dir = tempfile::tempdir().unwrap();
        let binary = fake_ytdlp(
            bin_dir.path(),
            "abc.webm.part",
            1,
            "ERROR: [youtube] abc: This live event will begin in 3 hours.",
        );
        let fetcher = YtDlpFetcher::with_binary(binary.to_string_lossy());

        let result = fetcher.fetch("https://youtu.be/abc", media_dir.path()).await;

        assert!(matches!(result, AcquisitionResult::LiveEventPending));
        assert!(dir_entries(media_dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_download_is_guarded() {
        let bin_dir = tempfile::tempdir().unwrap();
        let media_dir = tempfile::tempdir().unwrap();
        let binary = fake_ytdlp(bin_dir.path(), "abc.mp3", 0, "");
        let fetcher = YtDlpFetcher::with_binary(binary.to_string_lossy());

        let media = match fetcher.fetch("https://youtu.be/abc", media_dir.path()).await {
            AcquisitionResult::Ready(media) => media,
            other => panic!("unexpected: {:?}", other),
        };
        assert!(media.path().ends_with("abc.mp3"));

        drop(media);
        assert!(dir_entries(media_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let fetcher = YtDlpFetcher::with_binary("definitely-not-a-real-yt-dlp-binary");
        let dir = tempfile::tempdir().unwrap();
        let result = fetcher.fetch("https://youtu.be/dQw4w9WgXcQ", dir.path()).await;
        assert!(matches!(result, AcquisitionResult::Unavailable(_)));
    }
}
