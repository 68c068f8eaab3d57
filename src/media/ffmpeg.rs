//! ffmpeg/ffprobe helpers for splitting and converting audio.

use crate::error::{DigestError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// A fixed-length window of a longer audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub path: PathBuf,
    /// Start of the segment within the source, in seconds.
    pub offset_seconds: f64,
    pub duration_seconds: f64,
}

/// Split an audio file into `segment_seconds` windows inside `output_dir`.
///
/// Audio no longer than one window is returned as a single segment pointing at
/// the source file itself.
#[instrument(skip_all)]
pub async fn split_audio(
    source: &Path,
    output_dir: &Path,
    segment_seconds: u32,
) -> Result<Vec<AudioSegment>> {
    std::fs::create_dir_all(output_dir)?;

    let total_duration = probe_duration(source).await?;
    info!("Total audio duration: {:.1}s", total_duration);

    let window = plan_segments(total_duration, segment_seconds);
    if window.len() <= 1 {
        return Ok(vec![AudioSegment {
            path: source.to_path_buf(),
            offset_seconds: 0.0,
            duration_seconds: total_duration,
        }]);
    }

    let base_name = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    let extension = source
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("mp3");

    let mut segments = Vec::with_capacity(window.len());
    for (idx, (offset, length)) in window.into_iter().enumerate() {
        let segment_path = output_dir.join(format!("{}_{:04}.{}", base_name, idx, extension));
        extract_segment(source, &segment_path, offset, length).await?;

        debug!("Created segment {} at offset {:.1}s", idx, offset);
        segments.push(AudioSegment {
            path: segment_path,
            offset_seconds: offset,
            duration_seconds: length,
        });
    }

    info!("Created {} audio segments", segments.len());
    Ok(segments)
}

/// `(offset, length)` pairs covering `total_seconds` in fixed windows.
pub fn plan_segments(total_seconds: f64, segment_seconds: u32) -> Vec<(f64, f64)> {
    let window = f64::from(segment_seconds.max(1));
    if total_seconds <= window {
        return vec![(0.0, total_seconds.max(0.0))];
    }

    let mut plan = Vec::new();
    let mut offset = 0.0;
    while offset < total_seconds {
        plan.push((offset, window.min(total_seconds - offset)));
        offset += window;
    }
    plan
}

/// Extracts a time segment from an audio file.
async fn extract_segment(source: &Path, dest: &Path, start: f64, length: f64) -> Result<()> {
    // Stream copy first: fast and lossless.
    let copy_result = Command::new("ffmpeg")
        .arg("-ss").arg(format!("{:.3}", start))
        .arg("-i").arg(source)
        .arg("-t").arg(format!("{:.3}", length))
        .arg("-c").arg("copy")
        .arg("-y")
        .arg("-loglevel").arg("warning")
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Ok(status) = copy_result {
        if status.success() && dest.exists() {
            return Ok(());
        }
    }

    warn!("Stream copy failed, re-encoding segment");

    let encode_result = Command::new("ffmpeg")
        .arg("-ss").arg(format!("{:.3}", start))
        .arg("-i").arg(source)
        .arg("-t").arg(format!("{:.3}", length))
        .arg("-codec:a").arg("libmp3lame")
        .arg("-qscale:a").arg("4")
        .arg("-y")
        .arg("-loglevel").arg("error")
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    match encode_result {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => {
            let err = String::from_utf8_lossy(&out.stderr);
            Err(DigestError::Transcription(format!("Segment extraction failed: {err}")))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(DigestError::ToolNotFound("ffmpeg".into()))
        }
        Err(e) => Err(DigestError::ToolFailed(format!("ffmpeg error: {e}"))),
    }
}

/// Convert any audio/video input to 16 kHz mono WAV, the input format
/// whisper.cpp expects.
pub async fn convert_to_wav(source: &Path, dest: &Path) -> Result<()> {
    let result = Command::new("ffmpeg")
        .arg("-i").arg(source)
        .arg("-vn")
        .arg("-ar").arg("16000")
        .arg("-ac").arg("1")
        .arg("-c:a").arg("pcm_s16le")
        .arg("-y")
        .arg("-loglevel").arg("error")
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    match result {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => {
            let err = String::from_utf8_lossy(&out.stderr);
            Err(DigestError::ToolFailed(format!("ffmpeg conversion failed: {err}")))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(DigestError::ToolNotFound("ffmpeg".into()))
        }
        Err(e) => Err(DigestError::ToolFailed(format!("ffmpeg error: {e}"))),
    }
}

/// Queries the duration of an audio file using ffprobe with JSON output.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    let result = Command::new("ffprobe")
        .arg("-v").arg("quiet")
        .arg("-print_format").arg("json")
        .arg("-show_format")
        .arg(path)
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DigestError::ToolNotFound("ffprobe".into()));
        }
        Err(e) => {
            return Err(DigestError::ToolFailed(format!("ffprobe failed: {e}")));
        }
    };

    if !output.status.success() {
        return Err(DigestError::ToolFailed("ffprobe returned error".into()));
    }

    parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_duration(json_str: &str) -> Result<f64> {
    let parsed: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|_| DigestError::ToolFailed("Invalid ffprobe output".into()))?;

    parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| DigestError::ToolFailed("Could not determine audio duration".into()))
}
