//! Markdown report artifacts.

use crate::error::{DigestError, Result};
use crate::feed::{TimeWindow, VideoItem};
use crate::summary::SummaryResult;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Timestamp layout used in report and run directory names.
pub const NAME_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Longest report base name, in characters.
pub const MAX_BASE_NAME_CHARS: usize = 200;

/// Keep alphanumerics, space, `-` and `_`, then trim trailing whitespace.
pub fn sanitize(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim_end().to_string()
}

/// `{published}_{channel}_{title}`, sanitized and capped, without extension.
pub fn report_base_name(item: &VideoItem) -> String {
    let base = format!(
        "{}_{}_{}",
        item.published.format(NAME_TIMESTAMP_FORMAT),
        sanitize(&item.channel_name),
        sanitize(&item.title)
    );
    base.chars().take(MAX_BASE_NAME_CHARS).collect()
}

/// Name of the per-run output directory. All three timestamps are UTC.
pub fn run_dir_name<Tz: TimeZone>(triggered_at: &DateTime<Tz>, window: &TimeWindow) -> String {
    format!(
        "Trigger_{}_From_{}_{}",
        triggered_at.with_timezone(&Utc).format(NAME_TIMESTAMP_FORMAT),
        window.start().format(NAME_TIMESTAMP_FORMAT),
        window.end().format(NAME_TIMESTAMP_FORMAT)
    )
}

/// Render the report body.
pub fn render_report(item: &VideoItem, summary: &SummaryResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", item.title);
    let _ = writeln!(out, "**Channel:** {}", item.channel_name);
    let _ = writeln!(
        out,
        "**Upload Time:** {}",
        item.published.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "**Link:** {}\n", item.link);
    let _ = writeln!(out, "## Summary & Outline\n");
    out.push_str(summary.summary_content.trim_end());
    out.push_str("\n\n## Detailed Transcript\n\n");
    out.push_str(summary.detailed_transcript.trim_end());
    out.push('\n');
    out
}

/// Write the report for `item` into `dir`, returning its path.
///
/// An existing report with the same name is replaced.
pub fn write_report(dir: &Path, item: &VideoItem, summary: &SummaryResult) -> Result<PathBuf> {
    let path = dir.join(format!("{}.md", report_base_name(item)));
    std::fs::write(&path, render_report(item, summary))
        .map_err(|e| DigestError::Report(format!("Failed to write {}: {}", path.display(), e)))?;
    debug!(path = %path.display(), "Report written");
    Ok(path)
}
