//! CLI output formatting utilities.

use crate::transcription::{format_clock, ProgressSink, TranscriptionProgress};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }
}

/// Renders transcription progress as a bar over the audio length.
pub struct TranscriptionBar {
    bar: ProgressBar,
}

impl TranscriptionBar {
    pub fn new(msg: &str) -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
        {
            bar.set_style(bar_style.progress_chars("#>-"));
        }
        bar.set_message(msg.to_string());
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for TranscriptionBar {
    fn on_progress(&self, progress: &TranscriptionProgress) {
        let total = progress.total_seconds.max(0.0) as u64;
        if total > 0 {
            self.bar.set_length(total);
        }
        self.bar.set_position(progress.processed_seconds.max(0.0) as u64);

        let segments = match progress.segments_total {
            Some(total) => format!("segment {}/{}", progress.segments_done, total),
            None => format!("{} lines", progress.segments_done),
        };
        self.bar.set_message(format!(
            "{} / {} ({})",
            format_clock(progress.processed_seconds),
            format_clock(progress.total_seconds),
            segments
        ));
    }
}

/// Mask a credential for display, keeping a short prefix and suffix.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
