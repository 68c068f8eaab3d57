//! Error types for tubedigest.

use thiserror::Error;

/// Library-level error type for tubedigest operations.
#[derive(Error, Debug)]
pub enum DigestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Generative service error: {0}")]
    Provider(String),

    #[error("Retry budget exhausted after {attempts} attempts (last fault: {last_fault})")]
    RetryBudgetExhausted { attempts: u32, last_fault: String },

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for tubedigest operations.
pub type Result<T> = std::result::Result<T, DigestError>;

/// Outcome of pushing one item through a pipeline stage.
///
/// The controller branches on the tag: `Recoverable` skips the rest of the
/// item and moves on, `Fatal` ends the whole run.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Completed(T),
    Recoverable(String),
    Fatal(DigestError),
}

impl<T> StageOutcome<T> {
    /// Classify a stage error. Configuration faults abort the run, the rest
    /// only cost the current item.
    pub fn from_error(err: DigestError) -> Self {
        match err {
            DigestError::Config(_) => StageOutcome::Fatal(err),
            other => StageOutcome::Recoverable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_fatal() {
        let outcome: StageOutcome<()> =
            StageOutcome::from_error(DigestError::Config("no keys".into()));
        assert!(matches!(outcome, StageOutcome::Fatal(_)));
    }

    #[test]
    fn test_item_errors_are_recoverable() {
        let outcome: StageOutcome<()> =
            StageOutcome::from_error(DigestError::Transcription("boom".into()));
        match outcome {
            StageOutcome::Recoverable(reason) => assert!(reason.contains("boom")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
