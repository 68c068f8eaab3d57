//! Two-phase summary generation.
//!
//! Phase one asks for a short contextual abstract from the video's title,
//! channel and link only. Phase two combines that abstract with a bounded
//! prefix of the transcript and asks for the summary and outline. Both phases
//! go through the same [`KeyRotationDispatcher`].

use crate::config::Prompts;
use crate::dispatcher::KeyRotationDispatcher;
use crate::log::RunLogger;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// What the summary is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub title: String,
    pub channel: String,
    pub link: String,
}

/// Summary text plus the transcript it was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryResult {
    pub summary_content: String,
    /// The full, untruncated transcript.
    pub detailed_transcript: String,
}

/// Produces a summary for a transcript, or `None` on failure.
///
/// Failures are written to the run log; the caller only needs to know whether
/// a summary exists.
#[async_trait]
pub trait Summarizer: Send {
    async fn summarize(
        &mut self,
        transcript: &str,
        source: &SourceRef,
        log: &RunLogger,
    ) -> Option<SummaryResult>;
}

/// Default transcript budget, in characters.
pub const DEFAULT_MAX_TRANSCRIPT_CHARS: usize = 30_000;

/// Keep the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Runs the abstract and summary phases against the dispatcher.
pub struct SummaryOrchestrator {
    dispatcher: KeyRotationDispatcher,
    prompts: Prompts,
    abstract_model: String,
    summary_model: String,
    max_transcript_chars: usize,
}

impl SummaryOrchestrator {
    pub fn new(
        dispatcher: KeyRotationDispatcher,
        abstract_model: impl Into<String>,
        summary_model: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            prompts: Prompts::default(),
            abstract_model: abstract_model.into(),
            summary_model: summary_model.into(),
            max_transcript_chars: DEFAULT_MAX_TRANSCRIPT_CHARS,
        }
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_max_transcript_chars(mut self, max_chars: usize) -> Self {
        self.max_transcript_chars = max_chars;
        self
    }

    fn abstract_prompt(&self, source: &SourceRef) -> String {
        let mut vars = HashMap::new();
        vars.insert("title".to_string(), source.title.clone());
        vars.insert("channel".to_string(), source.channel.clone());
        vars.insert("link".to_string(), source.link.clone());
        self.prompts
            .render_with_custom(&self.prompts.summary.abstract_prompt, &vars)
    }

    fn summary_prompt(&self, abstract_text: &str, transcript: &str, source: &SourceRef) -> String {
        let mut vars = HashMap::new();
        vars.insert("abstract".to_string(), abstract_text.to_string());
        vars.insert("title".to_string(), source.title.clone());
        vars.insert("channel".to_string(), source.channel.clone());
        vars.insert("link".to_string(), source.link.clone());
        vars.insert(
            "transcript".to_string(),
            truncate_chars(transcript, self.max_transcript_chars).to_string(),
        );
        self.prompts.render_with_custom(&self.prompts.summary.summary, &vars)
    }
}

#[async_trait]
impl Summarizer for SummaryOrchestrator {
    #[instrument(skip(self, transcript, log), fields(title = %source.title))]
    async fn summarize(
        &mut self,
        transcript: &str,
        source: &SourceRef,
        log: &RunLogger,
    ) -> Option<SummaryResult> {
        log.info(format!("Generating abstract with {}", self.abstract_model));
        let prompt = self.abstract_prompt(source);
        let abstract_text = match self
            .dispatcher
            .generate(&self.abstract_model, &prompt, log)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                log.warning(format!("Abstract generation failed for '{}': {}", source.title, e));
                return None;
            }
        };
        debug!(chars = abstract_text.len(), "Abstract ready");

        let transcript_chars = transcript.chars().count();
        if transcript_chars > self.max_transcript_chars {
            log.info(format!(
                "Transcript has {} characters, using the first {}",
                transcript_chars, self.max_transcript_chars
            ));
        }

        log.info(format!("Generating summary with {}", self.summary_model));
        let prompt = self.summary_prompt(&abstract_text, transcript, source);
        match self
            .dispatcher
            .generate(&self.summary_model, &prompt, log)
            .await
        {
            Ok(summary) => Some(SummaryResult {
                summary_content: summary.trim().to_string(),
                detailed_transcript: transcript.to_string(),
            }),
            Err(e) => {
                log.warning(format!("Summary generation failed for '{}': {}", source.title, e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::testing::{test_policy, RecordingSleeper, ScriptedClient};
    use crate::dispatcher::{ApiKeyPool, GenerateFault};
    use crate::log::{LogLevel, MemorySink};
    use std::sync::Arc;

    fn source() -> SourceRef {
        SourceRef {
            title: "Rust in Production".to_string(),
            channel: "Systems Weekly".to_string(),
            link: "https://www.youtube.com/watch?v=abc123".to_string(),
        }
    }

    fn orchestrator(client: &ScriptedClient, max_chars: usize) -> SummaryOrchestrator {
        let dispatcher = KeyRotationDispatcher::with_sleeper(
            Box::new(client.clone()),
            ApiKeyPool::new(vec!["k1".to_string()]).unwrap(),
            test_policy(3),
            Box::new(RecordingSleeper::default()),
        );
        SummaryOrchestrator::new(dispatcher, "abstract-model", "summary-model")
            .with_max_transcript_chars(max_chars)
    }

    #[test]
    fn test_truncate_chars_keeps_prefix() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }

    #[tokio::test]
    async fn test_abstract_prompt_never_sees_transcript() {
        let client = ScriptedClient::new(vec![Ok("ABSTRACT".into()), Ok(" SUMMARY ".into())]);
        let mut summarizer = orchestrator(&client, 30_000);
        let log = RunLogger::new(Arc::new(MemorySink::new()));

        let result = summarizer
            .summarize("SECRET TRANSCRIPT BODY", &source(), &log)
            .await
            .unwrap();

        assert_eq!(result.summary_content, "SUMMARY");
        assert_eq!(result.detailed_transcript, "SECRET TRANSCRIPT BODY");

        let calls = client.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);

        let (_, model, prompt) = &calls[0];
        assert_eq!(model, "abstract-model");
        assert!(prompt.contains("https://www.youtube.com/watch?v=abc123"));
        assert!(!prompt.contains("SECRET TRANSCRIPT BODY"));

        let (_, model, prompt) = &calls[1];
        assert_eq!(model, "summary-model");
        assert!(prompt.contains("ABSTRACT"));
        assert!(prompt.contains("SECRET TRANSCRIPT BODY"));
    }

    #[tokio::test]
    async fn test_summary_prompt_bounds_transcript() {
        let client = ScriptedClient::new(vec![Ok("ctx".into()), Ok("done".into())]);
        let mut summarizer = orchestrator(&client, 10);
        let log = RunLogger::new(Arc::new(MemorySink::new()));
        let transcript = format!("{}{}", "A".repeat(10), "B".repeat(50));

        let result = summarizer.summarize(&transcript, &source(), &log).await.unwrap();

        let calls = client.calls.lock().unwrap().clone();
        let summary_prompt = &calls[1].2;
        assert!(summary_prompt.contains(&"A".repeat(10)));
        assert!(!summary_prompt.contains('B'));
        assert_eq!(result.detailed_transcript, transcript);
    }

    #[tokio::test]
    async fn test_placeholder_in_title_does_not_repeat_transcript() {
        let client = ScriptedClient::new(vec![Ok("ctx".into()), Ok("done".into())]);
        let mut summarizer = orchestrator(&client, 10);
        let log = RunLogger::new(Arc::new(MemorySink::new()));
        let transcript = format!("{}{}", "A".repeat(10), "B".repeat(50));
        let source = SourceRef {
            title: "Reacting to {{transcript}}".to_string(),
            ..source()
        };

        summarizer.summarize(&transcript, &source, &log).await.unwrap();

        let calls = client.calls.lock().unwrap().clone();
        let summary_prompt = &calls[1].2;
        assert_eq!(summary_prompt.matches(&"A".repeat(10)).count(), 1);
        assert!(summary_prompt.contains("Reacting to {{transcript}}"));
    }

    #[tokio::test]
    async fn test_abstract_failure_skips_summary_phase() {
        let client = ScriptedClient::new(vec![
            Err(GenerateFault::Other("bad request".into())),
            Ok("unused".into()),
        ]);
        let mut summarizer = orchestrator(&client, 30_000);
        let sink = MemorySink::new();
        let log = RunLogger::new(Arc::new(sink.clone()));

        assert!(summarizer.summarize("text", &source(), &log).await.is_none());
        assert_eq!(client.calls.lock().unwrap().len(), 1);
        assert!(sink
            .messages(LogLevel::Warning)
            .iter()
            .any(|m| m.contains("Abstract generation failed")));
    }

    #[tokio::test]
    async fn test_summary_failure_returns_none() {
        let client = ScriptedClient::new(vec![
            Ok("ctx".into()),
            Err(GenerateFault::Unavailable("503".into())),
            Err(GenerateFault::Unavailable("503".into())),
            Err(GenerateFault::Unavailable("503".into())),
        ]);
        let mut summarizer = orchestrator(&client, 30_000);
        let log = RunLogger::new(Arc::new(MemorySink::new()));

        assert!(summarizer.summarize("text", &source(), &log).await.is_none());
        assert_eq!(client.calls.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_custom_variables_reach_prompts() {
        let client = ScriptedClient::new(Vec::new());
        let mut prompts = Prompts::default();
        prompts.summary.abstract_prompt = "{{title}} for {{audience}}".to_string();
        prompts
            .variables
            .insert("audience".to_string(), "engineers".to_string());
        let summarizer = orchestrator(&client, 100).with_prompts(prompts);

        assert_eq!(
            summarizer.abstract_prompt(&source()),
            "Rust in Production for engineers"
        );
    }
}
