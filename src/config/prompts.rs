//! Prompt templates for tubedigest.
//!
//! Prompts can be customized by placing a `summary.toml` file in the custom
//! prompts directory.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub summary: SummaryPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for the two summarization phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryPrompts {
    /// Phase one. Sees only the source reference, never the transcript.
    #[serde(rename = "abstract")]
    pub abstract_prompt: String,
    /// Phase two. Sees the abstract and the (bounded) transcript.
    pub summary: String,
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self {
            abstract_prompt: r#"You are preparing background notes before a video transcript is analyzed.

Video title: {{title}}
Channel: {{channel}}
Link: {{link}}

In at most five sentences, describe what this video is most likely about, who the channel or speaker is, and any context (people, events, terminology) a reader would need to follow the discussion. Do not invent specific claims from the video itself."#
                .to_string(),

            summary: r#"Analyze the following transcript and provide:
1. A concise summary.
2. A structured outline.
3. Key takeaways.

Use Markdown headings and bullet points. Write in the language of the transcript.

Background on the video:
{{abstract}}

Video title: {{title}}
Link: {{link}}

Transcript:
{{transcript}}"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let summary_path = custom_path.join("summary.toml");
            if summary_path.exists() {
                let content = std::fs::read_to_string(&summary_path)?;
                prompts.summary = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    ///
    /// Placeholders are filled in one left-to-right pass. Inserted values are
    /// never scanned again, and unknown placeholders are left as written.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
        let pattern =
            PLACEHOLDER.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("Invalid regex"));

        pattern
            .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
