//! Configuration settings for tubedigest.

use crate::dispatcher::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub transcription: TranscriptionSettings,
    pub summary: SummarySettings,
    pub dispatcher: DispatcherSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Root directory for run output folders.
    pub output_dir: String,
    /// Channel references to monitor (channel URLs, @handles or feed URLs).
    pub channels: Vec<String>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            output_dir: "~/tubedigest".to_string(),
            channels: Vec::new(),
        }
    }
}

/// Transcription engine type.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionProvider {
    /// Hosted OpenAI Whisper (default).
    #[default]
    Whisper,
    /// Local whisper.cpp `whisper-cli` binary.
    Local,
}

impl std::str::FromStr for TranscriptionProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whisper" | "openai" => Ok(TranscriptionProvider::Whisper),
            "local" | "whisper-cpp" | "whisper.cpp" => Ok(TranscriptionProvider::Local),
            _ => Err(format!("Unknown transcription provider: {}", s)),
        }
    }
}

impl std::fmt::Display for TranscriptionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptionProvider::Whisper => write!(f, "whisper"),
            TranscriptionProvider::Local => write!(f, "local"),
        }
    }
}

/// Transcription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Transcription engine (whisper, local).
    pub provider: TranscriptionProvider,
    /// Model selector: a Whisper model name, or a model file path for `local`.
    pub model: String,
    /// Length of the fixed windows long audio is split into.
    pub segment_seconds: u32,
    /// Minimum wall-clock interval between two progress updates.
    pub progress_interval_secs: u64,
    /// Binary used by the local provider.
    pub whisper_cli: String,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            provider: TranscriptionProvider::Whisper,
            model: "whisper-1".to_string(),
            segment_seconds: 600,
            progress_interval_secs: 10,
            whisper_cli: "whisper-cli".to_string(),
        }
    }
}

/// Summary generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    /// Model for the short contextual abstract.
    pub abstract_model: String,
    /// Model for the full summary and outline.
    pub summary_model: String,
    /// Character budget for the transcript inside the summary prompt.
    pub max_transcript_chars: usize,
    /// Base URL of the generative-language API.
    pub api_base: String,
    /// API keys, tried in order. Environment variables take precedence.
    pub api_keys: Vec<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            abstract_model: "gemini-2.0-flash".to_string(),
            summary_model: "gemini-2.5-flash".to_string(),
            max_transcript_chars: 30_000,
            api_base: crate::dispatcher::DEFAULT_API_BASE.to_string(),
            api_keys: Vec::new(),
            timeout_secs: 300,
        }
    }
}

/// Key rotation and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Retry budget per request.
    pub max_attempts: u32,
    /// Pause before trying the next key after a quota fault.
    pub switch_delay_secs: u64,
    /// Pause after every key in the pool hit its quota.
    pub cooldown_secs: u64,
    /// Pause before retrying when the service is unavailable.
    pub unavailable_delay_secs: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            switch_delay_secs: 2,
            cooldown_secs: 60,
            unavailable_delay_secs: 10,
        }
    }
}

impl DispatcherSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            switch_delay: Duration::from_secs(self.switch_delay_secs),
            cooldown: Duration::from_secs(self.cooldown_secs),
            unavailable_delay: Duration::from_secs(self.unavailable_delay_secs),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::DigestError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tubedigest")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded output directory path.
    pub fn output_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.output_dir)
    }

    /// Resolve the API key list.
    ///
    /// `GEMINI_API_KEYS` (comma separated) wins over `GEMINI_API_KEY`, which
    /// wins over the config file. Blank entries are dropped.
    pub fn resolve_api_keys(&self) -> Vec<String> {
        let from_env = std::env::var("GEMINI_API_KEYS")
            .ok()
            .map(|v| split_keys(&v))
            .filter(|keys| !keys.is_empty())
            .or_else(|| {
                std::env::var("GEMINI_API_KEY")
                    .ok()
                    .map(|v| split_keys(&v))
                    .filter(|keys| !keys.is_empty())
            });

        from_env.unwrap_or_else(|| {
            self.summary
                .api_keys
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect()
        })
    }
}

/// Split a comma-separated key list.
pub fn split_keys(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_roundtrip_through_toml() {
        let settings = Settings::default();
        let text = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed.summary.max_transcript_chars, 30_000);
        assert_eq!(parsed.dispatcher.max_attempts, 10);
        assert_eq!(parsed.transcription.provider, TranscriptionProvider::Whisper);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Settings = toml::from_str(
            r#"
            [general]
            channels = ["https://www.youtube.com/@Example"]

            [summary]
            summary_model = "gemini-1.5-pro"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.general.channels.len(), 1);
        assert_eq!(parsed.summary.summary_model, "gemini-1.5-pro");
        assert_eq!(parsed.summary.abstract_model, "gemini-2.0-flash");
        assert_eq!(parsed.dispatcher.cooldown_secs, 60);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.general.output_dir = "/tmp/out".to_string();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.general.output_dir, "/tmp/out");
    }

    #[test]
    fn test_split_keys() {
        assert_eq!(split_keys(" k1, ,k2 "), vec!["k1", "k2"]);
        assert!(split_keys("").is_empty());
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!(
            "whisper.cpp".parse::<TranscriptionProvider>().unwrap(),
            TranscriptionProvider::Local
        );
        assert!("bogus".parse::<TranscriptionProvider>().is_err());
    }

    #[test]
    fn test_retry_policy_conversion() {
        let policy = DispatcherSettings::default().retry_policy();
        assert_eq!(policy.cooldown, Duration::from_secs(60));
        assert_eq!(policy.switch_delay, Duration::from_secs(2));
    }
}
