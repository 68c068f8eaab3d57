//! Doctor command - verify system requirements and configuration.

use crate::cli::{mask_secret, Output};
use crate::config::{Settings, TranscriptionProvider};
use console::style;
use std::path::Path;
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings, config_path: &Path) -> anyhow::Result<()> {
    Output::header("tubedigest doctor");
    println!();
    println!("Checking system requirements and configuration...\n");

    let mut checks = Vec::new();

    println!("{}", style("External Tools").bold());
    let mut tool_checks = vec![
        check_tool("yt-dlp", &["--version"], install_hint_ytdlp()),
        check_tool("ffmpeg", &["-version"], install_hint_ffmpeg()),
        check_tool("ffprobe", &["-version"], install_hint_ffmpeg()),
    ];
    if settings.transcription.provider == TranscriptionProvider::Local {
        tool_checks.push(check_whisper_cli(&settings.transcription.whisper_cli));
    }
    for check in &tool_checks {
        check.print();
    }
    checks.extend(tool_checks);

    println!();

    println!("{}", style("API Configuration").bold());
    let mut api_checks = vec![check_gemini_keys(&settings.resolve_api_keys())];
    if settings.transcription.provider == TranscriptionProvider::Whisper {
        api_checks.push(check_openai_api_key());
    }
    for check in &api_checks {
        check.print();
    }
    checks.extend(api_checks);

    println!();

    println!("{}", style("Configuration").bold());
    let config_checks = vec![
        check_config_file(config_path),
        check_output_dir(&settings.output_dir()),
        check_channels(&settings.general.channels),
    ];
    for check in &config_checks {
        check.print();
    }
    checks.extend(config_checks);

    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before running tubedigest.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! tubedigest is ready to use.");
    }

    Ok(())
}

/// Check if an external tool is available.
fn check_tool(name: &str, args: &[&str], hint: &str) -> CheckResult {
    match Command::new(name).args(args).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .to_string();

            let version_display = if version.chars().count() > 50 {
                format!("{}...", version.chars().take(50).collect::<String>())
            } else {
                version
            };

            CheckResult::ok(name, &version_display)
        }
        Ok(_) => CheckResult::error(name, "installed but not working", hint),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            CheckResult::error(name, "not found", hint)
        }
        Err(e) => CheckResult::error(name, &format!("error: {}", e), hint),
    }
}

/// whisper-cli has no version flag; launching it is enough.
fn check_whisper_cli(binary: &str) -> CheckResult {
    let hint = "Build whisper.cpp and put whisper-cli on PATH, or set transcription.whisper_cli";
    match Command::new(binary).arg("-h").output() {
        Ok(_) => CheckResult::ok(binary, "found"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            CheckResult::error(binary, "not found", hint)
        }
        Err(e) => CheckResult::error(binary, &format!("error: {}", e), hint),
    }
}

fn check_gemini_keys(keys: &[String]) -> CheckResult {
    match keys {
        [] => CheckResult::error(
            "Gemini API keys",
            "none configured",
            "Set with: export GEMINI_API_KEY='...' (or GEMINI_API_KEYS=key1,key2)",
        ),
        [only] => CheckResult::ok(
            "Gemini API keys",
            &format!("1 key ({}), no rotation on quota faults", mask_secret(only)),
        ),
        many => CheckResult::ok(
            "Gemini API keys",
            &format!(
                "{} keys ({})",
                many.len(),
                many.iter().map(|k| mask_secret(k)).collect::<Vec<_>>().join(", ")
            ),
        ),
    }
}

/// Check if OpenAI API key is configured.
fn check_openai_api_key() -> CheckResult {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if key.starts_with("sk-") && key.len() > 20 => {
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", mask_secret(&key)))
        }
        Ok(key) if key.is_empty() => CheckResult::error(
            "OPENAI_API_KEY",
            "empty",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
        Ok(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "set but format looks unusual",
            "Expected format: sk-... (OpenAI API key)",
        ),
        Err(_) => CheckResult::error(
            "OPENAI_API_KEY",
            "not set",
            "Set with: export OPENAI_API_KEY='sk-...' (or use --provider local)",
        ),
    }
}

/// Check if config file exists.
fn check_config_file(config_path: &Path) -> CheckResult {
    if config_path.exists() {
        CheckResult::ok("Config file", &config_path.display().to_string())
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: tubedigest config edit (or run once without --no-save)",
        )
    }
}

fn check_output_dir(dir: &Path) -> CheckResult {
    if dir.is_dir() {
        CheckResult::ok("Output directory", &dir.display().to_string())
    } else if dir.exists() {
        CheckResult::error(
            "Output directory",
            &format!("{} is not a directory", dir.display()),
            "Set general.output_dir to a directory path",
        )
    } else {
        CheckResult::warning(
            "Output directory",
            &format!("{} (will be created)", dir.display()),
            "Directory will be created on first run",
        )
    }
}

fn check_channels(channels: &[String]) -> CheckResult {
    if channels.is_empty() {
        CheckResult::warning(
            "Channels",
            "none configured",
            "Pass --channel to 'tubedigest run' or add general.channels to the config",
        )
    } else {
        CheckResult::ok("Channels", &format!("{} configured", channels.len()))
    }
}

/// Platform-specific install hint for yt-dlp.
fn install_hint_ytdlp() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install yt-dlp"
    } else if cfg!(target_os = "linux") {
        "Install with: pip install yt-dlp (or your package manager)"
    } else {
        "Install from: https://github.com/yt-dlp/yt-dlp"
    }
}

/// Platform-specific install hint for ffmpeg.
fn install_hint_ffmpeg() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install ffmpeg (or your package manager)"
    } else {
        "Install from: https://ffmpeg.org/download.html"
    }
}
