//! TOML configuration.
//!
//! Every key has a default, so an absent file behaves like
//! [`Config::minimal`]. See `config/pyp.example.toml`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    /// Syllabus code prefixed to every file name.
    #[serde(default = "default_subject_code")]
    pub subject_code: String,
    /// Short subject name used in export titles and file names.
    #[serde(default = "default_subject_name")]
    pub subject_name: String,
    #[serde(default = "default_question_paper_dir")]
    pub question_paper_dir: PathBuf,
    #[serde(default = "default_marking_scheme_dir")]
    pub marking_scheme_dir: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            subject_code: default_subject_code(),
            subject_name: default_subject_name(),
            question_paper_dir: default_question_paper_dir(),
            marking_scheme_dir: default_marking_scheme_dir(),
        }
    }
}

fn default_subject_code() -> String {
    "9626".to_string()
}
fn default_subject_name() -> String {
    "IT".to_string()
}
fn default_question_paper_dir() -> PathBuf {
    PathBuf::from("past_papers")
}
fn default_marking_scheme_dir() -> PathBuf {
    PathBuf::from("pyp_anschm")
}

/// Where the CLI keeps the held search results between invocations.
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_session_path")]
    pub path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
        }
    }
}

fn default_session_path() -> PathBuf {
    PathBuf::from(".pyp/session.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Sessions untouched for this many seconds are dropped.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_session_idle_secs() -> u64 {
    3600
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        let code = &self.archive.subject_code;
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!(
                "archive.subject_code must be non-empty and alphanumeric, got '{}'",
                code
            );
        }

        if self.archive.subject_name.trim().is_empty() {
            bail!("archive.subject_name must not be empty");
        }

        if self.archive.question_paper_dir == self.archive.marking_scheme_dir {
            bail!(
                "archive.question_paper_dir and archive.marking_scheme_dir must differ (both are {})",
                self.archive.question_paper_dir.display()
            );
        }

        if self.server.bind.trim().is_empty() {
            bail!("server.bind must not be empty");
        }

        if self.server.session_idle_secs == 0 {
            bail!("server.session_idle_secs must be at least 1");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

/// Loads `path` if it exists, otherwise falls back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}
