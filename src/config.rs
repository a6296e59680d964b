use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "paper_miner";
const ENV_PREFIX: &str = "PAPER_MINER";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Runtime settings: defaults, then `paper_miner.toml` if present, then
/// `PAPER_MINER_*` environment variables (`__` separates nested keys).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    pub output_dir: PathBuf,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub batch_delay_secs: u64,
    pub limits: FieldLimits,
    pub llm: LlmSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/papers.sqlite"),
            output_dir: PathBuf::from("outputs"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 25,
            batch_delay_secs: 2,
            limits: FieldLimits::default(),
            llm: LlmSettings::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let mut settings: Settings = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if settings.llm.api_key.is_none() {
            settings.llm.api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty());
        }
        Ok(settings)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.clamp(20, 30))
    }

    /// Courtesy pause between papers in batch runs, kept within 1..=3s.
    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_secs.clamp(1, 3))
    }
}

/// Character caps applied before a record reaches the database.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct FieldLimits {
    pub title: usize,
    pub abstract_text: usize,
    pub section: usize,
    pub full_text: usize,
    pub journal: usize,
    pub doi: usize,
    pub url: usize,
    pub caption: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            title: 500,
            abstract_text: 5000,
            section: 5000,
            full_text: 65000,
            journal: 200,
            doi: 100,
            url: 500,
            caption: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.7,
            max_output_tokens: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_delays_are_clamped() {
        let mut s = Settings::default();
        assert_eq!(s.request_timeout(), Duration::from_secs(25));
        s.request_timeout_secs = 90;
        s.batch_delay_secs = 0;
        assert_eq!(s.request_timeout(), Duration::from_secs(30));
        assert_eq!(s.batch_delay(), Duration::from_secs(1));
    }

    #[test]
    fn default_limits() {
        let l = FieldLimits::default();
        assert_eq!(l.title, 500);
        assert_eq!(l.full_text, 65000);
    }
}
