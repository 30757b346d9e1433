//! Runtime configuration: environment variables first, then
//! `~/.config/loomctl/config.json`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which LLM provider backs the `LlmClient` the runtime constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Anthropic,
    DeepSeek,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub compaction_threshold: Option<usize>,
    #[serde(default)]
    pub teammate_work_turn_cap: Option<usize>,
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Failed to resolve config directory")?
        .join("loomctl"))
}

fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

pub fn load_file_config() -> Result<FileConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = std::fs::read_to_string(&path).context("Reading config.json")?;
    serde_json::from_str(&contents).context("Parsing config.json")
}

pub fn save_file_config(config: &FileConfig) -> Result<()> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).context("Creating config directory")?;
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(config_path()?, json).context("Writing config.json")
}

/// Fully resolved runtime configuration, env > file > default.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub model: String,
    pub compaction_threshold: usize,
    pub teammate_work_turn_cap: usize,
    pub idle_timeout_secs: u64,
    pub poll_interval_secs: u64,
}

const DEFAULT_COMPACTION_THRESHOLD: usize = 50_000;
const DEFAULT_WORK_TURN_CAP: usize = 50;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

impl Config {
    pub fn load() -> Result<Self> {
        let file = load_file_config().unwrap_or_default();

        let provider = if std::env::var("ANTHROPIC_AUTH_TOKEN").is_ok()
            || std::env::var("ANTHROPIC_BASE_URL").is_ok()
        {
            Provider::Anthropic
        } else {
            Provider::DeepSeek
        };

        let model = match provider {
            Provider::Anthropic => std::env::var("ANTHROPIC_MODEL")
                .ok()
                .or_else(|| file.default_model.clone())
                .unwrap_or_else(|| "claude-sonnet-4-5-20250929".to_string()),
            Provider::DeepSeek => std::env::var("DEEPSEEK_MODEL")
                .ok()
                .or_else(|| file.default_model.clone())
                .unwrap_or_else(|| "deepseek-chat".to_string()),
        };

        let compaction_threshold = file
            .compaction_threshold
            .unwrap_or(DEFAULT_COMPACTION_THRESHOLD);
        let teammate_work_turn_cap = file
            .teammate_work_turn_cap
            .unwrap_or(DEFAULT_WORK_TURN_CAP);

        Ok(Config {
            provider,
            model,
            compaction_threshold,
            teammate_work_turn_cap,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_file_round_trips() {
        let cfg = FileConfig {
            default_model: Some("deepseek-chat".into()),
            compaction_threshold: Some(60_000),
            teammate_work_turn_cap: Some(40),
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: FileConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.compaction_threshold, Some(60_000));
    }
}
