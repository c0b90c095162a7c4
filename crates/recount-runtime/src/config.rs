use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use recount_store::StalenessThresholds;

use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database path (cards + session metadata).
    pub database_path: PathBuf,
    /// Root of the filesystem blob store holding synced transcript chunks.
    pub blob_root: PathBuf,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl Config {
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Cadence of the regular-cards loop.
    pub regular_poll_secs: u64,
    /// Cadence of the smart-recap loop (slower: each pick costs an LLM call).
    pub smart_recap_poll_secs: u64,
    /// Max sessions pulled per cycle, per bucket.
    pub batch_limit: usize,
    /// Smart-recap advisory lock timeout; older holders count as crashed.
    pub lock_timeout_secs: i64,
    pub regular: ThresholdsConfig,
    pub smart_recap: ThresholdsConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            regular_poll_secs: 30,
            smart_recap_poll_secs: 300,
            batch_limit: 25,
            lock_timeout_secs: 60,
            regular: ThresholdsConfig::from(StalenessThresholds::regular()),
            smart_recap: ThresholdsConfig::from(StalenessThresholds::smart_recap()),
        }
    }
}

/// Serializable mirror of [`StalenessThresholds`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    pub threshold_pct: f64,
    pub base_min_lines: i64,
    pub base_min_secs: i64,
    pub min_initial_lines: i64,
    pub min_session_age_secs: i64,
}

impl From<StalenessThresholds> for ThresholdsConfig {
    fn from(t: StalenessThresholds) -> Self {
        Self {
            threshold_pct: t.threshold_pct,
            base_min_lines: t.base_min_lines,
            base_min_secs: t.base_min_secs,
            min_initial_lines: t.min_initial_lines,
            min_session_age_secs: t.min_session_age_secs,
        }
    }
}

impl ThresholdsConfig {
    pub fn thresholds(&self) -> StalenessThresholds {
        StalenessThresholds {
            threshold_pct: self.threshold_pct,
            base_min_lines: self.base_min_lines,
            base_min_secs: self.base_min_secs,
            min_initial_lines: self.min_initial_lines,
            min_session_age_secs: self.min_session_age_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub api_base: String,
    /// Key for the default HTTP client; tests and embedders inject their own
    /// client instead.
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
    /// Transcript budget for the recap prompt, in approximate tokens; the
    /// character budget is four times this.
    pub max_transcript_tokens: usize,
    /// Per-user recap generations per UTC day; exceeding it is a silent skip.
    pub daily_quota: i64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-haiku-4-5".to_string(),
            api_base: "https://api.anthropic.com".to_string(),
            api_key: None,
            max_tokens: 1000,
            temperature: 0.25,
            timeout_secs: 60,
            max_transcript_tokens: 20_000,
            daily_quota: 50,
        }
    }
}

impl LlmConfig {
    pub fn max_transcript_chars(&self) -> usize {
        self.max_transcript_tokens * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_round_trips_through_toml() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("recount.toml");

        let config = Config {
            database_path: PathBuf::from("/data/recount.db"),
            blob_root: PathBuf::from("/data/blobs"),
            scheduler: SchedulerConfig::default(),
            llm: LlmConfig::default(),
        };
        config.save_to(&path)?;

        let loaded = Config::load_from(&path)?;
        assert_eq!(loaded.database_path, config.database_path);
        assert_eq!(loaded.scheduler.regular_poll_secs, 30);
        assert_eq!(loaded.scheduler.smart_recap.base_min_lines, 50);
        assert_eq!(loaded.llm.max_transcript_chars(), 80_000);
        Ok(())
    }

    #[test]
    fn partial_toml_fills_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("recount.toml");
        std::fs::write(
            &path,
            "database_path = \"/data/recount.db\"\nblob_root = \"/data/blobs\"\n",
        )?;

        let loaded = Config::load_from(&path)?;
        assert_eq!(loaded.scheduler.batch_limit, 25);
        assert_eq!(loaded.llm.temperature, 0.25);
        Ok(())
    }
}
