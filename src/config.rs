use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{slog_debug, Error, Result};

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Tools that make a company a stronger fit, most valuable first.
pub const DEFAULT_TOOL_PRIORITY: [&str; 11] = [
    "python",
    "databricks",
    "dbt",
    "snowflake",
    "kubernetes",
    "kafka",
    "openai",
    "aws",
    "gcp",
    "azure",
    "docker",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Headless model command line; extra words are passed as arguments.
    pub agent_command: String,
    pub agent_timeout_secs: u64,
    /// Upper bound on concurrently running nodes.
    pub max_concurrency: usize,
    /// Search calls allowed per node.
    pub max_tool_calls: u32,
    /// Re-prompts after a schema violation. At most 1.
    pub schema_retries: u32,
    pub search: SearchConfig,
    pub scoring: ScoringConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_command: "claude".to_string(),
            agent_timeout_secs: 600,
            max_concurrency: 4,
            max_tool_calls: 8,
            schema_retries: 1,
            search: SearchConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub engine_id: Option<String>,
    pub endpoint: String,
    pub results_per_query: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            engine_id: None,
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            results_per_query: 5,
        }
    }
}

impl SearchConfig {
    pub fn has_credentials(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.api_key) && present(&self.engine_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub tool_priority: Vec<String>,
    pub weights: FactorWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            tool_priority: DEFAULT_TOOL_PRIORITY.iter().map(|s| s.to_string()).collect(),
            weights: FactorWeights::default(),
        }
    }
}

/// Relative weight of each ICP factor, handed to the scoring agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    pub employee: f64,
    pub data_team: f64,
    pub tech_stack: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            employee: 0.3,
            data_team: 0.3,
            tech_stack: 0.4,
        }
    }
}

impl Config {
    pub fn scout_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".scout"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::scout_dir()?.join("scout.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        slog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            slog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        slog_debug!(
            "Config loaded: agent_command={:?}, max_concurrency={}, max_tool_calls={}, search_credentials={}",
            config.agent_command,
            config.max_concurrency,
            config.max_tool_calls,
            config.search.has_credentials()
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                slog_debug!("Creating config directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        slog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    /// Fill search credentials from `GOOGLE_API_KEY` / `GOOGLE_CSE_ID`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup("GOOGLE_API_KEY").filter(|v| !v.is_empty()) {
            self.search.api_key = Some(key);
        }
        if let Some(id) = lookup("GOOGLE_CSE_ID").filter(|v| !v.is_empty()) {
            self.search.engine_id = Some(id);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent_command.trim().is_empty() {
            return Err(Error::Validation("agent_command must not be empty".into()));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Validation("max_concurrency must be at least 1".into()));
        }
        if self.schema_retries > 1 {
            return Err(Error::Validation(format!(
                "schema_retries must be 0 or 1, got {}",
                self.schema_retries
            )));
        }
        if self.scoring.tool_priority.is_empty() {
            return Err(Error::Validation("scoring.tool_priority must not be empty".into()));
        }
        let w = self.scoring.weights;
        if [w.employee, w.data_team, w.tech_stack]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
            || w.employee + w.data_team + w.tech_stack <= 0.0
        {
            return Err(Error::Validation(
                "scoring.weights must be non-negative with a positive sum".into(),
            ));
        }
        Ok(())
    }
}
