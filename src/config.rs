//! Genie configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main Genie configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage and backup configuration
    pub storage: StorageConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Web research provider configuration
    pub research: ResearchConfig,

    /// Calendar provider configuration
    pub calendar: CalendarConfig,

    /// Pipeline deadlines
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration with fallback chain, then apply environment
    /// overrides.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .genie.yml
        let local_config = PathBuf::from(".genie.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/genie/genie.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("genie").join("genie.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Recognized environment overrides, applied after file loading
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("GENIE_STORAGE_PATH").or_else(|_| std::env::var("STORAGE_PATH")) {
            self.storage.storage_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("BACKUP_DIR") {
            self.storage.backup_dir = PathBuf::from(dir);
        }
        if let Ok(auto) = std::env::var("AUTO_BACKUP") {
            self.storage.auto_backup = matches!(auto.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(days) = std::env::var("BACKUP_RETENTION_DAYS") {
            if let Ok(days) = days.parse() {
                self.storage.backup_retention_days = days;
            }
        }
        if let Ok(path) = std::env::var("CALENDAR_CREDENTIALS_PATH") {
            self.calendar.credentials_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("CALENDAR_TOKEN_PATH") {
            self.calendar.token_path = PathBuf::from(path);
        }
        if let Ok(id) = std::env::var("DEFAULT_CALENDAR_ID") {
            self.calendar.calendar_id = id;
        }
        if let Ok(prefix) = std::env::var("EVENT_SUMMARY_PREFIX") {
            self.calendar.summary_prefix = prefix;
        }
        if let Ok(ms) = std::env::var("OVERALL_DEADLINE_MS") {
            if let Ok(ms) = ms.parse() {
                self.pipeline.overall_deadline_ms = ms;
            }
        }
        if let Ok(ms) = std::env::var("LLM_DEADLINE_MS") {
            if let Ok(ms) = ms.parse() {
                self.llm.timeout_ms = ms;
            }
        }
        if let Ok(ms) = std::env::var("CALENDAR_DEADLINE_MS") {
            if let Ok(ms) = ms.parse() {
                self.calendar.timeout_ms = ms;
            }
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the persistence document
    #[serde(rename = "storage-path")]
    pub storage_path: PathBuf,

    /// Directory for backup copies
    #[serde(rename = "backup-dir")]
    pub backup_dir: PathBuf,

    /// Enable pre-write backups
    #[serde(rename = "auto-backup")]
    pub auto_backup: bool,

    /// Age threshold for pruning backups
    #[serde(rename = "backup-retention-days")]
    pub backup_retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("progress.json"),
            backup_dir: PathBuf::from("backups"),
            auto_backup: true,
            backup_retention_days: 30,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "gemini" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-output-tokens")]
    pub max_output_tokens: u32,

    /// Per-call deadline in milliseconds, retries included
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            max_output_tokens: 2048,
            timeout_ms: 30_000,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key: `LLM_API_KEY` wins, then the configured
    /// environment variable.
    pub fn api_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            if !key.is_empty() {
                return Ok(key);
            }
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| eyre!("LLM API key not set (checked LLM_API_KEY and {})", self.api_key_env))
    }
}

/// Research provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Per-call deadline in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            model: "sonar-pro".to_string(),
            api_key_env: "PERPLEXITY_API_KEY".to_string(),
            base_url: "https://api.perplexity.ai".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl ResearchConfig {
    /// Resolve the API key: `RESEARCH_API_KEY` wins, then the configured
    /// environment variable.
    pub fn api_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var("RESEARCH_API_KEY") {
            if !key.is_empty() {
                return Ok(key);
            }
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                eyre!(
                    "Research API key not set (checked RESEARCH_API_KEY and {})",
                    self.api_key_env
                )
            })
    }
}

/// Calendar provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// OAuth2 client credentials file
    #[serde(rename = "credentials-path")]
    pub credentials_path: PathBuf,

    /// OAuth2 token cache file
    #[serde(rename = "token-path")]
    pub token_path: PathBuf,

    /// Target calendar
    #[serde(rename = "calendar-id")]
    pub calendar_id: String,

    /// Marker prepended to event summaries so the system can recognize its
    /// own events during cleanup
    #[serde(rename = "summary-prefix")]
    pub summary_prefix: String,

    /// Per-call deadline in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            calendar_id: "primary".to_string(),
            summary_prefix: "[Genie] ".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Pipeline deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Whole-utterance deadline in milliseconds
    #[serde(rename = "overall-deadline-ms")]
    pub overall_deadline_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            overall_deadline_ms: 60_000,
        }
    }
}
