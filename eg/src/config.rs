//! exgen configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main exgen configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Orchestrator budgets
    pub agent: AgentConfig,

    /// Verification gate
    pub verifier: VerifierConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Reference implementations shown to the model
    pub references: ReferencesConfig,

    /// HTTP endpoint
    pub server: ServerConfig,

    /// Log level when `--log-level` is not given
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before talking to the model
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        if self.agent.max_steps == 0 {
            return Err(eyre::eyre!("agent.max-steps must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .exgen.yml
        let local_config = PathBuf::from(".exgen.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/exgen/exgen.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("exgen").join("exgen.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" supported)
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
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .map_err(|_| eyre::eyre!("Environment variable {} is not set", self.api_key_env))
            .and_then(|key| {
                let key = key.trim().to_string();
                if key.is_empty() {
                    Err(eyre::eyre!("Environment variable {} is empty", self.api_key_env))
                } else {
                    Ok(key)
                }
            })
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
        }
    }
}

/// Orchestrator budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Capability calls allowed in one run
    #[serde(rename = "max-steps")]
    pub max_steps: u32,

    /// Model round-trips allowed in one run
    #[serde(rename = "max-turns")]
    pub max_turns: u32,

    /// Max tokens requested per model call
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 15,
            max_turns: 30,
            max_tokens: 16384,
        }
    }
}

/// Verification gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Project skeleton copied into every sandbox (tsconfig, lint config, node_modules)
    #[serde(rename = "scaffold-dir")]
    pub scaffold_dir: Option<PathBuf>,

    /// Check commands; `{namespace}` expands to `exercises/<slug>`
    pub commands: Vec<String>,

    /// Timeout per command in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Disable only for local development
    pub enabled: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            scaffold_dir: None,
            commands: vec![
                "npx --no-install tsc --noEmit --pretty false".to_string(),
                "npx --no-install eslint --format unix {namespace}".to_string(),
            ],
            timeout_ms: 120_000,
            enabled: true,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the generation database and snapshot archives
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("exgen.db")
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/exgen on Linux)
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("exgen"))
            .unwrap_or_else(|| PathBuf::from(".exgen"));

        Self { data_dir }
    }
}

/// Reference implementations served by `getCodeContext`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferencesConfig {
    /// Directory of sibling exercises; none means no references
    pub directory: Option<PathBuf>,

    /// Maximum files returned
    #[serde(rename = "max-files")]
    pub max_files: usize,

    /// Maximum total content bytes returned
    #[serde(rename = "max-bytes")]
    pub max_bytes: usize,
}

impl Default for ReferencesConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_files: 40,
            max_bytes: 200_000,
        }
    }
}

/// HTTP endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 7878,
        }
    }
}
