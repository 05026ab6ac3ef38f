pub mod schema;

pub use schema::{
    normalize_config, ApiCredentials, GatewayConfig, GuardLimits, ModelConfig,
    PurposeKeyedConfig, RawCompletionConfig,
};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default gateway home directory (~/.promptgate).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".promptgate"))
        .unwrap_or_else(|| PathBuf::from(".promptgate"))
}

/// Load the TOML config at `path` (defaults when absent), then apply
/// `PROMPTGATE_*` environment overrides.
pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    let config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {} as TOML", path.display()))?
    } else {
        debug!("No config at {}, using defaults", path.display());
        GatewayConfig::default()
    };
    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

/// Write `config` as TOML. The file is replaced atomically.
pub fn save_config(config: &GatewayConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize gateway config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let staging = path.with_extension("toml.tmp");
    std::fs::write(&staging, contents)
        .with_context(|| format!("Failed to write {}", staging.display()))?;
    std::fs::rename(&staging, path)
        .with_context(|| format!("Failed to move config into {}", path.display()))?;
    Ok(())
}

/// Overlay environment variables on a loaded config. Empty values are ignored.
///
/// | Variable | Field |
/// |---|---|
/// | `PROMPTGATE_API_KEY` | `completion.api_key` (legacy general key) |
/// | `PROMPTGATE_BASE_URL` | `completion.base_url` |
/// | `PROMPTGATE_TIMEOUT_SECS` | `completion.timeout_secs` |
/// | `PROMPTGATE_CACHE_DIR` | `cache_dir` |
/// | `PROMPTGATE_PROMPTS` | `prompts_path` |
/// | `PROMPTGATE_LOG_LEVEL` | `log_level` |
pub fn apply_env_overrides<F>(mut config: GatewayConfig, lookup: F) -> GatewayConfig
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = var("PROMPTGATE_API_KEY") {
        config.completion.api_key = Some(key);
    }
    if let Some(url) = var("PROMPTGATE_BASE_URL") {
        config.completion.base_url = url;
    }
    if let Some(secs) = var("PROMPTGATE_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
        config.completion.timeout_secs = secs;
    }
    if let Some(dir) = var("PROMPTGATE_CACHE_DIR") {
        config.cache_dir = dir;
    }
    if let Some(path) = var("PROMPTGATE_PROMPTS") {
        config.prompts_path = path;
    }
    if let Some(level) = var("PROMPTGATE_LOG_LEVEL") {
        config.log_level = level;
    }
    config
}
