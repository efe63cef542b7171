//! Configuration loading: TOML file plus environment overrides.
//!
//! Deployment knobs that change per environment (proxy URL, adapter URLs,
//! workspace root, port) can be set via environment variables without
//! touching the file.  Env always wins over the file.

use std::path::{Path, PathBuf};

use super::schema::RuntimeConfig;

/// Default config file location: `~/.ratel/ratel.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".ratel")
        .join("ratel.toml")
}

/// Load configuration from `path` (or the default location when `None`),
/// then apply environment overrides.  A missing file yields defaults; a
/// malformed file is an error so a typo never silently drops settings.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig, String> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    let mut config = if path.exists() {
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
        toml::from_str(&raw).map_err(|e| format!("invalid config '{}': {e}", path.display()))?
    } else {
        log::info!("config: no file at '{}', using defaults", path.display());
        RuntimeConfig::default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut RuntimeConfig) {
    if let Ok(v) = std::env::var("RATEL_PROXY_URL") {
        config.provider.proxy_url = v;
    }
    if let Ok(v) = std::env::var("RATEL_MODEL") {
        config.provider.model = v;
    }
    if let Ok(v) = std::env::var("RATEL_WORKSPACE") {
        config.workspace.root = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("RATEL_BOT_URL") {
        config.endpoints.bot_url = v;
    }
    if let Ok(v) = std::env::var("RATEL_USERBOT_URL") {
        config.endpoints.userbot_url = v;
    }
    if let Ok(v) = std::env::var("RATEL_SKILLS_URL") {
        config.endpoints.skills_url = v;
    }
    if let Ok(v) = std::env::var("RATEL_PORT") {
        if let Ok(port) = v.parse() {
            config.gateway.port = port;
        } else {
            log::warn!("config: ignoring non-numeric RATEL_PORT='{v}'");
        }
    }
    if let Ok(v) = std::env::var("LAZY_TOOL_LOADING") {
        config.agent.lazy_tool_loading = v.to_lowercase() == "true";
    }
    if let Ok(v) = std::env::var("MAX_CONTEXT_CHARS") {
        if let Ok(chars) = v.parse() {
            config.agent.max_context_chars = chars;
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
