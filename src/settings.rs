use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// One layer of optional overrides (CLI flags, environment, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConfigLayer {
    pub api_base_url: Option<String>,
    pub database_url: Option<String>,
    pub fallback_path: Option<PathBuf>,
}

impl ConfigLayer {
    pub fn from_env() -> Self {
        Self {
            api_base_url: std::env::var("UI_FORGE_API_BASE_URL")
                .ok()
                .or_else(|| std::env::var("OPENAI_BASE_URL").ok()),
            database_url: std::env::var("UI_FORGE_DATABASE_URL").ok(),
            fallback_path: std::env::var("UI_FORGE_FALLBACK_PATH").ok().map(PathBuf::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForgeConfig {
    pub api_base_url: String,
    pub database_url: String,
    pub fallback_path: PathBuf,
}

/// `$XDG_DATA_HOME/ui_forge`, falling back to `~/.local/share/ui_forge`.
pub fn data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME").ok().map(PathBuf::from).unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        PathBuf::from(home).join(".local").join("share")
    });
    base.join("ui_forge")
}

pub fn default_config() -> ForgeConfig {
    let dir = data_dir();
    ForgeConfig {
        api_base_url: DEFAULT_API_BASE_URL.into(),
        database_url: format!("sqlite://{}", dir.join("forge.db").to_string_lossy()),
        fallback_path: dir.join("fallback.json"),
    }
}

/// Flags win over environment, environment wins over defaults.
pub fn resolve_config(cli: &ConfigLayer, env: &ConfigLayer, defaults: ForgeConfig) -> ForgeConfig {
    ForgeConfig {
        api_base_url: cli
            .api_base_url
            .clone()
            .or_else(|| env.api_base_url.clone())
            .unwrap_or(defaults.api_base_url),
        database_url: cli
            .database_url
            .clone()
            .or_else(|| env.database_url.clone())
            .unwrap_or(defaults.database_url),
        fallback_path: cli
            .fallback_path
            .clone()
            .or_else(|| env.fallback_path.clone())
            .unwrap_or(defaults.fallback_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ForgeConfig {
        ForgeConfig {
            api_base_url: "https://default.example/v1".into(),
            database_url: "sqlite://default.db".into(),
            fallback_path: PathBuf::from("/default/fallback.json"),
        }
    }

    #[test]
    fn precedence_cli_over_env_over_defaults() {
        let cli = ConfigLayer {
            api_base_url: Some("http://localhost:8080/v1".into()),
            database_url: None,
            fallback_path: None,
        };
        let env = ConfigLayer {
            api_base_url: Some("https://env.example/v1".into()),
            database_url: Some("sqlite://env.db".into()),
            fallback_path: None,
        };

        let cfg = resolve_config(&cli, &env, defaults());
        assert_eq!(cfg.api_base_url, "http://localhost:8080/v1"); // from cli
        assert_eq!(cfg.database_url, "sqlite://env.db"); // from env
        assert_eq!(cfg.fallback_path, PathBuf::from("/default/fallback.json")); // default
    }

    #[test]
    fn empty_layers_yield_defaults() {
        let cfg = resolve_config(&ConfigLayer::default(), &ConfigLayer::default(), defaults());
        assert_eq!(cfg, defaults());
    }

    #[test]
    fn default_paths_live_under_data_dir() {
        let cfg = default_config();
        assert_eq!(cfg.api_base_url, DEFAULT_API_BASE_URL);
        assert!(cfg.database_url.starts_with("sqlite://"));
        assert!(cfg.fallback_path.starts_with(data_dir()));
    }
}
