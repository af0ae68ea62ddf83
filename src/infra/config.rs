use crate::core::token_budget::DEFAULT_MAX_TOKENS;
use crate::domain::error::{PtahError, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "PTAH_CONFIG";
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 3_000;

fn default_max_tokens() -> u64 {
    DEFAULT_MAX_TOKENS
}

fn default_init_timeout_ms() -> u64 {
    DEFAULT_INIT_TIMEOUT_MS
}

/// Configuration handed to the application once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupConfig {
    pub workspace_name: String,
    #[serde(default)]
    pub workspace_path: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub development: bool,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
}

impl StartupConfig {
    /// Placeholder used when running outside the host.
    pub fn development() -> Self {
        Self {
            workspace_name: "Development Workspace".to_string(),
            workspace_path: None,
            theme: Some("dark".to_string()),
            project_type: Some("unknown".to_string()),
            development: true,
            max_tokens: DEFAULT_MAX_TOKENS,
            init_timeout_ms: DEFAULT_INIT_TIMEOUT_MS,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: StartupConfig = serde_json::from_str(json)?;
        if config.max_tokens == 0 {
            return Err(PtahError::Config("maxTokens must be positive".to_string()));
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading startup config: {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

/// Resolve the startup config: explicit file, then `PTAH_CONFIG`, then the
/// development placeholder. A broken explicit file is an error; a broken
/// environment value only degrades to development mode.
pub fn load_startup_config(
    path: Option<&Path>,
    env_value: Option<String>,
) -> Result<StartupConfig> {
    if let Some(path) = path {
        let config = StartupConfig::from_file(path)?;
        info!("Loaded startup config for {}", config.workspace_name);
        return Ok(config);
    }

    if let Some(json) = env_value {
        match StartupConfig::from_json(&json) {
            Ok(config) => {
                info!("Loaded startup config from {}", CONFIG_ENV_VAR);
                return Ok(config);
            }
            Err(e) => warn!("Ignoring invalid {}: {}", CONFIG_ENV_VAR, e),
        }
    }

    warn!("No host configuration found, running in development mode");
    Ok(StartupConfig::development())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_applied() {
        let config = StartupConfig::from_json(r#"{"workspaceName": "ptah"}"#).unwrap();
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.init_timeout(), Duration::from_millis(3_000));
        assert!(!config.development);
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(matches!(
            StartupConfig::from_json(r#"{"workspaceName": "w", "maxTokens": 0}"#),
            Err(PtahError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"workspaceName": "demo", "workspacePath": "/src/demo", "projectType": "rust"}}"#
        )
        .unwrap();

        let config = load_startup_config(Some(file.path()), None).unwrap();
        assert_eq!(config.workspace_name, "demo");
        assert_eq!(config.project_type.as_deref(), Some("rust"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_startup_config(Some(Path::new("/nonexistent/ptah.json")), None).is_err());
    }

    #[test]
    fn test_env_fallback_and_development_mode() {
        let config =
            load_startup_config(None, Some(r#"{"workspaceName": "from-env"}"#.to_string()))
                .unwrap();
        assert_eq!(config.workspace_name, "from-env");

        let degraded = load_startup_config(None, Some("{broken".to_string())).unwrap();
        assert!(degraded.development);

        let none = load_startup_config(None, None).unwrap();
        assert_eq!(none, StartupConfig::development());
    }
}
