// ABOUTME: Configuration for entity-sync - TOML file plus CLI/environment overrides
// ABOUTME: Paths default under ~/.entity-sync and accept a leading ~/

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::orchestrator::OrchestratorConfig;

const APP_DIR: &str = ".entity-sync";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Change ledger and cursor database.
    pub database_path: Option<PathBuf>,
    /// Local product catalog database.
    pub catalog_path: Option<PathBuf>,
    /// Remote admin GraphQL endpoint.
    pub admin_api_url: Option<String>,
    /// Bearer token; takes precedence over `token_file`.
    pub auth_token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub event_timeout_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            catalog_path: None,
            admin_api_url: None,
            auth_token: None,
            token_file: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            event_timeout_secs: None,
        }
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_path: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub admin_api_url: Option<String>,
    pub auth_token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
    pub event_timeout_secs: Option<u64>,
}

impl SyncConfig {
    /// Loads the config file. An explicit path must exist; the default path
    /// is optional and a missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (expand_home(p)?, true),
            None => (default_config_path()?, false),
        };
        if !path.exists() {
            if required {
                return Err(SyncError::config(format!(
                    "config file {} does not exist",
                    path.display()
                ))
                .into());
            }
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| SyncError::config(e.to_string()).into())
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if overrides.database_path.is_some() {
            self.database_path = overrides.database_path;
        }
        if overrides.catalog_path.is_some() {
            self.catalog_path = overrides.catalog_path;
        }
        if overrides.admin_api_url.is_some() {
            self.admin_api_url = overrides.admin_api_url;
        }
        if overrides.auth_token.is_some() {
            self.auth_token = overrides.auth_token;
        }
        if overrides.token_file.is_some() {
            self.token_file = overrides.token_file;
        }
        if let Some(secs) = overrides.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if overrides.event_timeout_secs.is_some() {
            self.event_timeout_secs = overrides.event_timeout_secs;
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        self.path_or_default(self.database_path.as_deref(), "changes.db")
    }

    pub fn catalog_path(&self) -> Result<PathBuf> {
        self.path_or_default(self.catalog_path.as_deref(), "catalog.db")
    }

    pub fn token_file(&self) -> Result<PathBuf> {
        self.path_or_default(self.token_file.as_deref(), "token")
    }

    /// The admin endpoint; required by every command that talks to the remote.
    pub fn admin_api_url(&self) -> Result<&str> {
        self.admin_api_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                SyncError::config(
                    "admin_api_url is not set (config file, --admin-api-url or ENTITY_SYNC_ADMIN_API_URL)",
                )
                .into()
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            event_timeout: self
                .event_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    fn path_or_default(&self, configured: Option<&Path>, file_name: &str) -> Result<PathBuf> {
        match configured {
            Some(path) => expand_home(path),
            None => Ok(app_dir()?.join(file_name)),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(app_dir()?.join("config.toml"))
}

fn app_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
    Ok(home.join(APP_DIR))
}

pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let as_str = path.to_string_lossy();
    if let Some(stripped) = as_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
        return Ok(home.join(stripped));
    }
    if as_str == "~" {
        return dirs::home_dir().ok_or_else(|| anyhow!("unable to determine home directory"));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_toml() {
        let config = SyncConfig::from_toml(
            r#"
            database_path = "/var/lib/entity-sync/changes.db"
            admin_api_url = "https://shop.example.com/admin-api"
            event_timeout_secs = 45
            "#,
        )
        .unwrap();
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/var/lib/entity-sync/changes.db")
        );
        assert_eq!(config.admin_api_url().unwrap(), "https://shop.example.com/admin-api");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.orchestrator_config().event_timeout,
            Some(Duration::from_secs(45))
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = SyncConfig::from_toml("admin_url = \"x\"").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_missing_admin_url_is_config_error() {
        let config = SyncConfig {
            admin_api_url: Some("  ".to_string()),
            ..SyncConfig::default()
        };
        let err = config.admin_api_url().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_overrides_win() {
        let mut config = SyncConfig::from_toml(
            r#"
            admin_api_url = "https://a.example.com/admin-api"
            request_timeout_secs = 10
            "#,
        )
        .unwrap();
        config.apply(ConfigOverrides {
            admin_api_url: Some("https://b.example.com/admin-api".to_string()),
            auth_token: Some("tok".to_string()),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.admin_api_url().unwrap(), "https://b.example.com/admin-api");
        assert_eq!(config.auth_token.as_deref(), Some("tok"));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "catalog_path = \"/tmp/catalog.db\"\n").unwrap();

        let config = SyncConfig::load(Some(&path)).unwrap();
        assert_eq!(config.catalog_path().unwrap(), PathBuf::from("/tmp/catalog.db"));

        let missing = SyncConfig::load(Some(&dir.path().join("nope.toml")));
        assert!(missing.is_err());
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        let path = Path::new("/srv/changes.db");
        assert_eq!(expand_home(path).unwrap(), path);
    }
}
