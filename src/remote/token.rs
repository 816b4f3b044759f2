// ABOUTME: Admin credential provider - stored token file plus the login mutation
// ABOUTME: Resolves the bearer token once, before any adapter is constructed

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use super::client::AdminClient;
use super::models::{LoginData, LoginResult};
use crate::error::SyncError;

const LOGIN_MUTATION: &str = r#"
mutation AdminLogin($username: String!, $password: String!) {
  login(username: $username, password: $password) {
    ... on CurrentUser {
      token
    }
    ... on ErrorResult {
      errorCode
      message
    }
  }
}
"#;

/// File holding a previously issued admin token.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored token, `None` when the file is missing or blank.
    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read token file {}", self.path.display()))?;
        let token = contents.trim();
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Some(token.to_string()))
    }

    pub fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create token directory {}", parent.display())
                })?;
            }
        }
        fs::write(&self.path, token)
            .with_context(|| format!("failed to write token file {}", self.path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

/// Picks the bearer token: the configured one, otherwise the stored one.
/// Having neither is a configuration error.
pub fn resolve_token(configured: Option<&str>, store: &TokenStore) -> Result<String> {
    if let Some(token) = configured.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }
    match store.load()? {
        Some(token) => Ok(token),
        None => Err(SyncError::config(format!(
            "no admin token configured and {} is missing or empty; run `entity-sync token issue` first",
            store.path().display()
        ))
        .into()),
    }
}

/// Issues long-lived admin tokens through the remote `login` mutation.
pub struct AdminTokenService {
    client: AdminClient,
    store: TokenStore,
}

impl AdminTokenService {
    pub fn new(client: AdminClient, store: TokenStore) -> Self {
        tracing::info!(
            endpoint = %client.endpoint(),
            "AdminTokenService initialized"
        );
        Self { client, store }
    }

    /// Logs in and saves the returned token to the token file.
    pub async fn generate_permanent_token(&self, username: &str, password: &str) -> Result<String> {
        tracing::info!(endpoint = %self.client.endpoint(), username, "Calling login mutation");

        let data: LoginData = self
            .client
            .graphql(
                LOGIN_MUTATION,
                serde_json::json!({ "username": username, "password": password }),
            )
            .await
            .context("Login mutation failed")?;

        let token = match data.login {
            LoginResult::CurrentUser { token } => token,
            LoginResult::Error {
                error_code,
                message,
            } => {
                tracing::error!(error_code = %error_code, "Login rejected: {}", message);
                bail!("login rejected: {error_code} - {message}");
            }
        };
        if token.trim().is_empty() {
            return Err(anyhow!("login succeeded but no token was returned"));
        }

        self.store.save(&token)?;
        tracing::info!(path = %self.store.path().display(), "Token saved");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_token_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("auth").join("token.txt"));
        assert!(store.load().unwrap().is_none());

        store.save("secret-token\n").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("secret-token"));
    }

    #[test]
    fn test_blank_token_file_counts_as_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.txt");
        fs::write(&path, "  \n").unwrap();
        assert!(TokenStore::new(&path).load().unwrap().is_none());
    }

    #[test]
    fn test_resolve_token_precedence() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.txt"));

        let err = resolve_token(None, &store).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Config(_))
        ));

        store.save("stored").unwrap();
        assert_eq!(resolve_token(None, &store).unwrap(), "stored");
        assert_eq!(resolve_token(Some("  "), &store).unwrap(), "stored");
        assert_eq!(resolve_token(Some("configured"), &store).unwrap(), "configured");
    }
}
