//! Token material and per-profile token storage.
//!
//! Tokens are provisioned out of band (any Connect-compatible login tool
//! can produce them) and read from a per-profile JSON file. The sync never
//! performs the interactive login itself; an expired or missing token
//! surfaces as an authentication error and aborts the run.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

const TOKEN_FILENAME: &str = "oauth2_token.json";

/// OAuth2 Bearer token for API requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuth2Token {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default)]
    pub refresh_token_expires_at: i64,
}

impl OAuth2Token {
    /// Check if the access token has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now().timestamp()
    }

    /// Returns the Authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// File-based token storage, one directory per profile.
pub struct TokenStore {
    profile: String,
    base_dir: PathBuf,
}

impl TokenStore {
    pub fn new(profile: Option<String>) -> Result<Self> {
        let profile = profile.unwrap_or_else(|| "default".to_string());
        let base_dir = crate::config::data_dir()?.join(&profile);
        crate::config::ensure_dir(&base_dir)?;
        Ok(Self { profile, base_dir })
    }

    /// Token store rooted at a custom directory (for testing).
    pub fn with_dir(profile: impl Into<String>, base_dir: PathBuf) -> Result<Self> {
        let profile = profile.into();
        let dir = base_dir.join(&profile);
        crate::config::ensure_dir(&dir)?;
        Ok(Self {
            profile,
            base_dir: dir,
        })
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn token_path(&self) -> PathBuf {
        self.base_dir.join(TOKEN_FILENAME)
    }

    pub fn save(&self, token: &OAuth2Token) -> Result<()> {
        let path = self.token_path();
        let json = serde_json::to_string_pretty(token)?;
        fs::write(&path, json)?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    pub fn load(&self) -> Result<Option<OAuth2Token>> {
        let path = self.token_path();
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        let token: OAuth2Token = serde_json::from_str(&json)?;
        Ok(Some(token))
    }

    /// Load a usable token or fail with the auth error the caller must
    /// surface to the user.
    pub fn require(&self) -> Result<OAuth2Token> {
        match self.load()? {
            None => Err(SyncError::NotAuthenticated),
            Some(token) if token.is_expired() => Err(SyncError::auth(format!(
                "token for profile '{}' has expired",
                self.profile
            ))),
            Some(token) => Ok(token),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token_path().exists()
    }

    pub fn clear(&self) -> Result<()> {
        let path = self.token_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
