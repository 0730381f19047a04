//! Persisted login credentials.
//!
//! A single JSON file (`~/.logmd_token` by default) holds the token issued by
//! the web login page. It is written by `logmd login` and read at the start of
//! every authenticated run.

use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const TOKEN_FILE_NAME: &str = ".logmd_token";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub email: String,
    #[serde(rename = "token")]
    pub secret: String,
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl AuthToken {
    /// Parse and validate the token string pasted from the login page.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let token: AuthToken = serde_json::from_str(raw.trim())
            .map_err(|e| AuthError::Invalid(e.to_string()))?;
        token.validate()?;
        Ok(token)
    }

    fn validate(&self) -> Result<(), AuthError> {
        if self.secret.trim().is_empty() {
            return Err(AuthError::Invalid("token must not be empty".into()));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::Invalid(format!(
                "`{}` is not an email address",
                self.email
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location in the user's home directory.
    pub fn default_location() -> Result<Self, AuthError> {
        let home = dirs::home_dir().ok_or(AuthError::NoHome)?;
        Ok(Self::new(home.join(TOKEN_FILE_NAME)))
    }

    /// Use `path` when given, else the default location.
    pub fn resolve(path: Option<&Path>) -> Result<Self, AuthError> {
        match path {
            Some(p) => Ok(Self::new(p)),
            None => Self::default_location(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<AuthToken, AuthError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::Missing {
                    path: self.path.clone(),
                })
            }
            Err(source) => {
                return Err(AuthError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        AuthToken::parse(&raw)
    }

    /// Validate `raw` and persist it, replacing any previous login.
    pub fn login(&self, raw: &str) -> Result<AuthToken, AuthError> {
        let token = AuthToken::parse(raw)?;
        let body =
            serde_json::to_string(&token).map_err(|e| AuthError::Invalid(e.to_string()))?;
        std::fs::write(&self.path, body).map_err(|source| AuthError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(token)
    }
}
