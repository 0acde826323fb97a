//! Configuration manager for creator-desk.
//!
//! Non-secret settings come from `config.yaml`. Secrets come from the
//! environment and are checked before any traffic is served.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::Zeroizing;

use crate::AppState;
use crate::crypto::{CryptoError, SymmetricKey};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ENCRYPTION_KEY_ENV: &str = "TOKEN_ENC_KEY";
pub const SESSION_SECRET_ENV: &str = "JWT_SECRET_KEY";
pub const CLIENT_SECRET_ENV: &str = "CLIENT_SECRET";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Listen address.
    pub address: String,
    /// Dashboard front-end, target of the post-login redirect.
    pub frontend_url: String,
    /// Set the `Secure` attribute on the session cookie.
    pub secure_cookies: bool,
    #[serde(skip_deserializing)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to session tokens.
    pub session: Session,
    /// Related to the OAuth identity provider.
    #[serde(skip_serializing)]
    pub provider: Provider,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            address: "0.0.0.0:3000".to_owned(),
            frontend_url: "http://localhost:5173/".to_owned(),
            secure_cookies: false,
            version: String::default(),
            path: PathBuf::default(),
            session: Session::default(),
            provider: Provider::default(),
            postgres: None,
        }
    }
}

/// Session token configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    /// Session token lifetime.
    pub ttl_seconds: u64,
    /// Name of the cookie carrying the session token.
    pub cookie_name: String,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            ttl_seconds: crate::token::DEFAULT_TTL,
            cookie_name: "session".to_owned(),
        }
    }
}

/// OAuth identity provider configuration. Defaults target Google.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provider {
    pub client_id: String,
    /// Overridden by the `CLIENT_SECRET` environment variable.
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorization_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    /// Bound on every call to the provider.
    pub timeout_ms: u64,
}

impl Default for Provider {
    fn default() -> Self {
        Self {
            client_id: String::default(),
            client_secret: String::default(),
            redirect_uri: "http://localhost:3000/auth/callback".to_owned(),
            authorization_url: "https://accounts.google.com/o/oauth2/v2/auth".to_owned(),
            token_url: "https://oauth2.googleapis.com/token".to_owned(),
            userinfo_url: "https://www.googleapis.com/oauth2/v3/userinfo".to_owned(),
            scopes: vec![
                "openid".to_owned(),
                "email".to_owned(),
                "profile".to_owned(),
                "https://www.googleapis.com/auth/youtube.force-ssl".to_owned(),
            ],
            timeout_ms: 10_000,
        }
    }
}

impl Provider {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// PostgreSQL configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
    /// Bound on every store call.
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

fn default_store_timeout() -> u64 {
    5_000
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Bound on every store call.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(
            self.postgres
                .as_ref()
                .map(|postgres| postgres.timeout_ms)
                .unwrap_or_else(default_store_timeout),
        )
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => match serde_yaml::from_reader(file) {
                Ok(config) => Ok(Arc::new(Self::finalize(config)?)),
                Err(err) => Ok(Arc::new(self.error(err))),
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Parse a configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let config: Configuration = serde_yaml::from_str(yaml)?;
        Self::finalize(config).map_err(serde::de::Error::custom)
    }

    fn finalize(mut config: Configuration) -> Result<Self, url::ParseError> {
        // set app version.
        config.version = VERSION.to_owned();

        // normalize URLs.
        config.frontend_url = Self::normalize_url(&config.frontend_url)?;
        config.provider.redirect_uri = Self::normalize_url(&config.provider.redirect_uri)?;

        Ok(config)
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }

    /// Front-end URL joined with `path`, without doubled slashes.
    pub fn frontend(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.frontend_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Errors raised while loading secrets.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing `{0}` environment variable")]
    Missing(&'static str),
    #[error("`{0}` environment variable is empty")]
    Empty(&'static str),
    #[error("`TOKEN_ENC_KEY` is unusable: {0}")]
    Key(#[from] CryptoError),
}

/// Process secrets. Never serialized, never logged.
pub struct Secrets {
    pub encryption_key: SymmetricKey,
    pub session_secret: Zeroizing<Vec<u8>>,
    pub client_secret: Option<Zeroizing<String>>,
}

impl Secrets {
    /// Load secrets from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load secrets through `lookup`, called with variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let key = Zeroizing::new(
            lookup(ENCRYPTION_KEY_ENV).ok_or(ConfigError::Missing(ENCRYPTION_KEY_ENV))?,
        );
        let encryption_key = SymmetricKey::from_base64(key.as_bytes())?;

        let session_secret = Zeroizing::new(
            lookup(SESSION_SECRET_ENV)
                .ok_or(ConfigError::Missing(SESSION_SECRET_ENV))?
                .into_bytes(),
        );
        if session_secret.is_empty() {
            return Err(ConfigError::Empty(SESSION_SECRET_ENV));
        }

        let client_secret = lookup(CLIENT_SECRET_ENV)
            .filter(|secret| !secret.is_empty())
            .map(Zeroizing::new);

        Ok(Self {
            encryption_key,
            session_secret,
            client_secret,
        })
    }
}
