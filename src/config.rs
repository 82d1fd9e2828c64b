//! Configuration management for farmdesk.
//!
//! Server configuration is read from environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `FARMDESK_DATA_DIR` - Optional. SQLite database and uploaded photos. Defaults to `./data`.
//! - `FARMDESK_STORE` - Optional. `sqlite` (default) or `memory`.
//! - `JWT_SECRET` - Required unless `DEV_MODE` is set. HS256 signing secret.
//! - `JWT_TTL_HOURS` - Optional. Access token lifetime. Defaults to `24`.
//! - `DEV_MODE` - Optional. Generates an ephemeral JWT secret when none is set.
//! - `FARMDESK_OWNER_USERNAME` / `FARMDESK_OWNER_PASSWORD` - Optional. Bootstrap owner account.
//! - `MAX_PHOTO_BYTES` - Optional. Upload bound for submission photos. Defaults to 5 MB.
//!
//! Client configuration:
//! - `FARMDESK_API_URL` - Required. Base URL of the server.
//! - `FARMDESK_POLL_INTERVAL_SECS` - Optional. Attendance poll period. Defaults to `10`.
//! - `FARMDESK_REQUEST_TIMEOUT_SECS` - Optional. Per-request timeout. Defaults to `30`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rand::RngCore;
use thiserror::Error;
use url::Url;

use crate::util::env_var_bool;
use crate::workflow::MAX_PHOTO_BYTES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(StoreKind::Sqlite),
            "memory" => Ok(StoreKind::Memory),
            other => Err(ConfigError::InvalidValue(
                "FARMDESK_STORE".to_string(),
                other.to_string(),
            )),
        }
    }
}

/// Owner account created at startup when none exists.
#[derive(Debug, Clone)]
pub struct BootstrapOwner {
    pub username: String,
    pub password: String,
}

/// Token issuing configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: String,

    /// Access token lifetime in hours
    pub jwt_ttl_hours: i64,

    pub bootstrap_owner: Option<BootstrapOwner>,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,

    pub port: u16,

    /// Holds `farmdesk.db` and the `uploads/` directory
    pub data_dir: PathBuf,

    pub store: StoreKind,

    pub dev_mode: bool,

    pub auth: AuthConfig,

    pub max_photo_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `JWT_SECRET` is not set outside
    /// dev mode.
    pub fn from_env() -> Result<Self, ConfigError> {
        let dev_mode = env_var_bool("DEV_MODE", false);

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env("PORT", 3000u16)?;

        let data_dir = std::env::var("FARMDESK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let store = match std::env::var("FARMDESK_STORE") {
            Ok(value) => value.parse()?,
            Err(_) => StoreKind::Sqlite,
        };

        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if dev_mode => {
                tracing::warn!("JWT_SECRET not set; using an ephemeral secret (DEV_MODE)");
                ephemeral_secret()
            }
            _ => return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string())),
        };
        let jwt_ttl_hours = parse_env("JWT_TTL_HOURS", 24i64)?;
        if jwt_ttl_hours <= 0 {
            return Err(ConfigError::InvalidValue(
                "JWT_TTL_HOURS".to_string(),
                jwt_ttl_hours.to_string(),
            ));
        }

        let bootstrap_owner = match (
            std::env::var("FARMDESK_OWNER_USERNAME"),
            std::env::var("FARMDESK_OWNER_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) if !username.trim().is_empty() => Some(BootstrapOwner {
                username: username.trim().to_string(),
                password,
            }),
            _ => None,
        };

        let max_photo_bytes = parse_env("MAX_PHOTO_BYTES", MAX_PHOTO_BYTES)?;

        Ok(Self {
            host,
            port,
            data_dir,
            store,
            dev_mode,
            auth: AuthConfig {
                jwt_secret,
                jwt_ttl_hours,
                bootstrap_owner,
            },
            max_photo_bytes,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(data_dir: PathBuf, jwt_secret: String) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            data_dir,
            store: StoreKind::Memory,
            dev_mode: false,
            auth: AuthConfig {
                jwt_secret,
                jwt_ttl_hours: 24,
                bootstrap_owner: None,
            },
            max_photo_bytes: MAX_PHOTO_BYTES,
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("farmdesk.db")
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, always ending in `/`
    pub api_url: Url,

    /// Attendance poll period
    pub poll_interval: Duration,

    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Load client configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `FARMDESK_API_URL` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var("FARMDESK_API_URL")
            .map_err(|_| ConfigError::MissingEnvVar("FARMDESK_API_URL".to_string()))?;
        let api_url = parse_base_url(&raw)?;
        let poll_secs = parse_env("FARMDESK_POLL_INTERVAL_SECS", 10u64)?;
        if poll_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "FARMDESK_POLL_INTERVAL_SECS".to_string(),
                "0".to_string(),
            ));
        }
        let timeout_secs = parse_env("FARMDESK_REQUEST_TIMEOUT_SECS", 30u64)?;

        Ok(Self::new(
            api_url,
            Duration::from_secs(poll_secs),
            Duration::from_secs(timeout_secs),
        ))
    }

    pub fn new(api_url: Url, poll_interval: Duration, request_timeout: Duration) -> Self {
        Self {
            api_url: with_trailing_slash(api_url),
            poll_interval,
            request_timeout,
        }
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidValue("FARMDESK_API_URL".to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue(
            "FARMDESK_API_URL".to_string(),
            format!("unsupported scheme {}", url.scheme()),
        ));
    }
    Ok(url)
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn ephemeral_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
