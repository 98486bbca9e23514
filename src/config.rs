// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Token secrets and object-storage credentials are read once at startup
//! and held in memory for the life of the process.

use crate::time_utils::parse_duration_secs;
use std::env;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ACCESS_TOKEN_EXPIRY_SECS: u64 = 24 * 60 * 60;
const DEFAULT_REFRESH_TOKEN_EXPIRY_SECS: u64 = 10 * 24 * 60 * 60;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
/// Upper bound for either token lifetime. Keeps `exp` and cookie `Max-Age`
/// well inside their integer ranges.
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Which document store backs the Credential Store and the relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local store; state is lost on restart.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND")),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Server port
    pub port: u16,
    /// Allowed CORS origin for the browser frontend
    pub cors_origin: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Storage backend selection
    pub store_backend: StoreBackend,
    /// Access token lifetime in seconds
    pub access_token_ttl_secs: u64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl_secs: u64,
    /// Where multipart uploads are staged before going to object storage
    pub upload_dir: PathBuf,
    /// Request body limit for multipart routes
    pub max_upload_bytes: usize,
    /// Cloudinary API base URL (overridable for tests)
    pub cloudinary_base_url: String,
    /// Cloudinary cloud name
    pub cloudinary_cloud_name: String,
    /// Cloudinary API key (public half)
    pub cloudinary_api_key: String,

    // --- Secrets ---
    /// HMAC key for access tokens
    pub access_token_secret: Vec<u8>,
    /// HMAC key for refresh tokens (must differ from the access key)
    pub refresh_token_secret: Vec<u8>,
    /// Cloudinary API secret used to sign uploads
    pub cloudinary_api_secret: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            cors_origin: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            store_backend: StoreBackend::Memory,
            access_token_ttl_secs: 15 * 60,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TOKEN_EXPIRY_SECS,
            upload_dir: env::temp_dir().join("videotube-uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cloudinary_base_url: "http://127.0.0.1:9".to_string(),
            cloudinary_cloud_name: "test-cloud".to_string(),
            cloudinary_api_key: "test_api_key".to_string(),
            access_token_secret: b"test_access_key_32_bytes_minimum".to_vec(),
            refresh_token_secret: b"test_refresh_key_32_bytes_minimum".to_vec(),
            cloudinary_api_secret: "test_api_secret".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local
    /// development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let access_token_secret = required("ACCESS_TOKEN_SECRET")?.into_bytes();
        let refresh_token_secret = required("REFRESH_TOKEN_SECRET")?.into_bytes();
        if access_token_secret == refresh_token_secret {
            return Err(ConfigError::Invalid("REFRESH_TOKEN_SECRET"));
        }

        Ok(Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            store_backend: env::var("STORE_BACKEND")
                .map(|v| v.parse())
                .unwrap_or(Ok(StoreBackend::Firestore))?,
            access_token_ttl_secs: duration_var(
                "ACCESS_TOKEN_EXPIRY",
                DEFAULT_ACCESS_TOKEN_EXPIRY_SECS,
            )?,
            refresh_token_ttl_secs: duration_var(
                "REFRESH_TOKEN_EXPIRY",
                DEFAULT_REFRESH_TOKEN_EXPIRY_SECS,
            )?,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./public/temp")),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            cloudinary_base_url: env::var("CLOUDINARY_BASE_URL")
                .unwrap_or_else(|_| "https://api.cloudinary.com".to_string()),
            cloudinary_cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
            cloudinary_api_key: required("CLOUDINARY_API_KEY")?,
            access_token_secret,
            refresh_token_secret,
            cloudinary_api_secret: required("CLOUDINARY_API_SECRET")?,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn duration_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => token_ttl(name, &raw),
        Err(_) => Ok(default),
    }
}

fn token_ttl(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    parse_duration_secs(raw)
        .filter(|secs| *secs <= MAX_TOKEN_TTL_SECS)
        .ok_or(ConfigError::Invalid(name))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("ACCESS_TOKEN_SECRET", "access_secret");
        env::set_var("REFRESH_TOKEN_SECRET", "refresh_secret");
        env::set_var("CLOUDINARY_CLOUD_NAME", "demo");
        env::set_var("CLOUDINARY_API_KEY", "key");
        env::set_var("CLOUDINARY_API_SECRET", "secret");
        env::set_var("ACCESS_TOKEN_EXPIRY", "15m");
        env::set_var("STORE_BACKEND", "memory");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.access_token_secret, b"access_secret");
        assert_eq!(config.refresh_token_secret, b"refresh_secret");
        assert_eq!(config.access_token_ttl_secs, 900);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.cloudinary_cloud_name, "demo");
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!(
            "Firestore".parse::<StoreBackend>().unwrap(),
            StoreBackend::Firestore
        );
        assert_eq!(" memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("mongo".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_token_ttl_bounds() {
        assert_eq!(token_ttl("ACCESS_TOKEN_EXPIRY", "365d").unwrap(), MAX_TOKEN_TTL_SECS);
        assert_eq!(token_ttl("ACCESS_TOKEN_EXPIRY", "15m").unwrap(), 900);

        for raw in ["18446744073709551615", "9223372036854775808", "366d", "0", "soon"] {
            assert!(
                matches!(
                    token_ttl("ACCESS_TOKEN_EXPIRY", raw),
                    Err(ConfigError::Invalid("ACCESS_TOKEN_EXPIRY"))
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_default_secrets_differ() {
        let config = Config::default();
        assert_ne!(config.access_token_secret, config.refresh_token_secret);
    }
}
