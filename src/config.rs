//! Application configuration loaded from environment variables.
//!
//! Firebase credentials are read once at startup; the rest of the
//! configuration is plain, non-sensitive settings.

use std::env;

/// Default port, matching the web client's development proxy.
pub const DEFAULT_PORT: u16 = 3001;

/// Which directory store backs chat history and push registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Cloud Firestore (production).
    Firestore,
    /// In-process store; data is lost on restart.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("DIRECTORY_STORE", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore and Cloud Messaging)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Directory store backend
    pub store_backend: StoreBackend,
    /// Service account JSON for Cloud Messaging, if not using ambient credentials
    pub firebase_service_account: Option<String>,
    /// Delete registrations whose tokens the gateway reports as permanently invalid
    pub prune_stale_tokens: bool,
}

impl Config {
    /// Config for tests: memory store, no credentials.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: DEFAULT_PORT,
            store_backend: StoreBackend::Memory,
            firebase_service_account: None,
            prune_stale_tokens: false,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let store_backend = match env::var("DIRECTORY_STORE") {
            Ok(value) => value.parse()?,
            Err(_) => StoreBackend::Firestore,
        };

        let prune_stale_tokens = match env::var("PRUNE_STALE_TOKENS") {
            Ok(value) => parse_bool("PRUNE_STALE_TOKENS", &value)?,
            Err(_) => false,
        };

        let firebase_service_account = env::var("FIREBASE_SERVICE_ACCOUNT")
            .ok()
            .map(|raw| decode_service_account(&raw))
            .transpose()?;

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            store_backend,
            firebase_service_account,
            prune_stale_tokens,
        })
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid(name, value.to_string())),
    }
}

/// Hosting platforms often inject the service account base64-encoded;
/// accept either that or the raw JSON document.
fn decode_service_account(raw: &str) -> Result<String, ConfigError> {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed.to_string());
    }

    let bytes = BASE64
        .decode(trimmed)
        .map_err(|_| ConfigError::Invalid("FIREBASE_SERVICE_ACCOUNT", "<redacted>".into()))?;
    let json = String::from_utf8(bytes)
        .map_err(|_| ConfigError::Invalid("FIREBASE_SERVICE_ACCOUNT", "<redacted>".into()))?;

    if !json.trim_start().starts_with('{') {
        return Err(ConfigError::Invalid(
            "FIREBASE_SERVICE_ACCOUNT",
            "<redacted>".into(),
        ));
    }
    Ok(json)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    #[test]
    fn test_config_from_env() {
        env::set_var("DIRECTORY_STORE", "memory");
        env::set_var("PRUNE_STALE_TOKENS", "true");
        env::remove_var("FIREBASE_SERVICE_ACCOUNT");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.prune_stale_tokens);
        assert!(config.firebase_service_account.is_none());
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!(
            "Firestore".parse::<StoreBackend>().unwrap(),
            StoreBackend::Firestore
        );
        assert!("mongo".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_parse_bool_rejects_garbage() {
        assert!(parse_bool("X", "maybe").is_err());
        assert!(!parse_bool("X", "off").unwrap());
    }

    #[test]
    fn test_service_account_raw_and_base64() {
        let json = r#"{"type":"service_account"}"#;
        assert_eq!(decode_service_account(json).unwrap(), json);

        let encoded = BASE64.encode(json);
        assert_eq!(decode_service_account(&encoded).unwrap(), json);

        assert!(decode_service_account("bm90IGpzb24=").is_err());
    }
}
