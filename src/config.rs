//! Service configuration, read from environment variables.

use std::env::VarError;
use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

use crate::import::DEFAULT_BATCH_SIZE;
use crate::media::DEFAULT_BASE_URL;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool { self == Self::Development }
}

#[derive(Clone)]
pub struct CdnConfig {
    pub cloud_name: String,
    pub upload_preset: String,
    pub base_url: String,
    pub folder: Option<String>,
    pub timeout_secs: u64,
}

impl fmt::Debug for CdnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdnConfig")
            .field("cloud_name", &self.cloud_name)
            .field("upload_preset", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("folder", &self.folder)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// `None` disables admin auth; only allowed in development.
    pub admin_api_token: Option<String>,
    pub nats_url: Option<String>,
    /// `None` when no CDN is configured; image uploads then answer 503.
    pub cdn: Option<CdnConfig>,
    pub import_batch_size: usize,
    pub max_upload_bytes: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[redacted]");
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &redact(&self.database_url))
            .field("db_max_connections", &self.db_max_connections)
            .field("admin_api_token", &redact(&self.admin_api_token))
            .field("nats_url", &self.nats_url)
            .field("cdn", &self.cdn)
            .field("import_batch_size", &self.import_batch_size)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl AppConfig {
    /// Loads `.env` when present, then reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value is malformed or a required variable
    /// is missing.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key))
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value is malformed or a required variable
    /// is missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let optional = |var: &str| lookup(var).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or_default = |var: &str, default: &str| optional(var).unwrap_or_else(|| default.to_string());
        let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar { var: var.to_string(), reason };

        let env = parse_environment(&or_default("APP_ENV", "development"));
        let bind_addr = or_default("BIND_ADDR", "0.0.0.0:8083")
            .parse::<SocketAddr>()
            .map_err(|e| invalid("BIND_ADDR", e.to_string()))?;

        let parse_u32 = |var: &str, default: &str| or_default(var, default).parse::<u32>().map_err(|e| invalid(var, e.to_string()));
        let parse_u64 = |var: &str, default: &str| or_default(var, default).parse::<u64>().map_err(|e| invalid(var, e.to_string()));
        let parse_usize = |var: &str, default: &str| or_default(var, default).parse::<usize>().map_err(|e| invalid(var, e.to_string()));

        let admin_api_token = optional("ADMIN_API_TOKEN");
        if admin_api_token.is_none() && !env.is_development() {
            return Err(ConfigError::MissingEnvVar("ADMIN_API_TOKEN".to_string()));
        }

        let import_batch_size = parse_usize("IMPORT_BATCH_SIZE", &DEFAULT_BATCH_SIZE.to_string())?;
        if import_batch_size == 0 {
            return Err(invalid("IMPORT_BATCH_SIZE", "must be at least 1".to_string()));
        }

        let cdn = match (optional("CDN_CLOUD_NAME"), optional("CDN_UPLOAD_PRESET")) {
            (Some(cloud_name), Some(upload_preset)) => Some(CdnConfig {
                cloud_name,
                upload_preset,
                base_url: or_default("CDN_BASE_URL", DEFAULT_BASE_URL),
                folder: optional("CDN_FOLDER"),
                timeout_secs: parse_u64("CDN_TIMEOUT_SECS", "30")?,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("CDN_UPLOAD_PRESET".to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingEnvVar("CDN_CLOUD_NAME".to_string())),
        };

        Ok(Self {
            env,
            bind_addr,
            log_level: or_default("LOG_LEVEL", "info"),
            database_url: optional("DATABASE_URL"),
            db_max_connections: parse_u32("DB_MAX_CONNECTIONS", "10")?,
            admin_api_token,
            nats_url: optional("NATS_URL"),
            cdn,
            import_batch_size,
            max_upload_bytes: parse_usize("MAX_UPLOAD_BYTES", &DEFAULT_MAX_UPLOAD_BYTES.to_string())?,
        })
    }
}

/// Unrecognized values fall back to development.
fn parse_environment(s: &str) -> Environment {
    match s.to_ascii_lowercase().as_str() {
        "production" | "prod" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from_map<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| map.get(key).map(|v| (*v).to_string()).ok_or(VarError::NotPresent)
    }

    #[test]
    fn defaults_apply_in_development() {
        let map = HashMap::new();
        let config = AppConfig::from_lookup(lookup_from_map(&map)).unwrap();
        assert_eq!(config.env, Environment::Development);
        assert_eq!(config.bind_addr.port(), 8083);
        assert_eq!(config.import_batch_size, 500);
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
        assert!(config.database_url.is_none());
        assert!(config.admin_api_token.is_none());
        assert!(config.cdn.is_none());
    }

    #[test]
    fn production_requires_admin_token() {
        let map = HashMap::from([("APP_ENV", "production")]);
        let result = AppConfig::from_lookup(lookup_from_map(&map));
        assert_eq!(result.unwrap_err(), ConfigError::MissingEnvVar("ADMIN_API_TOKEN".into()));
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let map = HashMap::from([("DB_MAX_CONNECTIONS", "lots")]);
        let err = AppConfig::from_lookup(lookup_from_map(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "DB_MAX_CONNECTIONS"));
    }

    #[test]
    fn cdn_needs_cloud_name_and_preset() {
        let partial = HashMap::from([("CDN_CLOUD_NAME", "demo")]);
        assert_eq!(
            AppConfig::from_lookup(lookup_from_map(&partial)).unwrap_err(),
            ConfigError::MissingEnvVar("CDN_UPLOAD_PRESET".into())
        );

        let full = HashMap::from([("CDN_CLOUD_NAME", "demo"), ("CDN_UPLOAD_PRESET", "unsigned"), ("CDN_FOLDER", "products")]);
        let cdn = AppConfig::from_lookup(lookup_from_map(&full)).unwrap().cdn.unwrap();
        assert_eq!(cdn.base_url, DEFAULT_BASE_URL);
        assert_eq!(cdn.folder.as_deref(), Some("products"));
        assert_eq!(cdn.timeout_secs, 30);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let map = HashMap::from([
            ("DATABASE_URL", "postgres://shop:hunter2@db/shop"),
            ("ADMIN_API_TOKEN", "super-secret"),
        ]);
        let rendered = format!("{:?}", AppConfig::from_lookup(lookup_from_map(&map)).unwrap());
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[redacted]"));
    }
}
