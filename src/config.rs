use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Fallback signing secret for local development. Refused at startup unless
/// `auth.allow_dev_secret` is set.
pub const DEV_SECRET_KEY: &str = "devKey@1092";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/cardwar.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer-token validity window in days.
    pub token_validity_days: i64,

    /// Permit falling back to the baked-in dev secret when no `SECRET_KEY`
    /// is configured. Must stay off in production.
    pub allow_dev_secret: bool,

    /// Signing secret override. The `SECRET_KEY` environment variable takes
    /// precedence; this exists so test setups can inject a secret without
    /// touching process env.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_validity_days: 5,
            allow_dev_secret: false,
            secret_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations) - higher = more CPU work
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

impl SecurityConfig {
    /// Cheapest parameters the argon2 crate accepts. Keeps test suites fast;
    /// never use outside tests.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            argon2_memory_cost_kib: 8,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    fn config_paths() -> Vec<PathBuf> {
        vec![PathBuf::from("config.toml")]
    }

    /// Resolve the token signing secret.
    ///
    /// Precedence: `SECRET_KEY` env var, then `auth.secret_key` from the
    /// config file, then the dev fallback (only if explicitly allowed).
    /// A production config with no secret is a startup failure, not a
    /// silent downgrade.
    pub fn resolve_secret_key(&self) -> Result<String> {
        if let Ok(secret) = std::env::var("SECRET_KEY")
            && !secret.is_empty()
        {
            return Ok(secret);
        }

        if let Some(secret) = &self.auth.secret_key
            && !secret.is_empty()
        {
            return Ok(secret.clone());
        }

        if self.auth.allow_dev_secret {
            warn!("SECRET_KEY not set; using the development signing secret");
            return Ok(DEV_SECRET_KEY.to_string());
        }

        anyhow::bail!(
            "SECRET_KEY is not set. Export it or set auth.allow_dev_secret = true for local development"
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.token_validity_days <= 0 {
            anyhow::bail!("auth.token_validity_days must be > 0");
        }

        if self.general.max_db_connections < self.general.min_db_connections {
            anyhow::bail!("general.max_db_connections must be >= min_db_connections");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.auth.token_validity_days, 5);
        assert!(!config.auth.allow_dev_secret);
        assert_eq!(config.security.argon2_memory_cost_kib, 8192);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [auth]
            token_validity_days = 1
            allow_dev_secret = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.auth.token_validity_days, 1);
        assert!(config.auth.allow_dev_secret);

        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn test_secret_resolution_prefers_explicit_config() {
        // Not exercising the env var branch here: process env is shared
        // across the test binary and would race with other tests.
        let mut config = Config::default();
        config.auth.allow_dev_secret = true;
        assert_eq!(config.resolve_secret_key().unwrap(), DEV_SECRET_KEY);

        config.auth.secret_key = Some("file-secret".to_string());
        assert_eq!(config.resolve_secret_key().unwrap(), "file-secret");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.auth.token_validity_days = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.general.max_db_connections = 0;
        assert!(config.validate().is_err());
    }
}
