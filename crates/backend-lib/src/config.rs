// ============================
// signal-backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::join_code::DEFAULT_CODE_LENGTH;

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "signal.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Interface to bind
    pub host: IpAddr,
    /// Listening port
    pub port: u16,
    /// Shared store URL; `None` or `memory://` selects the in-process store
    pub store_url: Option<String>,
    /// Seconds between join code rotations, also the advertised code `ttl`
    pub rotation_interval_secs: u64,
    /// Extra seconds a reserved code stays resolvable after its rotation
    pub code_grace_secs: u64,
    /// Absolute room lifetime in seconds, set once at creation
    pub room_ttl_secs: u64,
    /// Number of digits in a join code
    pub join_code_length: usize,
    /// Candidates tried per issuance cycle before giving up
    pub max_code_attempts: u32,
    /// Upper bound for a single store round-trip, in milliseconds
    pub store_timeout_ms: u64,
    /// Outbound frames buffered per connection
    pub outbound_buffer: usize,
    /// Log level
    pub log_level: String,
    /// Log format
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            store_url: None,
            rotation_interval_secs: 5,
            code_grace_secs: 5,
            room_ttl_secs: 60 * 15,
            join_code_length: DEFAULT_CODE_LENGTH,
            max_code_attempts: 10,
            store_timeout_ms: 2000,
            outbound_buffer: 32,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Load settings from `signal.toml` (if present) and the environment
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load settings from a specific TOML file (if present) and the environment
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let settings: Settings = Self::figment(path).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Like [`Settings::load_from`], but a missing file is an error. Used when
    /// the operator named the file explicitly.
    pub fn load_required<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AppError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Self::load_from(path)
    }

    /// Layered sources, later ones win: defaults, TOML file, bare
    /// `PORT`/`REDIS_URL`, then `SIGNAL_*` variables.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::raw().only(&["port"]))
            .merge(
                Env::raw()
                    .only(&["redis_url"])
                    .map(|_| "store_url".into()),
            )
            .merge(Env::prefixed("SIGNAL_"))
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.rotation_interval_secs == 0 {
            return Err(AppError::Config(
                "rotation_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.room_ttl_secs <= self.rotation_interval_secs {
            return Err(AppError::Config(format!(
                "room_ttl_secs ({}) must exceed rotation_interval_secs ({})",
                self.room_ttl_secs, self.rotation_interval_secs
            )));
        }
        if !(4..=12).contains(&self.join_code_length) {
            return Err(AppError::Config(format!(
                "join_code_length must be between 4 and 12, got {}",
                self.join_code_length
            )));
        }
        if self.max_code_attempts == 0 {
            return Err(AppError::Config(
                "max_code_attempts must be at least 1".to_string(),
            ));
        }
        if self.store_timeout_ms == 0 {
            return Err(AppError::Config(
                "store_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.outbound_buffer == 0 {
            return Err(AppError::Config(
                "outbound_buffer must be at least 1".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "unknown log level: {}",
                self.log_level
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    /// Expiry written with each reserved join code
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs + self.code_grace_secs)
    }

    pub fn room_ttl(&self) -> Duration {
        Duration::from_secs(self.room_ttl_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Whether the configured store is the in-process one
    pub fn uses_memory_store(&self) -> bool {
        match self.store_url.as_deref() {
            None => true,
            Some(url) => url.is_empty() || url.starts_with("memory://"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_match_reference_behaviour() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.rotation_interval(), Duration::from_secs(5));
        assert_eq!(settings.code_ttl(), Duration::from_secs(10));
        assert_eq!(settings.room_ttl(), Duration::from_secs(900));
        assert_eq!(settings.join_code_length, 6);
        assert_eq!(settings.max_code_attempts, 10);
        assert!(settings.uses_memory_store());
    }

    #[test]
    fn test_settings_validation() {
        let settings = Settings::default();

        let mut invalid = settings.clone();
        invalid.rotation_interval_secs = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.room_ttl_secs = 5;
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.join_code_length = 3;
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.max_code_attempts = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.log_level = "loud".to_string();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_load_settings_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "signal.toml",
                r#"
                port = 4000
                rotation_interval_secs = 3
                log_level = "debug"
                "#,
            )?;
            jail.set_env("REDIS_URL", "redis://cache:6379");
            jail.set_env("SIGNAL_LOG_LEVEL", "warn");

            let settings = Settings::load().map_err(|e| e.to_string())?;
            assert_eq!(settings.port, 4000);
            assert_eq!(settings.rotation_interval_secs, 3);
            assert_eq!(settings.store_url.as_deref(), Some("redis://cache:6379"));
            // Environment variable takes precedence
            assert_eq!(settings.log_level, "warn");
            assert!(!settings.uses_memory_store());
            Ok(())
        });
    }

    #[test]
    fn test_bare_port_env_is_honoured() {
        Jail::expect_with(|jail| {
            jail.set_env("PORT", "8089");
            let settings = Settings::load().map_err(|e| e.to_string())?;
            assert_eq!(settings.bind_addr().port(), 8089);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("signal.toml", "join_code_length = 40")?;
            assert!(Settings::load().is_err());
            Ok(())
        });
    }

    #[test]
    fn test_explicit_config_file_must_exist() {
        Jail::expect_with(|jail| {
            let err = Settings::load_required("signla.toml").unwrap_err();
            assert!(matches!(err, AppError::Config(ref msg) if msg.contains("signla.toml")));

            jail.create_file("custom.toml", "port = 4100")?;
            let settings = Settings::load_required("custom.toml").map_err(|e| e.to_string())?;
            assert_eq!(settings.port, 4100);
            Ok(())
        });
    }
}
