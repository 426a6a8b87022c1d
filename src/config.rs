use crate::core::{GuardError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable selecting the deployment profile.
pub const PROFILE_ENV: &str = "SQLGUARD_PROFILE";

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
}

impl Config {
    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Config> {
        toml::from_str(content).map_err(|e| GuardError::Config(e.to_string()))
    }
}

/// Deployment profile, choosing the retry budget when none is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// 3 second budget
    #[default]
    Standard,
    /// 30 second budget, for hosts where file locks are held for long stretches
    Stability,
}

impl Profile {
    pub fn default_timeout_ms(self) -> u64 {
        match self {
            Profile::Standard => 3_000,
            Profile::Stability => 30_000,
        }
    }

    /// Reads the profile from `SQLGUARD_PROFILE`, falling back to `Standard`.
    pub fn from_env() -> Profile {
        std::env::var(PROFILE_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }
}

impl std::str::FromStr for Profile {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Profile::Standard),
            "stability" => Ok(Profile::Stability),
            other => Err(GuardError::Config(format!("unknown profile '{}'", other))),
        }
    }
}

/// How long a statement may keep retrying on lock contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Bounded local retries, then one reconnect
    Finite(Duration),
    /// Keep backing off until the engine stops reporting contention
    Unbounded,
}

impl RetryMode {
    /// `0` means retry forever.
    pub fn from_millis(ms: u64) -> RetryMode {
        if ms == 0 {
            RetryMode::Unbounded
        } else {
            RetryMode::Finite(Duration::from_millis(ms))
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, RetryMode::Unbounded)
    }
}

/// Connection-level settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub profile: Profile,
    /// Retry budget; `0` retries forever, absent uses the profile default
    pub timeout_ms: Option<u64>,
    /// Hint passed to the engine's own busy handler
    pub busy_timeout_ms: u64,
    /// Local busy retries before escalating to a reconnect
    pub busy_retry_limit: u32,
    pub busy_retry_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            profile: Profile::Standard,
            timeout_ms: None,
            busy_timeout_ms: 2_000,
            busy_retry_limit: 10,
            busy_retry_delay_ms: 15,
        }
    }
}

impl ConnectionConfig {
    /// Defaults for the given deployment profile.
    pub fn for_profile(profile: Profile) -> Self {
        ConnectionConfig {
            profile,
            ..Default::default()
        }
    }

    /// Defaults for the profile named by `SQLGUARD_PROFILE`.
    pub fn from_env() -> Self {
        Self::for_profile(Profile::from_env())
    }

    pub fn retry_mode(&self) -> RetryMode {
        RetryMode::from_millis(
            self.timeout_ms
                .unwrap_or_else(|| self.profile.default_timeout_ms()),
        )
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn busy_retry_delay(&self) -> Duration {
        Duration::from_millis(self.busy_retry_delay_ms)
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = sqlguard::config::load_config("sqlguard.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"
[connection]
profile = "stability"
busy_timeout_ms = 500
busy_retry_limit = 4
busy_retry_delay_ms = 2
"#;

    #[test]
    fn test_load_config_from_str() {
        let config = Config::from_toml_str(SAMPLE_CONFIG).expect("Failed to parse sample config");
        let conn = config.connection;
        assert_eq!(conn.profile, Profile::Stability);
        assert_eq!(conn.timeout_ms, None);
        assert_eq!(conn.busy_timeout(), Duration::from_millis(500));
        assert_eq!(conn.busy_retry_limit, 4);
        assert_eq!(conn.retry_mode(), RetryMode::Finite(Duration::from_secs(30)));
    }

    #[test]
    fn test_defaults_when_section_missing() {
        let config = Config::from_toml_str("").unwrap();
        let conn = config.connection;
        assert_eq!(conn.retry_mode(), RetryMode::Finite(Duration::from_secs(3)));
        assert_eq!(conn.busy_retry_limit, 10);
        assert_eq!(conn.busy_retry_delay(), Duration::from_millis(15));
        assert_eq!(conn.busy_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_zero_timeout_is_unbounded() {
        let config = Config::from_toml_str("[connection]\ntimeout_ms = 0\n").unwrap();
        assert!(config.connection.retry_mode().is_unbounded());
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let err = Config::from_toml_str("[connection]\nprofile = \"fast\"\n").unwrap_err();
        assert!(matches!(err, GuardError::Config(_)));
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!(" Stability ".parse::<Profile>().unwrap(), Profile::Stability);
        assert!("turbo".parse::<Profile>().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "[connection]\ntimeout_ms = 250\n").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(
            config.connection.retry_mode(),
            RetryMode::Finite(Duration::from_millis(250))
        );

        assert!(matches!(
            load_config("/nonexistent/sqlguard.toml"),
            Err(GuardError::Io(_))
        ));
    }
}
