//! Server configuration module.
//!
//! Parses configuration from environment variables for the Tickbook server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TICKBOOK_NOTES_DIR` | No | `~/notes` | Root of the todo scan and file watch |
//! | `TICKBOOK_CHECKLIST_PATH` | No | `<notes>/House Checklist.md` | House checklist document |
//! | `PORT` | No | 8080 | HTTP server port |
//! | `TICKBOOK_DEBOUNCE_MS` | No | 1000 | Window for coalescing file events |
//! | `TICKBOOK_WATCH` | No | true | Set to `false` to disable the file watcher |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default notes directory name relative to home.
const DEFAULT_NOTES_DIR: &str = "notes";

/// Default checklist file name inside the notes directory.
pub const DEFAULT_CHECKLIST_FILE: &str = "House Checklist.md";

/// Default debounce window in milliseconds.
const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No value was given and no default could be derived.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory scanned for todos and watched for changes.
    pub notes_dir: PathBuf,

    /// The house checklist document.
    pub checklist_path: PathBuf,

    /// HTTP server port.
    pub port: u16,

    /// Quiet period before a burst of file events is acted on.
    pub debounce: Duration,

    /// Whether to run the file watcher.
    pub watch: bool,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - No notes directory is set and the home directory cannot be found
    /// - Environment variables have invalid format
    /// - Port number is not a valid u16
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tickbook_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Serving {} on port {}", config.notes_dir.display(), config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let notes_dir = parse_notes_dir()?;
        let checklist_path = parse_path_env("TICKBOOK_CHECKLIST_PATH")?
            .unwrap_or_else(|| notes_dir.join(DEFAULT_CHECKLIST_FILE));
        let port = parse_port()?;
        let debounce = Duration::from_millis(parse_debounce_ms()?);
        let watch = parse_bool_env_or("TICKBOOK_WATCH", true);

        let config = Self {
            notes_dir,
            checklist_path,
            port,
            debounce,
            watch,
        };

        config.validate()?;

        Ok(config)
    }

    /// Builds a configuration for a notes directory with every other value
    /// defaulted.
    pub fn for_notes_dir(notes_dir: impl Into<PathBuf>) -> Self {
        let notes_dir = notes_dir.into();
        Self {
            checklist_path: notes_dir.join(DEFAULT_CHECKLIST_FILE),
            notes_dir,
            port: DEFAULT_PORT,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            watch: true,
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce.is_zero() {
            return Err(ConfigError::ValidationError(
                "TICKBOOK_DEBOUNCE_MS must be greater than zero".to_string(),
            ));
        }

        if self.checklist_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "TICKBOOK_CHECKLIST_PATH cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a boolean environment variable, falling back to `default` when it
/// is unset.
///
/// `"true"` and `"false"` are matched case-insensitively; any other value is
/// treated as `false`.
fn parse_bool_env_or(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => v.eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}

/// Parse an optional path variable. Empty values count as unset.
fn parse_path_env(name: &str) -> Result<Option<PathBuf>, ConfigError> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(PathBuf::from(value))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: name.to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse the TICKBOOK_NOTES_DIR environment variable.
///
/// Returns `~/notes` if not set.
fn parse_notes_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = parse_path_env("TICKBOOK_NOTES_DIR")? {
        return Ok(dir);
    }

    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(DEFAULT_NOTES_DIR))
        .ok_or_else(|| ConfigError::MissingEnvVar("TICKBOOK_NOTES_DIR".to_string()))
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse the TICKBOOK_DEBOUNCE_MS environment variable.
fn parse_debounce_ms() -> Result<u64, ConfigError> {
    match env::var("TICKBOOK_DEBOUNCE_MS") {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidFormat {
                var: "TICKBOOK_DEBOUNCE_MS".to_string(),
                message: format!("expected milliseconds, got '{value}': {e}"),
            }),
        Err(_) => Ok(DEFAULT_DEBOUNCE_MS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to temporarily set environment variables for testing.
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old_value = env::var(key).ok();
            self.vars.push((key.to_string(), old_value));
            env::set_var(key, value);
        }

        fn remove(&mut self, key: &str) {
            let old_value = env::var(key).ok();
            self.vars.push((key.to_string(), old_value));
            env::remove_var(key);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.iter().rev() {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    fn clear_all(guard: &mut EnvGuard) {
        for key in [
            "TICKBOOK_NOTES_DIR",
            "TICKBOOK_CHECKLIST_PATH",
            "PORT",
            "TICKBOOK_DEBOUNCE_MS",
            "TICKBOOK_WATCH",
        ] {
            guard.remove(key);
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);

        let config = Config::from_env().expect("should parse config");
        assert!(config.notes_dir.ends_with(DEFAULT_NOTES_DIR));
        assert_eq!(
            config.checklist_path,
            config.notes_dir.join(DEFAULT_CHECKLIST_FILE)
        );
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.debounce, Duration::from_millis(DEFAULT_DEBOUNCE_MS));
        assert!(config.watch);
    }

    #[test]
    #[serial]
    fn test_config_from_custom_env() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("TICKBOOK_NOTES_DIR", "/srv/notes");
        guard.set("TICKBOOK_CHECKLIST_PATH", "/srv/house.md");
        guard.set("PORT", "9090");
        guard.set("TICKBOOK_DEBOUNCE_MS", "250");
        guard.set("TICKBOOK_WATCH", "false");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config.notes_dir, PathBuf::from("/srv/notes"));
        assert_eq!(config.checklist_path, PathBuf::from("/srv/house.md"));
        assert_eq!(config.port, 9090);
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert!(!config.watch);
    }

    #[test]
    #[serial]
    fn test_checklist_defaults_inside_custom_notes_dir() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("TICKBOOK_NOTES_DIR", "/srv/notes");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(
            config.checklist_path,
            PathBuf::from("/srv/notes/House Checklist.md")
        );
    }

    #[test]
    #[serial]
    fn test_empty_notes_dir_falls_back_to_default() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("TICKBOOK_NOTES_DIR", "  ");

        let config = Config::from_env().expect("should parse config");
        assert!(config.notes_dir.ends_with(DEFAULT_NOTES_DIR));
    }

    #[test]
    #[serial]
    fn test_debounce_invalid() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("TICKBOOK_DEBOUNCE_MS", "soon");

        let err = Config::from_env().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidFormat { ref var, .. } if var == "TICKBOOK_DEBOUNCE_MS")
        );
    }

    #[test]
    #[serial]
    fn test_debounce_zero_is_rejected() {
        let mut guard = EnvGuard::new();
        clear_all(&mut guard);
        guard.set("TICKBOOK_DEBOUNCE_MS", "0");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    #[serial]
    fn test_parse_bool_env_or() {
        let mut guard = EnvGuard::new();
        guard.remove("TEST_BOOL");
        assert!(parse_bool_env_or("TEST_BOOL", true));
        assert!(!parse_bool_env_or("TEST_BOOL", false));

        guard.set("TEST_BOOL", "TRUE");
        assert!(parse_bool_env_or("TEST_BOOL", false));

        guard.set("TEST_BOOL", "false");
        assert!(!parse_bool_env_or("TEST_BOOL", true));

        guard.set("TEST_BOOL", "anything-else");
        assert!(!parse_bool_env_or("TEST_BOOL", true));
    }

    #[test]
    #[serial]
    fn test_parse_port_default() {
        let mut guard = EnvGuard::new();
        guard.remove("PORT");

        let port = parse_port().expect("should parse port");
        assert_eq!(port, DEFAULT_PORT);
    }

    #[test]
    #[serial]
    fn test_parse_port_custom() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "3000");

        let port = parse_port().expect("should parse port");
        assert_eq!(port, 3000);
    }

    #[test]
    #[serial]
    fn test_parse_port_invalid() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "not-a-number");

        let result = parse_port();
        assert!(matches!(result.unwrap_err(), ConfigError::InvalidPort(_)));
    }

    #[test]
    #[serial]
    fn test_parse_port_out_of_range() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "99999");

        assert!(parse_port().is_err());
    }

    #[test]
    fn test_for_notes_dir() {
        let config = Config::for_notes_dir("/tmp/n");
        assert_eq!(config.checklist_path, PathBuf::from("/tmp/n/House Checklist.md"));
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.watch);
    }
}
