//! # Supervisor configuration.
//!
//! [`Config`] centralizes the runtime settings. It can be built in code
//! (`Config::default()` and field updates) or loaded from a TOML file with
//! [`Config::load`]. Every field has a default, so an empty file is valid.
//!
//! ## File format
//! ```toml
//! base_dir = "/opt/mailvisor"
//! web_server = true
//! stats_interval_secs = 10
//! stats_write_timeout_secs = 5
//! grace_secs = 30
//! bus_capacity = 1024
//!
//! [sync]
//! executable = "bin/sync"
//! restart_interval_secs = 5
//! decay = 2.0
//! restart_max_secs = 60
//! stable_after_secs = 600   # optional; resets the interval after a stable run
//! jitter = "none"           # none | full | equal | decorrelated
//!
//! [server]
//! executable = "bin/server"
//! ```
//!
//! ## Validation
//! - durations are finite and non-negative
//! - `restart_interval_secs > 0`
//! - `decay >= 1.0` and finite (the interval never shrinks)
//! - `restart_max_secs >= restart_interval_secs`
//! - `stats_interval_secs > 0`, `stats_write_timeout_secs > 0`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::policies::{DecayPolicy, JitterPolicy};
use crate::role::{PerRole, Role};

/// Settings for one supervised role.
#[derive(Clone, Debug, PartialEq)]
pub struct RoleConfig {
    /// Executable, relative to [`Config::base_dir`] unless absolute.
    pub executable: PathBuf,
    /// Restart backoff for this role.
    pub restart: DecayPolicy,
}

impl RoleConfig {
    fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            restart: DecayPolicy::default(),
        }
    }
}

/// Global configuration for the supervisor runtime.
///
/// ## Field semantics
/// - `base_dir`: directory executables are resolved against
/// - `web_server`: `false` turns `start_web_server` into a no-op
/// - `stats_interval`: period of the stats solicitation timer
/// - `stats_write_timeout`: bound on one stats write to the server's stdin
/// - `grace`: how long `run()` waits for children after halt before killing them
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `roles`: per-role executable and restart policy
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub base_dir: PathBuf,
    pub web_server: bool,
    pub stats_interval: Duration,
    pub stats_write_timeout: Duration,
    pub grace: Duration,
    pub bus_capacity: usize,
    pub roles: PerRole<RoleConfig>,
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `base_dir = "."`, `web_server = true`
    /// - `stats_interval = 10s`, `stats_write_timeout = 5s`
    /// - `grace = 30s`, `bus_capacity = 1024`
    /// - executables `sync` and `server`, [`DecayPolicy::default`] for both
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            web_server: true,
            stats_interval: Duration::from_secs(10),
            stats_write_timeout: Duration::from_secs(5),
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
            roles: PerRole::new(
                RoleConfig::with_executable("sync"),
                RoleConfig::with_executable("server"),
            ),
        }
    }
}

impl Config {
    /// Reads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates a TOML configuration string.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(text)?;
        let cfg = file.into_config()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for role in Role::ALL {
            let p = &self.roles.get(role).restart;
            if p.initial.is_zero() {
                return Err(invalid(role, "restart_interval must be > 0".into()));
            }
            if !p.decay.is_finite() || p.decay < 1.0 {
                return Err(invalid(role, format!("decay must be >= 1, got {}", p.decay)));
            }
            if p.max < p.initial {
                return Err(invalid(
                    role,
                    format!(
                        "restart_max ({:?}) is below restart_interval ({:?})",
                        p.max, p.initial
                    ),
                ));
            }
        }
        if self.stats_interval.is_zero() {
            return Err(ConfigError::Invalid {
                role: "global",
                reason: "stats_interval must be > 0".into(),
            });
        }
        if self.stats_write_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                role: "global",
                reason: "stats_write_timeout must be > 0".into(),
            });
        }
        Ok(())
    }

    /// Settings of `role`.
    #[inline]
    pub fn role(&self, role: Role) -> &RoleConfig {
        self.roles.get(role)
    }

    /// Full path of the executable spawned for `role`.
    pub fn executable_path(&self, role: Role) -> PathBuf {
        self.base_dir.join(&self.role(role).executable)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

fn invalid(role: Role, reason: String) -> ConfigError {
    ConfigError::Invalid {
        role: role.as_str(),
        reason,
    }
}

/// On-disk representation; durations are seconds.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    base_dir: PathBuf,
    web_server: bool,
    stats_interval_secs: f64,
    stats_write_timeout_secs: f64,
    grace_secs: f64,
    bus_capacity: usize,
    sync: FileRole,
    server: FileRole,
}

impl Default for FileConfig {
    fn default() -> Self {
        let d = Config::default();
        Self {
            base_dir: d.base_dir,
            web_server: d.web_server,
            stats_interval_secs: d.stats_interval.as_secs_f64(),
            stats_write_timeout_secs: d.stats_write_timeout.as_secs_f64(),
            grace_secs: d.grace.as_secs_f64(),
            bus_capacity: d.bus_capacity,
            sync: FileRole::default(),
            server: FileRole::default(),
        }
    }
}

impl FileConfig {
    fn into_config(self) -> Result<Config, ConfigError> {
        Ok(Config {
            base_dir: self.base_dir,
            web_server: self.web_server,
            stats_interval: secs("global", "stats_interval_secs", self.stats_interval_secs)?,
            stats_write_timeout: secs(
                "global",
                "stats_write_timeout_secs",
                self.stats_write_timeout_secs,
            )?,
            grace: secs("global", "grace_secs", self.grace_secs)?,
            bus_capacity: self.bus_capacity,
            roles: PerRole::new(
                self.sync.into_role(Role::Sync)?,
                self.server.into_role(Role::Server)?,
            ),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileRole {
    executable: Option<PathBuf>,
    restart_interval_secs: Option<f64>,
    decay: Option<f64>,
    restart_max_secs: Option<f64>,
    stable_after_secs: Option<f64>,
    jitter: Option<JitterPolicy>,
}

impl FileRole {
    fn into_role(self, role: Role) -> Result<RoleConfig, ConfigError> {
        let d = DecayPolicy::default();
        let scope = role.as_str();
        let opt = |key, value: Option<f64>| value.map(|v| secs(scope, key, v)).transpose();
        Ok(RoleConfig {
            executable: self
                .executable
                .unwrap_or_else(|| PathBuf::from(scope)),
            restart: DecayPolicy {
                initial: opt("restart_interval_secs", self.restart_interval_secs)?
                    .unwrap_or(d.initial),
                decay: self.decay.unwrap_or(d.decay),
                max: opt("restart_max_secs", self.restart_max_secs)?.unwrap_or(d.max),
                stable_after: opt("stable_after_secs", self.stable_after_secs)?,
                jitter: self.jitter.unwrap_or(d.jitter),
            },
        })
    }
}

/// Seconds → `Duration`; negative, non-finite or overflowing values are rejected.
fn secs(scope: &'static str, key: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::Invalid {
        role: scope,
        reason: format!("{key} must be a non-negative number of seconds, got {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_full_file() {
        let cfg = Config::from_toml_str(
            r#"
            base_dir = "/opt/mail"
            web_server = false
            stats_interval_secs = 2.5
            grace_secs = 3

            [sync]
            executable = "bin/sync"
            restart_interval_secs = 1
            decay = 3.0
            restart_max_secs = 90
            stable_after_secs = 600
            jitter = "equal"
            "#,
        )
        .unwrap();

        assert!(!cfg.web_server);
        assert_eq!(cfg.stats_interval, Duration::from_millis(2500));
        assert_eq!(cfg.grace, Duration::from_secs(3));
        assert_eq!(
            cfg.executable_path(Role::Sync),
            PathBuf::from("/opt/mail/bin/sync")
        );
        assert_eq!(
            cfg.executable_path(Role::Server),
            PathBuf::from("/opt/mail/server")
        );

        let sync = &cfg.role(Role::Sync).restart;
        assert_eq!(sync.initial, Duration::from_secs(1));
        assert_eq!(sync.decay, 3.0);
        assert_eq!(sync.max, Duration::from_secs(90));
        assert_eq!(sync.stable_after, Some(Duration::from_secs(600)));
        assert_eq!(sync.jitter, JitterPolicy::Equal);
        assert_eq!(cfg.role(Role::Server).restart, DecayPolicy::default());
    }

    #[test]
    fn test_decay_below_one_rejected() {
        let err = Config::from_toml_str("[sync]\ndecay = 0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { role: "sync", .. }));
    }

    #[test]
    fn test_max_below_initial_rejected() {
        let err = Config::from_toml_str(
            "[server]\nrestart_interval_secs = 30\nrestart_max_secs = 10\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { role: "server", .. }));
    }

    #[test]
    fn test_zero_stats_interval_rejected() {
        let err = Config::from_toml_str("stats_interval_secs = 0\n").unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
    }

    #[test]
    fn test_zero_restart_interval_rejected() {
        let err = Config::from_toml_str("[sync]\nrestart_interval_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { role: "sync", .. }));

        let mut cfg = Config::default();
        cfg.roles.server.restart.initial = Duration::ZERO;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { role: "server", .. })
        ));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let err = Config::from_toml_str("[server]\nrestart_max_secs = -5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { role: "server", .. }));

        let err = Config::from_toml_str("grace_secs = -1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { role: "global", .. }));
    }

    #[test]
    fn test_zero_stats_write_timeout_rejected() {
        let err = Config::from_toml_str("stats_write_timeout_secs = 0\n").unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Config::from_toml_str("restart = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/definitely/not/here.toml").unwrap_err();
        assert_eq!(err.as_label(), "config_read");
    }
}
