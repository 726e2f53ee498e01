//! Environment-driven configuration.
//!
//! Defaults first, then an overlay from environment variables. Probe
//! settings use a per-kind prefix (`STARTUP_PROBE_`, `LIVENESS_PROBE_`,
//! `READINESS_PROBE_`) in front of the shared suffixes.

use std::env;

use thiserror::Error;
use tracing::debug;

use crate::probe::ProbeSettings;
use crate::util::parse_bool;

// environment
const ENV_DEBUG: &str = "DEBUG";
const ENV_LISTEN_ON: &str = "LISTEN_ON";
// probe environment prefixes
const ENV_PREFIX_STARTUP: &str = "STARTUP_PROBE_";
const ENV_PREFIX_LIVENESS: &str = "LIVENESS_PROBE_";
const ENV_PREFIX_READINESS: &str = "READINESS_PROBE_";
// probe environment suffixes
const ENV_STATUS_OK: &str = "STATUS_OK";
const ENV_STATUS_ERROR: &str = "STATUS_ERROR";
const ENV_FAIL: &str = "FAIL";
const ENV_FAIL_NB: &str = "FAIL_NB";
const ENV_DELAY: &str = "DELAY";

const DEFAULT_LISTEN_ON: &str = "0.0.0.0:8080";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse {variable} as a boolean (value: {value})")]
    InvalidBool { variable: String, value: String },

    #[error("failed to parse {variable} as an integer (value: {value})")]
    InvalidInt { variable: String, value: String },

    #[error("{variable} is inferior to zero (value: {value})")]
    NegativeValue { variable: String, value: String },

    #[error("{variable} is not a valid HTTP status code (value: {value})")]
    InvalidStatus { variable: String, value: String },

    #[error("failed to parse {variable} as a duration (value: {value}): {source}")]
    InvalidDuration {
        variable: String,
        value: String,
        source: humantime::DurationError,
    },
}

/// Process configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_on: String,
    pub debug: bool,
    pub probes: ProbesConfig,
}

/// Initial settings for the three probes.
#[derive(Debug, Clone, Default)]
pub struct ProbesConfig {
    pub startup: ProbeSettings,
    pub liveness: ProbeSettings,
    pub readiness: ProbeSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_on: DEFAULT_LISTEN_ON.to_string(),
            debug: false,
            probes: ProbesConfig::default(),
        }
    }
}

impl Config {
    /// Builds the configuration from defaults overlaid with environment
    /// variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(listen_on) = env::var(ENV_LISTEN_ON) {
            config.listen_on = listen_on;
        }
        if let Ok(value) = env::var(ENV_DEBUG) {
            config.debug = parse_bool(&value).ok_or_else(|| ConfigError::InvalidBool {
                variable: ENV_DEBUG.to_string(),
                value,
            })?;
        }

        overlay_probe(&mut config.probes.startup, ENV_PREFIX_STARTUP)?;
        overlay_probe(&mut config.probes.liveness, ENV_PREFIX_LIVENESS)?;
        overlay_probe(&mut config.probes.readiness, ENV_PREFIX_READINESS)?;

        Ok(config)
    }

    /// Re-checks invariants on a fully built configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, probe) in [
            ("startup", &self.probes.startup),
            ("liveness", &self.probes.liveness),
            ("readiness", &self.probes.readiness),
        ] {
            for (field, status) in [("ok", probe.status_ok), ("error", probe.status_fail)] {
                if !(100..=599).contains(&status) {
                    return Err(ConfigError::InvalidStatus {
                        variable: format!("{name} probe status {field}"),
                        value: status.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Logs the effective configuration at debug level.
    pub fn log(&self) {
        debug!("CONFIG :: listening on: {}", self.listen_on);
        log_probe("startup", &self.probes.startup);
        log_probe("liveness", &self.probes.liveness);
        log_probe("readiness", &self.probes.readiness);
    }
}

fn log_probe(name: &str, settings: &ProbeSettings) {
    debug!("CONFIG :: {name} probe status code ok: {}", settings.status_ok);
    debug!(
        "CONFIG :: {name} probe status code fail: {}",
        settings.status_fail
    );
    debug!("CONFIG :: {name} probe set to fail: {}", settings.fail);
    debug!(
        "CONFIG :: {name} probe number of failures: {}",
        settings.fail_count
    );
    debug!(
        "CONFIG :: {name} probe delay: {}",
        humantime::format_duration(settings.delay)
    );
}

fn overlay_probe(settings: &mut ProbeSettings, prefix: &str) -> Result<(), ConfigError> {
    if let Some((variable, value)) = probe_var(prefix, ENV_STATUS_OK) {
        settings.status_ok = parse_status(&variable, &value)?;
    }
    if let Some((variable, value)) = probe_var(prefix, ENV_STATUS_ERROR) {
        settings.status_fail = parse_status(&variable, &value)?;
    }
    if let Some((variable, value)) = probe_var(prefix, ENV_FAIL) {
        settings.fail = parse_bool(&value)
            .ok_or(ConfigError::InvalidBool { variable, value })?;
    }
    if let Some((variable, value)) = probe_var(prefix, ENV_FAIL_NB) {
        settings.fail_count = parse_count(&variable, &value)?;
    }
    if let Some((variable, value)) = probe_var(prefix, ENV_DELAY) {
        settings.delay =
            humantime::parse_duration(&value).map_err(|source| ConfigError::InvalidDuration {
                variable,
                value,
                source,
            })?;
    }
    Ok(())
}

fn probe_var(prefix: &str, suffix: &str) -> Option<(String, String)> {
    let variable = format!("{prefix}{suffix}");
    let value = env::var(&variable).ok()?;
    Some((variable, value))
}

fn parse_status(variable: &str, value: &str) -> Result<u16, ConfigError> {
    let invalid = || ConfigError::InvalidStatus {
        variable: variable.to_string(),
        value: value.to_string(),
    };
    let status: u16 = value.parse().map_err(|_| invalid())?;
    if !(100..=599).contains(&status) {
        return Err(invalid());
    }
    Ok(status)
}

fn parse_count(variable: &str, value: &str) -> Result<u32, ConfigError> {
    let parsed: i64 = value.parse().map_err(|_| ConfigError::InvalidInt {
        variable: variable.to_string(),
        value: value.to_string(),
    })?;
    if parsed < 0 {
        return Err(ConfigError::NegativeValue {
            variable: variable.to_string(),
            value: value.to_string(),
        });
    }
    u32::try_from(parsed).map_err(|_| ConfigError::InvalidInt {
        variable: variable.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    fn clear_env() {
        for variable in [ENV_DEBUG, ENV_LISTEN_ON] {
            env::remove_var(variable);
        }
        for prefix in [ENV_PREFIX_STARTUP, ENV_PREFIX_LIVENESS, ENV_PREFIX_READINESS] {
            for suffix in [ENV_STATUS_OK, ENV_STATUS_ERROR, ENV_FAIL, ENV_FAIL_NB, ENV_DELAY] {
                env::remove_var(format!("{prefix}{suffix}"));
            }
        }
    }

    #[test]
    #[serial]
    fn defaults_without_environment() {
        clear_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config.listen_on, "0.0.0.0:8080");
        assert!(!config.debug);
        assert_eq!(config.probes.liveness.status_ok, 200);
        assert_eq!(config.probes.liveness.status_fail, 500);
        assert_eq!(config.probes.liveness.fail_count, 0);
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn environment_overlays_probe_settings() {
        clear_env();
        env::set_var("LISTEN_ON", "127.0.0.1:9999");
        env::set_var("DEBUG", "true");
        env::set_var("READINESS_PROBE_STATUS_ERROR", "503");
        env::set_var("READINESS_PROBE_FAIL", "1");
        env::set_var("READINESS_PROBE_FAIL_NB", "7");
        env::set_var("READINESS_PROBE_DELAY", "150ms");

        let config = Config::from_env().unwrap();
        assert_eq!(config.listen_on, "127.0.0.1:9999");
        assert!(config.debug);
        assert_eq!(config.probes.readiness.status_fail, 503);
        assert!(config.probes.readiness.fail);
        assert_eq!(config.probes.readiness.fail_count, 7);
        assert_eq!(config.probes.readiness.delay, Duration::from_millis(150));
        // other probes untouched
        assert_eq!(config.probes.startup.status_fail, 500);

        clear_env();
    }

    #[test]
    #[serial]
    fn out_of_range_status_is_rejected() {
        clear_env();
        env::set_var("LIVENESS_PROBE_STATUS_OK", "99");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidStatus { .. })
        ));
        env::set_var("LIVENESS_PROBE_STATUS_OK", "600");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidStatus { .. })
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn negative_failure_count_is_rejected() {
        clear_env();
        env::set_var("STARTUP_PROBE_FAIL_NB", "-3");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::NegativeValue { .. })
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn malformed_duration_is_rejected() {
        clear_env();
        env::set_var("STARTUP_PROBE_DELAY", "soon");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidDuration { .. })
        ));
        clear_env();
    }
}
