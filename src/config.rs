//! Runtime settings
//!
//! Defaults: a 300 ms counter tick, a one second snapshot and a three second
//! respawn cadence.

use crate::error::{WardenError, WardenResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SEGMENT_NAME: &str = "counter_app_shared";
pub const DEFAULT_LOG_PATH: &str = "counter_app.log";
pub const ENV_PREFIX: &str = "COUNTER_WARDEN";

/// How long an opener waits for the creator to finish building the mutex.
pub const SEGMENT_INIT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub segment_name: String,
    pub log_path: PathBuf,
    pub log_level: Option<String>,
    pub counter_period_ms: u64,
    pub snapshot_period_ms: u64,
    pub respawn_period_ms: u64,
    pub join_timeout_ms: u64,
    pub adder_increment: i64,
    pub multiplier_factor: i64,
    pub multiplier_hold_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            segment_name: DEFAULT_SEGMENT_NAME.to_string(),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            log_level: None,
            counter_period_ms: 300,
            snapshot_period_ms: 1000,
            respawn_period_ms: 3000,
            join_timeout_ms: 1000,
            adder_increment: 10,
            multiplier_factor: 2,
            multiplier_hold_ms: 2000,
        }
    }
}

impl Settings {
    /// Layer defaults, an optional config file and `COUNTER_WARDEN_*`
    /// environment variables, in that order.
    pub fn load(config_file: Option<&Path>) -> WardenResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX).try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> WardenResult<()> {
        if self.segment_name.trim().is_empty() {
            return Err(WardenError::config("segment_name must not be empty"));
        }

        let periods = [
            ("counter_period_ms", self.counter_period_ms),
            ("snapshot_period_ms", self.snapshot_period_ms),
            ("respawn_period_ms", self.respawn_period_ms),
        ];
        for (field, value) in periods {
            if value == 0 {
                return Err(WardenError::config(format!("{field} must be greater than zero")));
            }
        }

        if self.multiplier_factor == 0 {
            return Err(WardenError::config("multiplier_factor must not be zero"));
        }

        Ok(())
    }

    pub fn counter_period(&self) -> Duration {
        Duration::from_millis(self.counter_period_ms)
    }

    pub fn snapshot_period(&self) -> Duration {
        Duration::from_millis(self.snapshot_period_ms)
    }

    pub fn respawn_period(&self) -> Duration {
        Duration::from_millis(self.respawn_period_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn multiplier_hold(&self) -> Duration {
        Duration::from_millis(self.multiplier_hold_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    struct EnvGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(val) => env::set_var(&self.key, val),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn default_cadence() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.segment_name, DEFAULT_SEGMENT_NAME);
        assert_eq!(settings.counter_period(), Duration::from_millis(300));
        assert_eq!(settings.snapshot_period(), Duration::from_secs(1));
        assert_eq!(settings.respawn_period(), Duration::from_secs(3));
        assert_eq!(settings.adder_increment, 10);
        assert_eq!(settings.multiplier_factor, 2);
    }

    #[test]
    #[serial]
    fn file_then_environment_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "segment_name = \"from_file\"").unwrap();
        writeln!(file, "counter_period_ms = 50").unwrap();
        file.flush().unwrap();

        let _guard = EnvGuard::set("COUNTER_WARDEN_COUNTER_PERIOD_MS", "75");

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.segment_name, "from_file");
        assert_eq!(settings.counter_period_ms, 75);
        assert_eq!(settings.respawn_period_ms, 3000);
    }

    #[test]
    #[serial]
    fn zero_period_is_rejected() {
        let _guard = EnvGuard::set("COUNTER_WARDEN_SNAPSHOT_PERIOD_MS", "0");
        let err = Settings::load(None).unwrap_err();
        assert!(matches!(err, WardenError::Config { .. }));
        assert!(err.to_string().contains("snapshot_period_ms"));
    }

    #[test]
    fn zero_factor_is_rejected() {
        let settings = Settings {
            multiplier_factor: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
