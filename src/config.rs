use std::env;
use std::time::Duration;

use tracing::warn;

/// Env var overriding the per-tier stop grace period, in whole seconds.
pub const STOP_GRACE_ENV: &str = "PLUGHOST_STOP_GRACE_SECS";
/// Env var overriding the background reap interval, in whole seconds.
pub const REAP_INTERVAL_ENV: &str = "PLUGHOST_REAP_INTERVAL_SECS";

/// Deployment knobs for a [`crate::manager::PluginManager`].
///
/// The defaults (10 s grace, 5 s reap interval) are documented starting
/// points, not constants: override them per deployment either directly or
/// through the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// How long `stop` waits for a worker to exit, applied once per
    /// escalation tier (clean, then forceful).
    pub stop_grace: Duration,
    /// How often the background reaper scans for self-terminated workers.
    pub reap_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(10),
            reap_interval: Duration::from_secs(5),
        }
    }
}

impl ManagerConfig {
    /// Build a config from the environment, honouring a `.env` file and
    /// falling back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Some(secs) = read_secs(STOP_GRACE_ENV) {
            config.stop_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = read_secs(REAP_INTERVAL_ENV) {
            config.reap_interval = Duration::from_secs(secs);
        }
        config
    }
}

fn read_secs(key: &str) -> Option<u64> {
    let value = env::var(key).ok()?;
    match value.parse() {
        Ok(secs) => Some(secs),
        Err(_) => {
            warn!("ignoring {key}={value}: expected whole seconds");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = ManagerConfig::default();
        assert_eq!(config.stop_grace, Duration::from_secs(10));
        assert_eq!(config.reap_interval, Duration::from_secs(5));
    }

    #[test]
    fn env_overrides_are_honoured() {
        unsafe {
            env::set_var(STOP_GRACE_ENV, "3");
            env::set_var(REAP_INTERVAL_ENV, "not-a-number");
        }
        let config = ManagerConfig::from_env();
        assert_eq!(config.stop_grace, Duration::from_secs(3));
        // Unparsable values fall back to the default.
        assert_eq!(config.reap_interval, Duration::from_secs(5));
        unsafe {
            env::remove_var(STOP_GRACE_ENV);
            env::remove_var(REAP_INTERVAL_ENV);
        }
    }
}
