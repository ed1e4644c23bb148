//! Global options and assembled configuration, generalized from the
//! teacher's `core::config::settings` (`px-core/src/core/config/settings.rs`):
//! a process-wide `EnvSnapshot` is captured once and every knob is derived
//! from it so `Config::from_snapshot` stays pure and testable.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Flags carried from the CLI layer, independent of environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub json: bool,
    pub strict: bool,
    pub config: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self { vars: env::vars().collect() }
    }

    pub(crate) fn flag_is_enabled(&self, key: &str) -> bool {
        matches!(self.vars.get(key).map(String::as_str), Some("1"))
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        Self { vars }
    }
}

/// Assembled configuration for one invocation: global options plus
/// environment-derived knobs for caching, network policy, strict mode and
/// the task runner's retry budget (spec §5, §7).
#[derive(Debug)]
pub struct Config {
    pub(crate) cache: CacheConfig,
    pub(crate) network: NetworkConfig,
    pub(crate) strict: StrictConfig,
    pub(crate) runner: RunnerConfig,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment
    /// and the CLI's global options.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache root cannot be resolved.
    pub fn from_env(options: &GlobalOptions) -> anyhow::Result<Self> {
        let snapshot = EnvSnapshot::capture();
        Self::from_snapshot(&snapshot, options)
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot, options: &GlobalOptions) -> anyhow::Result<Self> {
        let cache_root = match snapshot.var("DHT_CACHE_DIR") {
            Some(path) => PathBuf::from(path),
            None => dirs_next::cache_dir()
                .map(|dir| dir.join("dht"))
                .unwrap_or_else(|| PathBuf::from(".dht-cache")),
        };

        Ok(Self {
            cache: CacheConfig { root: cache_root },
            network: NetworkConfig {
                online: match snapshot.var("DHT_ONLINE") {
                    Some(value) => {
                        let lowered = value.to_ascii_lowercase();
                        !matches!(lowered.as_str(), "0" | "false" | "no" | "off" | "")
                    }
                    None => true,
                },
            },
            strict: StrictConfig {
                enabled: options.strict || snapshot.flag_is_enabled("DHT_STRICT"),
            },
            runner: RunnerConfig {
                max_retries: snapshot
                    .var("DHT_MAX_RETRIES")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
                max_memory_bytes: snapshot
                    .var("DHT_MAX_MEMORY_BYTES")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2 * 1024 * 1024 * 1024),
                max_cpu_time: std::time::Duration::from_secs(
                    snapshot
                        .var("DHT_MAX_CPU_SECONDS")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(600),
                ),
                max_wall_clock: std::time::Duration::from_secs(
                    snapshot
                        .var("DHT_MAX_WALL_SECONDS")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(1800),
                ),
            },
        })
    }

    #[must_use]
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    #[must_use]
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    #[must_use]
    pub fn strict(&self) -> &StrictConfig {
        &self.strict
    }

    #[must_use]
    pub fn runner(&self) -> &RunnerConfig {
        &self.runner
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    pub online: bool,
}

/// Strict mode (spec §7): capability fallback or best-effort substitution
/// becomes a hard failure (`ManifestVersionTooNew`-class exit code 5)
/// instead of a warning.
#[derive(Debug, Clone, Copy)]
pub struct StrictConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    pub max_retries: u32,
    pub max_memory_bytes: u64,
    pub max_cpu_time: std::time::Duration,
    pub max_wall_clock: std::time::Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dht_online_handles_common_falsey_values() {
        for value in ["no", "off", "", "0", "false"] {
            let snapshot = EnvSnapshot::testing(&[("DHT_ONLINE", value)]);
            let config = Config::from_snapshot(&snapshot, &GlobalOptions::default()).unwrap();
            assert!(!config.network().online, "expected offline for {value:?}");
        }
    }

    #[test]
    fn dht_online_defaults_to_true_when_unset() {
        let snapshot = EnvSnapshot::testing(&[]);
        let config = Config::from_snapshot(&snapshot, &GlobalOptions::default()).unwrap();
        assert!(config.network().online);
    }

    #[test]
    fn strict_flag_is_union_of_cli_and_env() {
        let snapshot = EnvSnapshot::testing(&[("DHT_STRICT", "1")]);
        let config = Config::from_snapshot(&snapshot, &GlobalOptions::default()).unwrap();
        assert!(config.strict().enabled);

        let snapshot = EnvSnapshot::testing(&[]);
        let options = GlobalOptions { strict: true, ..GlobalOptions::default() };
        let config = Config::from_snapshot(&snapshot, &options).unwrap();
        assert!(config.strict().enabled);
    }

    #[test]
    fn runner_limits_fall_back_to_defaults_when_unset() {
        let snapshot = EnvSnapshot::testing(&[]);
        let config = Config::from_snapshot(&snapshot, &GlobalOptions::default()).unwrap();
        assert_eq!(config.runner().max_retries, 3);
        assert_eq!(config.runner().max_wall_clock, std::time::Duration::from_secs(1800));
    }
}
