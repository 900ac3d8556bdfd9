//! Harness configuration, read from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use asteroid_sim::Frame;
use asteroid_server::START_DELAY_MS;

/// Loopback match configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct HarnessConfig {
    /// Seeds the network and the bots.
    pub seed: u64,
    /// Stop once the server validated this many frames.
    pub max_frames: Frame,
    pub start_delay_ms: u64,
    /// Latency of every reliable packet.
    pub reliable_latency_ms: u64,
    /// Average latency of unreliable packets.
    pub unreliable_latency_ms: u64,
    /// Unreliable latency varies uniformly within `avg ± margin`.
    pub unreliable_margin_ms: u64,
    /// Probability of dropping an unreliable packet.
    pub packet_loss: f64,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Where to write the replay, if anywhere.
    pub replay_path: Option<PathBuf>,
    pub verify_replay: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            max_frames: 1_500,
            start_delay_ms: START_DELAY_MS,
            reliable_latency_ms: 50,
            unreliable_latency_ms: 50,
            unreliable_margin_ms: 20,
            packet_loss: 0.05,
            log_level: "info".to_string(),
            replay_path: None,
            verify_replay: true,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from environment variables. Unset variables keep
    /// their default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, one call per variable name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            seed: parse(&lookup, "ASTEROID_SEED", defaults.seed)?,
            max_frames: parse(&lookup, "ASTEROID_MAX_FRAMES", defaults.max_frames)?,
            start_delay_ms: parse(&lookup, "ASTEROID_START_DELAY_MS", defaults.start_delay_ms)?,
            reliable_latency_ms: parse(
                &lookup,
                "ASTEROID_RELIABLE_LATENCY_MS",
                defaults.reliable_latency_ms,
            )?,
            unreliable_latency_ms: parse(
                &lookup,
                "ASTEROID_UNRELIABLE_LATENCY_MS",
                defaults.unreliable_latency_ms,
            )?,
            unreliable_margin_ms: parse(
                &lookup,
                "ASTEROID_UNRELIABLE_MARGIN_MS",
                defaults.unreliable_margin_ms,
            )?,
            packet_loss: parse(&lookup, "ASTEROID_PACKET_LOSS", defaults.packet_loss)?,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            replay_path: lookup("ASTEROID_REPLAY_PATH").map(PathBuf::from),
            verify_replay: parse(&lookup, "ASTEROID_VERIFY_REPLAY", defaults.verify_replay)?,
        };

        if !(0.0..1.0).contains(&config.packet_loss) {
            return Err(ConfigError::OutOfRange {
                key: "ASTEROID_PACKET_LOSS",
                reason: "must be in [0, 1)",
            });
        }
        if config.unreliable_margin_ms > config.unreliable_latency_ms {
            return Err(ConfigError::OutOfRange {
                key: "ASTEROID_UNRELIABLE_MARGIN_MS",
                reason: "must not exceed the average latency",
            });
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{key} {reason}")]
    OutOfRange {
        key: &'static str,
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = HarnessConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = HarnessConfig::from_lookup(lookup(&[
            ("ASTEROID_SEED", "42"),
            ("ASTEROID_MAX_FRAMES", " 300 "),
            ("ASTEROID_PACKET_LOSS", "0.2"),
            ("ASTEROID_REPLAY_PATH", "/tmp/match.replay"),
            ("ASTEROID_VERIFY_REPLAY", "false"),
        ]))
        .unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.max_frames, 300);
        assert_eq!(config.packet_loss, 0.2);
        assert_eq!(config.replay_path, Some(PathBuf::from("/tmp/match.replay")));
        assert!(!config.verify_replay);
    }

    #[test]
    fn test_invalid_number() {
        let err = HarnessConfig::from_lookup(lookup(&[("ASTEROID_SEED", "abc")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "ASTEROID_SEED",
                ..
            }
        ));
    }

    #[test]
    fn test_loss_out_of_range() {
        let err =
            HarnessConfig::from_lookup(lookup(&[("ASTEROID_PACKET_LOSS", "1.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn test_margin_larger_than_latency() {
        let err = HarnessConfig::from_lookup(lookup(&[
            ("ASTEROID_UNRELIABLE_LATENCY_MS", "10"),
            ("ASTEROID_UNRELIABLE_MARGIN_MS", "20"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                key: "ASTEROID_UNRELIABLE_MARGIN_MS",
                ..
            }
        ));
    }
}
