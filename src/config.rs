use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::error::HealthError;
use crate::health::{CRITICAL_THRESHOLD, WARNING_THRESHOLD};

/// Lowest minimum health factor a user may ask us to protect.
pub const MIN_PROTECTED_HEALTH: f64 = 1.2;
/// Highest minimum health factor a user may ask us to protect.
pub const MAX_PROTECTED_HEALTH: f64 = 3.0;

/// Health factor a rebalance restores when the user gives none.
const DEFAULT_TARGET_HEALTH: f64 = 2.0;

const DEFAULT_INTERVAL_SECS: u64 = 30;
const DEFAULT_LOG_DIR: &str = "agent/logs";
const DEFAULT_AGENT_NAME: &str = "solshield";

/// Runtime configuration loaded from environment and CLI.
#[derive(Debug, Clone)]
pub struct Config {
    pub check_interval: Duration,
    pub log_dir: PathBuf,
    pub agent_name: String,
}

impl Config {
    /// Load configuration from environment variables and optional CLI overrides.
    pub fn from_env(interval_cli: Option<u64>, log_dir_cli: Option<PathBuf>) -> Result<Self> {
        dotenv().ok();

        let interval_secs = match interval_cli {
            Some(secs) => secs,
            None => match std::env::var("CHECK_INTERVAL_SECONDS") {
                Ok(raw) => raw
                    .parse()
                    .with_context(|| format!("Invalid CHECK_INTERVAL_SECONDS: {raw}"))?,
                Err(_) => DEFAULT_INTERVAL_SECS,
            },
        };

        let log_dir = log_dir_cli
            .or_else(|| std::env::var("LOG_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));

        let agent_name = std::env::var("AGENT_NAME").unwrap_or_else(|_| DEFAULT_AGENT_NAME.to_string());

        Ok(Self {
            check_interval: Duration::from_secs(interval_secs.max(1)),
            log_dir,
            agent_name,
        })
    }

    pub fn activity_log_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}_activity.jsonl", self.agent_name))
    }
}

/// Per-user protection settings submitted at registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectionThresholds {
    pub warn: f64,
    pub critical: f64,
    /// Health factor the agent should keep the position above.
    pub min_health_factor: f64,
    /// Health factor a rebalance brings the position back to.
    pub target_health_factor: f64,
}

impl Default for ProtectionThresholds {
    fn default() -> Self {
        Self {
            warn: WARNING_THRESHOLD,
            critical: CRITICAL_THRESHOLD,
            min_health_factor: WARNING_THRESHOLD,
            target_health_factor: DEFAULT_TARGET_HEALTH,
        }
    }
}

impl ProtectionThresholds {
    pub fn validate(&self) -> Result<(), HealthError> {
        for v in [self.warn, self.critical, self.min_health_factor, self.target_health_factor] {
            if !v.is_finite() {
                return Err(HealthError::NonFiniteValue(v));
            }
        }
        if self.warn <= self.critical {
            return Err(HealthError::InvalidThresholds {
                warn: self.warn,
                critical: self.critical,
            });
        }
        if self.min_health_factor < MIN_PROTECTED_HEALTH {
            return Err(HealthError::MinHealthFactorTooLow(self.min_health_factor));
        }
        if self.min_health_factor > MAX_PROTECTED_HEALTH {
            return Err(HealthError::MinHealthFactorTooHigh(self.min_health_factor));
        }
        if self.target_health_factor <= self.min_health_factor {
            return Err(HealthError::TargetNotAboveMin {
                min: self.min_health_factor,
                target: self.target_health_factor,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn thresholds(warn: f64, critical: f64, min: f64) -> ProtectionThresholds {
        ProtectionThresholds {
            warn,
            critical,
            min_health_factor: min,
            target_health_factor: 3.5,
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ProtectionThresholds::default().validate(), Ok(()));
    }

    #[test]
    fn warn_must_exceed_critical() {
        assert_eq!(
            thresholds(1.2, 1.5, 1.5).validate(),
            Err(HealthError::InvalidThresholds { warn: 1.2, critical: 1.5 })
        );
        assert!(thresholds(1.5, 1.5, 1.5).validate().is_err());
    }

    #[test]
    fn min_health_bounds() {
        assert_eq!(
            thresholds(1.5, 1.2, 1.0).validate(),
            Err(HealthError::MinHealthFactorTooLow(1.0))
        );
        assert_eq!(
            thresholds(1.5, 1.2, 4.0).validate(),
            Err(HealthError::MinHealthFactorTooHigh(4.0))
        );
        assert_eq!(thresholds(1.5, 1.2, 1.2).validate(), Ok(()));
        assert_eq!(thresholds(1.5, 1.2, 3.0).validate(), Ok(()));
        assert_eq!(thresholds(1.5, 1.2, 2.0).validate(), Ok(()));
    }

    #[test]
    fn target_must_exceed_min() {
        let t = ProtectionThresholds {
            min_health_factor: 2.0,
            target_health_factor: 1.5,
            ..Default::default()
        };
        assert_eq!(
            t.validate(),
            Err(HealthError::TargetNotAboveMin { min: 2.0, target: 1.5 })
        );
        let equal = ProtectionThresholds { target_health_factor: 2.0, ..t };
        assert!(equal.validate().is_err());
        let ok = ProtectionThresholds { target_health_factor: 2.5, ..t };
        assert_eq!(ok.validate(), Ok(()));
    }

    #[test]
    fn nan_threshold_rejected() {
        assert!(matches!(
            thresholds(f64::NAN, 1.2, 1.5).validate(),
            Err(HealthError::NonFiniteValue(_))
        ));
    }

    #[test]
    fn cli_overrides_win() {
        let cfg = Config::from_env(Some(5), Some(PathBuf::from("/tmp/x"))).unwrap();
        assert_eq!(cfg.check_interval, Duration::from_secs(5));
        assert_eq!(cfg.log_dir, PathBuf::from("/tmp/x"));
        assert!(cfg
            .activity_log_path()
            .to_string_lossy()
            .ends_with("_activity.jsonl"));
    }
}
