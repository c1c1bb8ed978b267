use thiserror::Error;

/// Errors raised at the edges of the health core: fixed-point conversion and
/// user-supplied threshold validation.
#[derive(Debug, Error, PartialEq)]
pub enum HealthError {
    #[error("invalid thresholds: warn ({warn}) must be greater than critical ({critical})")]
    InvalidThresholds { warn: f64, critical: f64 },

    #[error("min health factor too low: {0} (minimum {min})", min = crate::config::MIN_PROTECTED_HEALTH)]
    MinHealthFactorTooLow(f64),

    #[error("min health factor too high: {0} (maximum {max})", max = crate::config::MAX_PROTECTED_HEALTH)]
    MinHealthFactorTooHigh(f64),

    #[error("target health factor ({target}) must be greater than min ({min})")]
    TargetNotAboveMin { min: f64, target: f64 },

    #[error("value is not finite: {0}")]
    NonFiniteValue(f64),

    #[error("value is negative: {0}")]
    NegativeValue(f64),

    #[error("value out of fixed-point range")]
    Overflow,
}
