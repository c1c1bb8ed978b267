use std::fmt;

use serde::{Deserialize, Serialize};

use crate::position::{CollateralAsset, DebtAsset};

/// Below this a position needs an immediate unwind.
pub const EMERGENCY_THRESHOLD: f64 = 1.05;
pub const CRITICAL_THRESHOLD: f64 = 1.20;
pub const WARNING_THRESHOLD: f64 = 1.50;

/// Liquidation risk tier derived from a health factor.
///
/// Never stored on its own; always recompute it with [`classify`] from the
/// health factor it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Healthy,
    Warning,
    Critical,
    Emergency,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Healthy,
        RiskLevel::Warning,
        RiskLevel::Critical,
        RiskLevel::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Healthy => "healthy",
            RiskLevel::Warning => "warning",
            RiskLevel::Critical => "critical",
            RiskLevel::Emergency => "emergency",
        }
    }

    /// Anything other than `Healthy` counts toward the at-risk total.
    pub fn is_at_risk(&self) -> bool {
        !matches!(self, RiskLevel::Healthy)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Classify a health factor into a risk tier.
///
/// Comparisons are strict, so a value sitting exactly on a threshold lands in
/// the healthier band. NaN is unreadable health and classifies as
/// `Emergency`.
pub fn classify(health_factor: f64) -> RiskLevel {
    if health_factor.is_nan() || health_factor < EMERGENCY_THRESHOLD {
        RiskLevel::Emergency
    } else if health_factor < CRITICAL_THRESHOLD {
        RiskLevel::Critical
    } else if health_factor < WARNING_THRESHOLD {
        RiskLevel::Warning
    } else {
        RiskLevel::Healthy
    }
}

/// Estimate health factor from asset breakdowns.
/// Returns `+inf` when there is no debt.
pub fn estimate_health(collateral: &[CollateralAsset], debt: &[DebtAsset]) -> f64 {
    let total_debt = debt.iter().map(|d| d.value_usd).sum::<f64>();
    let weighted_collateral = collateral
        .iter()
        .map(|c| c.value_usd * c.liquidation_threshold)
        .sum::<f64>();

    if total_debt == 0.0 {
        return f64::INFINITY;
    }

    weighted_collateral / total_debt
}
