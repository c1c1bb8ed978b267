use serde::Serialize;

use crate::activity::{ActivitySummary, ACTION_LIQUIDATION_PREVENTED, ACTION_REBALANCE_EXECUTED};
use crate::health::RiskLevel;
use crate::position::Position;

/// Number of positions in each risk tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskBreakdown {
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
    pub emergency: usize,
}

impl RiskBreakdown {
    fn record(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::Healthy => self.healthy += 1,
            RiskLevel::Warning => self.warning += 1,
            RiskLevel::Critical => self.critical += 1,
            RiskLevel::Emergency => self.emergency += 1,
        }
    }

    pub fn get(&self, level: RiskLevel) -> usize {
        match level {
            RiskLevel::Healthy => self.healthy,
            RiskLevel::Warning => self.warning,
            RiskLevel::Critical => self.critical,
            RiskLevel::Emergency => self.emergency,
        }
    }
}

/// Portfolio statistics over one position snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total_positions: usize,
    /// Mean health factor, 0 for an empty snapshot.
    pub avg_health_factor: f64,
    /// Positions whose risk level is anything but healthy.
    pub at_risk_count: usize,
    /// Sum of total collateral across positions.
    pub total_value_protected: f64,
    pub total_debt_usd: f64,
    pub total_net_value_usd: f64,
    pub breakdown: RiskBreakdown,
}

/// Single pass over the snapshot. Non-finite health factors propagate into
/// the average.
pub fn aggregate(positions: &[Position]) -> PortfolioSummary {
    let mut summary = PortfolioSummary {
        total_positions: positions.len(),
        ..Default::default()
    };

    let mut health_sum = 0.0;
    for p in positions {
        let level = p.risk_level();
        summary.breakdown.record(level);
        if level.is_at_risk() {
            summary.at_risk_count += 1;
        }
        health_sum += p.health_factor;
        summary.total_value_protected += p.total_collateral_usd;
        summary.total_debt_usd += p.total_debt_usd;
        summary.total_net_value_usd += p.net_value_usd();
    }

    if !positions.is_empty() {
        summary.avg_health_factor = health_sum / positions.len() as f64;
    }

    summary
}

/// Agent-level rollup shown next to the portfolio.
///
/// Portfolio figures are recomputed from the snapshot; the intervention
/// counters come from the activity log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStats {
    #[serde(flatten)]
    pub portfolio: PortfolioSummary,
    pub liquidations_prevented: usize,
    pub rebalances_executed: usize,
}

impl AgentStats {
    pub fn from_snapshot(positions: &[Position], activity: &ActivitySummary) -> Self {
        Self {
            portfolio: aggregate(positions),
            liquidations_prevented: activity.count(ACTION_LIQUIDATION_PREVENTED),
            rebalances_executed: activity.count(ACTION_REBALANCE_EXECUTED),
        }
    }
}
