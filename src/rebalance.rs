use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::health::RiskLevel;
use crate::position::Position;

/// Assumed liquidation threshold when sizing a rebalance.
const ASSUMED_LIQUIDATION_THRESHOLD: f64 = 0.85;
/// Health factor a debt repayment restores.
const REPAY_TARGET_HEALTH: f64 = 1.5;
/// Health factor a collateral top-up restores.
const TOP_UP_TARGET_HEALTH: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    EmergencyUnwind,
    DebtRepayment,
    CollateralTopUp,
    NoAction,
}

/// Rule-based rebalance recommendation for one position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalancePlan {
    pub position_id: String,
    pub risk_level: RiskLevel,
    pub strategy: Strategy,
    pub amount_usd: f64,
    /// 0 = nothing to do, 1 = act now
    pub urgency: f64,
    pub reasoning: String,
    /// SHA-256 of `reasoning`, recorded on-chain with the rebalance.
    pub reasoning_hash: String,
}

impl RebalancePlan {
    pub fn needs_action(&self) -> bool {
        self.strategy != Strategy::NoAction
    }
}

pub fn plan(position: &Position) -> RebalancePlan {
    let hf = position.health_factor;
    let collateral = position.total_collateral_usd;
    let debt = position.total_debt_usd;
    let risk_level = position.risk_level();

    let (strategy, urgency, amount_usd, reasoning) = match risk_level {
        RiskLevel::Emergency => (
            Strategy::EmergencyUnwind,
            1.0,
            debt,
            format!("EMERGENCY: health factor {hf:.4} below 1.05, unwinding position"),
        ),
        RiskLevel::Critical => {
            let target_debt = collateral * ASSUMED_LIQUIDATION_THRESHOLD / REPAY_TARGET_HEALTH;
            let amount = (debt - target_debt).max(0.0);
            (
                Strategy::DebtRepayment,
                0.8,
                amount,
                format!("CRITICAL: health factor {hf:.4}, repaying ${amount:.2} to restore {REPAY_TARGET_HEALTH}"),
            )
        }
        RiskLevel::Warning => {
            let needed = debt * TOP_UP_TARGET_HEALTH / ASSUMED_LIQUIDATION_THRESHOLD;
            let amount = (needed - collateral).max(0.0);
            (
                Strategy::CollateralTopUp,
                0.4,
                amount,
                format!("WARNING: health factor {hf:.4}, adding ${amount:.2} collateral"),
            )
        }
        RiskLevel::Healthy => (
            Strategy::NoAction,
            0.0,
            0.0,
            format!("Healthy: health factor {hf:.4} above warning threshold"),
        ),
    };

    let reasoning_hash = hex::encode(Sha256::digest(reasoning.as_bytes()));

    RebalancePlan {
        position_id: position.id.clone(),
        risk_level,
        strategy,
        amount_usd,
        urgency,
        reasoning,
        reasoning_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fixture_positions;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn by_id(id: &str) -> Position {
        fixture_positions(Utc::now())
            .into_iter()
            .find(|p| p.id == id)
            .unwrap()
    }

    #[test]
    fn critical_repays_debt() {
        let p = by_id("pos-1");
        let plan = plan(&p);
        assert_eq!(plan.strategy, Strategy::DebtRepayment);
        assert_eq!(plan.urgency, 0.8);
        let expected = 3_800.0 - 5_000.0 * 0.85 / 1.5;
        assert!((plan.amount_usd - expected).abs() < 1e-9);
        assert!(plan.needs_action());
    }

    #[test]
    fn warning_tops_up_collateral() {
        let p = by_id("pos-3");
        let plan = plan(&p);
        assert_eq!(plan.strategy, Strategy::CollateralTopUp);
        let expected = 6_500.0 * 2.0 / 0.85 - 10_000.0;
        assert!((plan.amount_usd - expected).abs() < 1e-9);
    }

    #[test]
    fn emergency_unwinds_everything() {
        let p = by_id("pos-1").with_health(1.01, Utc::now());
        let plan = plan(&p);
        assert_eq!(plan.strategy, Strategy::EmergencyUnwind);
        assert_eq!(plan.amount_usd, 3_800.0);
        assert_eq!(plan.urgency, 1.0);
    }

    #[test]
    fn healthy_does_nothing() {
        let plan = plan(&by_id("pos-2"));
        assert_eq!(plan.strategy, Strategy::NoAction);
        assert_eq!(plan.amount_usd, 0.0);
        assert!(!plan.needs_action());
    }

    #[test]
    fn amounts_never_negative() {
        // over-collateralised but still in the critical band
        let mut p = by_id("pos-1");
        p.total_collateral_usd = 100_000.0;
        assert_eq!(plan(&p).amount_usd, 0.0);
    }

    #[test]
    fn reasoning_hash_is_sha256_hex() {
        let plan = plan(&by_id("pos-4"));
        assert_eq!(plan.reasoning_hash.len(), 64);
        assert_eq!(
            plan.reasoning_hash,
            hex::encode(Sha256::digest(plan.reasoning.as_bytes()))
        );
    }
}
