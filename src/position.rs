use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::{classify, estimate_health, RiskLevel};

/// Lending protocols we know how to monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    Kamino,
    Marginfi,
    Solend,
    AaveV3,
    CompoundV3,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Kamino => "kamino",
            Protocol::Marginfi => "marginfi",
            Protocol::Solend => "solend",
            Protocol::AaveV3 => "aave-v3",
            Protocol::CompoundV3 => "compound-v3",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralAsset {
    pub symbol: String,
    pub amount: f64,
    pub value_usd: f64,
    /// Loan-to-value ratio
    pub ltv: f64,
    pub liquidation_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtAsset {
    pub symbol: String,
    pub amount: f64,
    pub value_usd: f64,
    pub borrow_apy: f64,
}

/// One monitored lending obligation as seen on a single refresh.
///
/// Positions are snapshot values: a refresh produces new `Position`s rather
/// than updating existing ones. Risk level and net value are derived on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub protocol: Protocol,
    pub owner: String,
    pub obligation_key: String,
    /// Supplied health factor; see [`Position::computed_health_factor`] for the
    /// value implied by the asset lists.
    pub health_factor: f64,
    #[serde(default)]
    pub collateral: Vec<CollateralAsset>,
    #[serde(default)]
    pub debt: Vec<DebtAsset>,
    pub total_collateral_usd: f64,
    pub total_debt_usd: f64,
    pub last_update: DateTime<Utc>,
}

impl Position {
    pub fn risk_level(&self) -> RiskLevel {
        classify(self.health_factor)
    }

    pub fn net_value_usd(&self) -> f64 {
        self.total_collateral_usd - self.total_debt_usd
    }

    /// Debt over collateral, 0 when there is no collateral.
    pub fn ltv_ratio(&self) -> f64 {
        if self.total_collateral_usd == 0.0 {
            return 0.0;
        }
        self.total_debt_usd / self.total_collateral_usd
    }

    pub fn computed_health_factor(&self) -> f64 {
        estimate_health(&self.collateral, &self.debt)
    }

    /// Copy of this position with a new health factor and refresh time.
    pub fn with_health(&self, health_factor: f64, at: DateTime<Utc>) -> Self {
        Self {
            health_factor,
            last_update: at,
            ..self.clone()
        }
    }

    pub fn collateral_symbols(&self) -> Vec<&str> {
        self.collateral.iter().map(|c| c.symbol.as_str()).collect()
    }

    pub fn debt_symbols(&self) -> Vec<&str> {
        self.debt.iter().map(|d| d.symbol.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Position {
        Position {
            id: "pos-1".into(),
            protocol: Protocol::Kamino,
            owner: "owner".into(),
            obligation_key: "KAM-OBL-001".into(),
            health_factor: 1.15,
            collateral: vec![CollateralAsset {
                symbol: "SOL".into(),
                amount: 50.0,
                value_usd: 5_000.0,
                ltv: 0.76,
                liquidation_threshold: 0.85,
            }],
            debt: vec![DebtAsset {
                symbol: "USDC".into(),
                amount: 3_800.0,
                value_usd: 3_800.0,
                borrow_apy: 0.058,
            }],
            total_collateral_usd: 5_000.0,
            total_debt_usd: 3_800.0,
            last_update: Utc::now(),
        }
    }

    #[test]
    fn derived_values() {
        let p = sample();
        assert_eq!(p.risk_level(), RiskLevel::Critical);
        assert_eq!(p.net_value_usd(), 1_200.0);
        assert_eq!(p.ltv_ratio(), 0.76);
        assert_eq!(p.collateral_symbols(), vec!["SOL"]);
        assert_eq!(p.debt_symbols(), vec!["USDC"]);
        assert!((p.computed_health_factor() - 4_250.0 / 3_800.0).abs() < 1e-12);
    }

    #[test]
    fn risk_follows_health_factor() {
        let p = sample();
        let recovered = p.with_health(1.6, Utc::now());
        assert_eq!(recovered.risk_level(), RiskLevel::Healthy);
        assert_eq!(p.risk_level(), RiskLevel::Critical);
        assert_eq!(recovered.id, p.id);
    }

    #[test]
    fn zero_collateral_ltv() {
        let mut p = sample();
        p.total_collateral_usd = 0.0;
        assert_eq!(p.ltv_ratio(), 0.0);
    }

    #[test]
    fn protocol_wire_names() {
        let json = serde_json::to_string(&Protocol::AaveV3).unwrap();
        assert_eq!(json, "\"aave-v3\"");
        assert_eq!(Protocol::CompoundV3.to_string(), "compound-v3");
    }

    #[test]
    fn deserializes_without_asset_lists() {
        let json = r#"{
            "id": "pos-9",
            "protocol": "solend",
            "owner": "o",
            "obligation_key": "SLD-OBL-009",
            "health_factor": 2.35,
            "total_collateral_usd": 2200.0,
            "total_debt_usd": 800.0,
            "last_update": "2024-01-01T00:00:00Z"
        }"#;
        let p: Position = serde_json::from_str(json).unwrap();
        assert!(p.collateral.is_empty());
        assert_eq!(p.net_value_usd(), 1_400.0);
    }
}
