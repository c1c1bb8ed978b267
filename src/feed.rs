use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::position::{CollateralAsset, DebtAsset, Position, Protocol};

/// Largest relative move of a collateral price in one simulated tick.
const MAX_PRICE_DRIFT: f64 = 0.03;

const DEMO_OWNER: &str = "7xK9mR2f4nQ8wZp3jL6vT9bY5cA1dE8gH0iK2mN4oP6";

/// Where each refresh tick gets its positions from.
pub enum PositionFeed {
    /// Re-read a JSON array of positions on every tick.
    File(PathBuf),
    /// Demo portfolio whose collateral prices random-walk between ticks.
    Demo { current: Vec<Position>, rng: StdRng },
}

impl PositionFeed {
    pub fn demo(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        PositionFeed::Demo {
            current: fixture_positions(Utc::now()),
            rng,
        }
    }

    /// Produce the snapshot for this tick.
    pub fn next_snapshot(&mut self) -> Result<Vec<Position>> {
        match self {
            PositionFeed::File(path) => load_positions(path),
            PositionFeed::Demo { current, rng } => {
                let next = simulate_tick(current, rng, Utc::now());
                *current = next.clone();
                Ok(next)
            }
        }
    }
}

/// Load a JSON array of positions.
pub fn load_positions(path: &Path) -> Result<Vec<Position>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read positions from {}", path.display()))?;
    let positions: Vec<Position> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse positions in {}", path.display()))?;
    Ok(positions)
}

/// Move each position's collateral price by a bounded random amount and
/// derive the new health factor from it. Returns fresh positions; the input
/// is left alone.
pub fn simulate_tick<R: Rng>(positions: &[Position], rng: &mut R, at: DateTime<Utc>) -> Vec<Position> {
    positions
        .iter()
        .map(|p| {
            let factor = 1.0 + rng.gen_range(-MAX_PRICE_DRIFT..=MAX_PRICE_DRIFT);
            let collateral: Vec<CollateralAsset> = p
                .collateral
                .iter()
                .map(|c| CollateralAsset {
                    value_usd: c.value_usd * factor,
                    ..c.clone()
                })
                .collect();
            let total_collateral_usd = p.total_collateral_usd * factor;
            // health scales linearly with collateral value
            Position {
                collateral,
                total_collateral_usd,
                ..p.with_health(p.health_factor * factor, at)
            }
        })
        .collect()
}

fn single(
    id: &str,
    protocol: Protocol,
    obligation_key: &str,
    health_factor: f64,
    collateral: (&str, f64, f64, f64, f64),
    debt: (&str, f64, f64),
    at: DateTime<Utc>,
) -> Position {
    let (c_symbol, c_amount, c_value, ltv, liquidation_threshold) = collateral;
    let (d_symbol, d_amount, borrow_apy) = debt;
    Position {
        id: id.to_string(),
        protocol,
        owner: DEMO_OWNER.to_string(),
        obligation_key: obligation_key.to_string(),
        health_factor,
        collateral: vec![CollateralAsset {
            symbol: c_symbol.to_string(),
            amount: c_amount,
            value_usd: c_value,
            ltv,
            liquidation_threshold,
        }],
        debt: vec![DebtAsset {
            symbol: d_symbol.to_string(),
            amount: d_amount,
            value_usd: d_amount,
            borrow_apy,
        }],
        total_collateral_usd: c_value,
        total_debt_usd: d_amount,
        last_update: at,
    }
}

/// Demo portfolio: one critical, one warning and two healthy positions.
pub fn fixture_positions(at: DateTime<Utc>) -> Vec<Position> {
    vec![
        single("pos-1", Protocol::Kamino, "KAM-OBL-001", 1.15, ("SOL", 50.0, 5_000.0, 0.76, 0.85), ("USDC", 3_800.0, 0.058), at),
        single("pos-2", Protocol::Kamino, "KAM-OBL-002", 2.1, ("mSOL", 30.0, 3_150.0, 0.38, 0.8), ("USDC", 1_200.0, 0.042), at),
        single("pos-3", Protocol::Marginfi, "MFI-ACC-001", 1.32, ("SOL", 100.0, 10_000.0, 0.65, 0.8), ("USDT", 6_500.0, 0.072), at),
        single("pos-4", Protocol::Solend, "SLD-OBL-001", 2.35, ("JitoSOL", 20.0, 2_200.0, 0.36, 0.75), ("USDC", 800.0, 0.035), at),
    ]
}
