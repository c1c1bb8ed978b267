//! Conversion boundary between `f64` health factors and the scaled integers
//! used on-chain.
//!
//! EVM contracts carry health factors as 18-decimal WAD values (`1.5e18`),
//! the Solana program uses basis points (`15_000`). Nothing outside this
//! module should scale by hand.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::error::HealthError;

pub const WAD_DECIMALS: u32 = 18;
pub const BPS_PER_UNIT: u64 = 10_000;

fn to_decimal(value: f64) -> Result<Decimal, HealthError> {
    if !value.is_finite() {
        return Err(HealthError::NonFiniteValue(value));
    }
    if value < 0.0 {
        return Err(HealthError::NegativeValue(value));
    }
    Decimal::from_f64(value).ok_or(HealthError::Overflow)
}

/// WAD health factor to float. Zero means the account has no debt and maps
/// to `+inf`, matching what lending adapters return.
pub fn wad_to_f64(wad: u128) -> Result<f64, HealthError> {
    if wad == 0 {
        return Ok(f64::INFINITY);
    }
    let exact = i128::try_from(wad)
        .ok()
        .and_then(|raw| Decimal::try_from_i128_with_scale(raw, WAD_DECIMALS).ok())
        .and_then(|d| d.to_f64());
    // Beyond Decimal's 96-bit mantissa (near-zero debt) the float path is
    // precise enough.
    Ok(exact.unwrap_or_else(|| wad as f64 / 1e18))
}

pub fn f64_to_wad(value: f64) -> Result<u128, HealthError> {
    let d = to_decimal(value)?;
    // Decimal tops out near 7.9e28, so scale in two steps to keep headroom.
    let whole = d.trunc();
    let frac = d - whole;
    let unit = 10u128.pow(WAD_DECIMALS);
    let whole = whole.to_u128().ok_or(HealthError::Overflow)?;
    let frac = (frac * Decimal::from(unit as u64))
        .round()
        .to_u128()
        .ok_or(HealthError::Overflow)?;
    whole
        .checked_mul(unit)
        .and_then(|w| w.checked_add(frac))
        .ok_or(HealthError::Overflow)
}

/// Basis-point health factor to float. The program stores zero until the
/// first health check; that is treated as "no reading yet" and maps to `+inf`.
pub fn bps_to_f64(bps: u64) -> f64 {
    if bps == 0 {
        return f64::INFINITY;
    }
    let d = Decimal::from(bps) / Decimal::from(BPS_PER_UNIT);
    // u64 / 10_000 is always representable
    d.to_f64().unwrap_or(f64::INFINITY)
}

/// Float to basis points, rounded to the nearest point.
pub fn f64_to_bps(value: f64) -> Result<u64, HealthError> {
    let d = to_decimal(value)?;
    d.checked_mul(Decimal::from(BPS_PER_UNIT))
        .ok_or(HealthError::Overflow)?
        .round()
        .to_u64()
        .ok_or(HealthError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ONE_WAD: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn wad_roundtrip_thresholds() {
        assert_eq!(wad_to_f64(ONE_WAD * 3 / 2).unwrap(), 1.5);
        assert_eq!(wad_to_f64(2 * ONE_WAD).unwrap(), 2.0);
        assert_eq!(f64_to_wad(1.5).unwrap(), ONE_WAD * 3 / 2);
        assert_eq!(f64_to_wad(1.2).unwrap(), 1_200_000_000_000_000_000);
    }

    #[test]
    fn zero_wad_is_no_debt() {
        assert_eq!(wad_to_f64(0).unwrap(), f64::INFINITY);
    }

    #[test]
    fn bps_conversions() {
        assert_eq!(f64_to_bps(1.5).unwrap(), 15_000);
        assert_eq!(f64_to_bps(1.05).unwrap(), 10_500);
        assert_eq!(bps_to_f64(12_000), 1.2);
        assert_eq!(bps_to_f64(0), f64::INFINITY);
    }

    #[test]
    fn rejects_bad_floats() {
        assert_eq!(f64_to_wad(-1.0), Err(HealthError::NegativeValue(-1.0)));
        assert!(matches!(f64_to_bps(f64::NAN), Err(HealthError::NonFiniteValue(_))));
        assert_eq!(
            f64_to_wad(f64::INFINITY),
            Err(HealthError::NonFiniteValue(f64::INFINITY))
        );
    }

    #[test]
    fn huge_wad_falls_back_to_float() {
        assert_eq!(wad_to_f64(100_000_000_000 * ONE_WAD).unwrap(), 1e11);
        let max = wad_to_f64(u128::MAX).unwrap();
        assert!(max.is_finite());
        assert!((max - u128::MAX as f64 / 1e18).abs() < 1.0);
    }
}
