use serde::Serialize;

use crate::health::{classify, RiskLevel};

/// Gauge starts at this health factor...
const GAUGE_OFFSET: f64 = 0.5;
/// ...and is full this far above it.
const GAUGE_SPAN: f64 = 2.5;
const GAUGE_SWEEP_DEGREES: f64 = 180.0;

/// Bars are anchored at the liquidation line of 1.0.
const BAR_OFFSET: f64 = 1.0;
const BAR_SPAN: f64 = 2.0;

/// Style tokens for a risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorToken {
    pub text: &'static str,
    pub background: &'static str,
    pub stroke: &'static str,
}

/// View-model values for one health factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Presentation {
    pub risk: RiskLevel,
    pub color: ColorToken,
    pub gauge_angle: f64,
    pub bar_percent: f64,
}

// f64::clamp passes NaN through, which is what we want here.
fn unit(value: f64, offset: f64, span: f64) -> f64 {
    ((value - offset) / span).clamp(0.0, 1.0)
}

/// Arc angle in degrees for the health gauge: 0 at 0.5, 180 at 3.0 and above.
pub fn gauge_angle(health_factor: f64) -> f64 {
    unit(health_factor, GAUGE_OFFSET, GAUGE_SPAN) * GAUGE_SWEEP_DEGREES
}

/// Fill percentage for a position's health bar: 0 at 1.0, 100 at 3.0 and above.
pub fn bar_percent(health_factor: f64) -> f64 {
    unit(health_factor, BAR_OFFSET, BAR_SPAN) * 100.0
}

pub fn color(risk: RiskLevel) -> ColorToken {
    match risk {
        RiskLevel::Healthy => ColorToken {
            text: "text-green-400",
            background: "bg-green-500/20 border-green-500/30",
            stroke: "#22c55e",
        },
        RiskLevel::Warning => ColorToken {
            text: "text-yellow-400",
            background: "bg-yellow-500/20 border-yellow-500/30",
            stroke: "#f59e0b",
        },
        RiskLevel::Critical => ColorToken {
            text: "text-red-400",
            background: "bg-red-500/20 border-red-500/30",
            stroke: "#ef4444",
        },
        RiskLevel::Emergency => ColorToken {
            text: "text-red-600",
            background: "bg-red-700/30 border-red-600/50",
            stroke: "#dc2626",
        },
    }
}

pub fn present(health_factor: f64) -> Presentation {
    let risk = classify(health_factor);
    Presentation {
        risk,
        color: color(risk),
        gauge_angle: gauge_angle(health_factor),
        bar_percent: bar_percent(health_factor),
    }
}
