use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use tracing::{error, info, warn};

mod activity;
mod aggregate;
mod config;
mod error;
mod feed;
mod fixed;
mod health;
mod position;
mod present;
mod rebalance;

use crate::activity::{
    ActivityLog, NewActivity, ACTION_LIQUIDATION_PREVENTED, ACTION_POSITION_SCANNED,
    ACTION_REBALANCE_EXECUTED, ACTION_RISK_ALERT,
};
use crate::aggregate::{aggregate, AgentStats, PortfolioSummary};
use crate::config::{Config, ProtectionThresholds};
use crate::feed::{load_positions, PositionFeed};
use crate::health::RiskLevel;
use crate::position::Position;
use crate::present::present;
use crate::rebalance::plan;

/// Lending position health monitor.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the activity log
    #[arg(long, env = "LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a single health factor
    Classify {
        #[arg(allow_negative_numbers = true)]
        health_factor: f64,
    },

    /// Summarise a JSON snapshot of positions
    Report {
        /// JSON array of positions
        #[arg(long, value_name = "FILE")]
        positions: PathBuf,

        /// Emit machine-readable JSON instead of a table
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },

    /// Poll positions and log risk changes
    Watch {
        /// JSON array of positions, re-read each tick (demo portfolio if omitted)
        #[arg(long, env = "POSITIONS_FILE", value_name = "FILE")]
        positions: Option<PathBuf>,

        /// Seconds between ticks
        #[arg(long, env = "CHECK_INTERVAL_SECONDS")]
        interval: Option<u64>,

        /// Seed for the demo price walk
        #[arg(long)]
        seed: Option<u64>,

        /// Run one iteration then exit
        #[arg(long, action = ArgAction::SetTrue)]
        once: bool,
    },

    /// Append an externally executed agent action to the activity log
    Record {
        #[arg(long)]
        action: String,

        #[arg(long)]
        details: String,

        /// Transaction signature of the action, if any
        #[arg(long)]
        tx: Option<String>,

        /// Health factor at the time of the action
        #[arg(long)]
        health_factor: Option<f64>,
    },

    /// Verify the activity log hash chain
    VerifyLog,

    /// Validate protection thresholds and print their on-chain encodings
    Register {
        #[arg(long, default_value_t = 1.5)]
        warn: f64,

        #[arg(long, default_value_t = 1.2)]
        critical: f64,

        #[arg(long, default_value_t = 1.5)]
        min_health_factor: f64,

        /// Health factor a rebalance restores
        #[arg(long, default_value_t = 2.0)]
        target_health_factor: f64,
    },

    /// Convert between float and on-chain health factor encodings
    #[command(group(ArgGroup::new("input").required(true).args(["wad", "bps", "value"])))]
    Convert {
        /// 18-decimal fixed-point value
        #[arg(long)]
        wad: Option<u128>,

        /// Basis points (10000 = 1.0)
        #[arg(long)]
        bps: Option<u64>,

        /// Plain float health factor
        #[arg(long)]
        value: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Classify { health_factor } => {
            let view = present(health_factor);
            println!("health factor : {health_factor:.4}");
            println!("risk level    : {}", view.risk);
            println!("color         : {} ({})", view.color.text, view.color.stroke);
            println!("gauge angle   : {:.1}°", view.gauge_angle);
            println!("bar fill      : {:.1}%", view.bar_percent);
        }
        Command::Report { positions, json } => {
            let snapshot = load_positions(&positions)?;
            report(&snapshot, json)?;
        }
        Command::Watch { positions, interval, seed, once } => {
            let cfg = Config::from_env(interval, cli.log_dir)?;
            let feed = match positions {
                Some(path) => PositionFeed::File(path),
                None => PositionFeed::demo(seed),
            };
            watch(&cfg, feed, once).await?;
        }
        Command::Record { action, details, tx, health_factor } => {
            let cfg = Config::from_env(None, cli.log_dir)?;
            let mut log = ActivityLog::open(cfg.activity_log_path())?;
            let mut activity = NewActivity::new(action, details);
            if let Some(sig) = tx {
                activity = activity.tx_signature(sig);
            }
            if let Some(hf) = health_factor {
                activity = activity.health_factor(hf);
            }
            let entry = log.append(activity)?;
            info!(sequence = entry.sequence, hash = %entry.entry_hash, "Recorded activity");
        }
        Command::VerifyLog => {
            let cfg = Config::from_env(None, cli.log_dir)?;
            verify_log(&cfg)?;
        }
        Command::Register { warn, critical, min_health_factor, target_health_factor } => {
            let thresholds = ProtectionThresholds {
                warn,
                critical,
                min_health_factor,
                target_health_factor,
            };
            thresholds.validate()?;
            println!("warn threshold       : {} bps", fixed::f64_to_bps(warn)?);
            println!("critical threshold   : {} bps", fixed::f64_to_bps(critical)?);
            println!("min health factor    : {} wad", fixed::f64_to_wad(min_health_factor)?);
            println!("target health factor : {} wad", fixed::f64_to_wad(target_health_factor)?);
        }
        Command::Convert { wad, bps, value } => {
            if let Some(wad) = wad {
                println!("{}", fixed::wad_to_f64(wad)?);
            } else if let Some(bps) = bps {
                println!("{}", fixed::bps_to_f64(bps));
            } else if let Some(value) = value {
                println!("wad: {}", fixed::f64_to_wad(value)?);
                println!("bps: {}", fixed::f64_to_bps(value)?);
            }
        }
    }

    Ok(())
}

fn report(snapshot: &[Position], json: bool) -> Result<()> {
    let summary = aggregate(snapshot);

    if json {
        let rows: Vec<_> = snapshot
            .iter()
            .map(|p| {
                serde_json::json!({
                    "id": p.id,
                    "protocol": p.protocol,
                    "health_factor": p.health_factor,
                    "net_value_usd": p.net_value_usd(),
                    "presentation": present(p.health_factor),
                    "plan": plan(p),
                })
            })
            .collect();
        let out = serde_json::json!({ "summary": summary, "positions": rows });
        println!("{}", serde_json::to_string_pretty(&out).context("Failed to encode report")?);
        return Ok(());
    }

    print_summary(&summary);
    println!();
    println!(
        "{:<8} {:<12} {:>8} {:>8} {:<10} {:>12} {:>12} {:>6}  {}",
        "id", "protocol", "hf", "est.hf", "risk", "collateral", "debt", "ltv", "action"
    );
    for p in snapshot {
        let plan = plan(p);
        println!(
            "{:<8} {:<12} {:>8.4} {:>8.4} {:<10} {:>12.2} {:>12.2} {:>5.1}%  {:?} ${:.2} [{} -> {}]",
            p.id,
            p.protocol,
            p.health_factor,
            p.computed_health_factor(),
            p.risk_level(),
            p.total_collateral_usd,
            p.total_debt_usd,
            p.ltv_ratio() * 100.0,
            plan.strategy,
            plan.amount_usd,
            p.collateral_symbols().join(","),
            p.debt_symbols().join(","),
        );
    }
    Ok(())
}

fn print_summary(summary: &PortfolioSummary) {
    println!("positions        : {}", summary.total_positions);
    println!("avg health factor: {:.4}", summary.avg_health_factor);
    println!("at risk          : {}", summary.at_risk_count);
    println!("value protected  : ${:.2}", summary.total_value_protected);
    println!("net value        : ${:.2}", summary.total_net_value_usd);
    for level in RiskLevel::ALL {
        println!("  {:<10} {}", level, summary.breakdown.get(level));
    }
}

async fn watch(cfg: &Config, mut feed: PositionFeed, once: bool) -> Result<()> {
    let mut log = ActivityLog::open(cfg.activity_log_path())?;
    info!(
        interval_secs = cfg.check_interval.as_secs(),
        log = %log.path().display(),
        "Starting position monitor"
    );

    // Last seen tier per position; alerts fire on transitions only.
    let mut last_levels: HashMap<String, RiskLevel> = HashMap::new();

    loop {
        tick(&mut feed, &mut last_levels, &mut log)?;

        if once {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(cfg.check_interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// One polling step. A feed that cannot be read is logged and skipped so the
/// loop survives a half-written positions file.
fn tick(
    feed: &mut PositionFeed,
    last_levels: &mut HashMap<String, RiskLevel>,
    log: &mut ActivityLog,
) -> Result<usize> {
    match feed.next_snapshot() {
        Ok(snapshot) => scan(&snapshot, last_levels, log),
        Err(e) => {
            warn!(error = %e, "Failed to refresh positions");
            Ok(0)
        }
    }
}

/// Record a scan of `snapshot` and raise an alert for every position that
/// moved into a tier needing action since the previous scan. Returns the
/// number of alerts written.
fn scan(
    snapshot: &[Position],
    last_levels: &mut HashMap<String, RiskLevel>,
    log: &mut ActivityLog,
) -> Result<usize> {
    let stats = AgentStats::from_snapshot(snapshot, &log.summary());
    let summary = &stats.portfolio;
    info!(
        positions = summary.total_positions,
        avg_hf = summary.avg_health_factor,
        at_risk = summary.at_risk_count,
        value_protected = summary.total_value_protected,
        rebalances = stats.rebalances_executed,
        prevented = stats.liquidations_prevented,
        "Scanned positions"
    );
    log.append(NewActivity::new(
        ACTION_POSITION_SCANNED,
        format!(
            "{} positions, {} healthy, {} warning, {} critical, {} emergency",
            summary.total_positions,
            summary.breakdown.healthy,
            summary.breakdown.warning,
            summary.breakdown.critical,
            summary.breakdown.emergency,
        ),
    ))?;

    let mut alerts = 0;
    let mut next_levels = HashMap::with_capacity(snapshot.len());
    for p in snapshot {
        let level = p.risk_level();
        let changed = last_levels.get(&p.id) != Some(&level);
        let plan = plan(p);
        if changed && plan.needs_action() {
            warn!(
                position = %p.id,
                protocol = %p.protocol,
                hf = p.health_factor,
                risk = %level,
                strategy = ?plan.strategy,
                amount_usd = plan.amount_usd,
                "Position at risk"
            );
            log.append(
                NewActivity::new(
                    ACTION_RISK_ALERT,
                    format!("{} {} health factor {:.4}: {}", p.protocol, p.obligation_key, p.health_factor, plan.reasoning),
                )
                .health_factor(p.health_factor),
            )?;
            alerts += 1;
        }
        next_levels.insert(p.id.clone(), level);
    }
    *last_levels = next_levels;
    Ok(alerts)
}

fn verify_log(cfg: &Config) -> Result<()> {
    let log = ActivityLog::open(cfg.activity_log_path())?;
    let verification = log.verify()?;
    let summary = log.summary();

    println!("log                   : {}", log.path().display());
    println!("entries               : {}", summary.total_entries);
    println!("verified              : {}", verification.entries_verified);
    println!("last hash             : {}", log.last_hash());
    println!("rebalances executed   : {}", summary.count(ACTION_REBALANCE_EXECUTED));
    println!("liquidations prevented: {}", summary.count(ACTION_LIQUIDATION_PREVENTED));
    for (action, count) in &summary.actions {
        println!("  {action:<24} {count}");
    }
    if let Some(last) = log.entries()?.last() {
        let risk = last.risk_level().map(|r| r.to_string()).unwrap_or_else(|| "-".into());
        println!("latest                : {} {} (risk {risk})", last.timestamp, last.action);
    }

    if !verification.valid {
        let reason = verification.failure.unwrap_or_default();
        error!(reason = %reason, "Activity log integrity check failed");
        bail!("activity log integrity check failed: {reason}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use crate::feed::fixture_positions;

    fn reprice(snapshot: &[Position], id: &str, hf: f64) -> Vec<Position> {
        snapshot
            .iter()
            .map(|p| if p.id == id { p.with_health(hf, Utc::now()) } else { p.clone() })
            .collect()
    }

    #[test]
    fn alerts_fire_on_tier_changes_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ActivityLog::open(dir.path().join("activity.jsonl")).unwrap();
        let mut last_levels = HashMap::new();

        // pos-1 critical, pos-3 warning
        let first = fixture_positions(Utc::now());
        assert_eq!(scan(&first, &mut last_levels, &mut log).unwrap(), 2);

        // same tiers again
        assert_eq!(scan(&first, &mut last_levels, &mut log).unwrap(), 0);

        // pos-3 warning -> critical, pos-1 critical -> healthy
        let moved = reprice(&reprice(&first, "pos-3", 1.1), "pos-1", 1.6);
        assert_eq!(scan(&moved, &mut last_levels, &mut log).unwrap(), 1);
        assert_eq!(last_levels["pos-1"], RiskLevel::Healthy);
        assert_eq!(last_levels["pos-3"], RiskLevel::Critical);

        let summary = log.summary();
        assert_eq!(summary.count(ACTION_POSITION_SCANNED), 3);
        assert_eq!(summary.count(ACTION_RISK_ALERT), 3);
        assert!(log.verify().unwrap().valid);
    }

    #[test]
    fn unreadable_feed_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ActivityLog::open(dir.path().join("activity.jsonl")).unwrap();
        let mut feed = PositionFeed::File(dir.path().join("missing.json"));
        let mut last_levels = HashMap::new();

        assert_eq!(tick(&mut feed, &mut last_levels, &mut log).unwrap(), 0);
        assert_eq!(log.summary().total_entries, 0);
    }

    #[test]
    fn classify_accepts_negative_health_factor() {
        let cli = Cli::try_parse_from(["position-health", "classify", "-0.5"]).unwrap();
        match cli.command {
            Command::Classify { health_factor } => assert_eq!(health_factor, -0.5),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn register_takes_target_health_factor() {
        let cli = Cli::try_parse_from([
            "position-health",
            "register",
            "--min-health-factor",
            "2.0",
            "--target-health-factor",
            "1.5",
        ])
        .unwrap();
        let Command::Register { warn, critical, min_health_factor, target_health_factor } = cli.command else {
            panic!("expected register");
        };
        let thresholds = ProtectionThresholds { warn, critical, min_health_factor, target_health_factor };
        assert_eq!(
            thresholds.validate(),
            Err(crate::error::HealthError::TargetNotAboveMin { min: 2.0, target: 1.5 })
        );
    }
}
