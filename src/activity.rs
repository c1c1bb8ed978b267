//! Append-only agent activity log.
//!
//! Every entry carries the SHA-256 of its own contents plus the hash of the
//! entry before it, so editing or dropping a line breaks the chain. Entries
//! are persisted one JSON object per line.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

use crate::health::{classify, RiskLevel};

pub const GENESIS_HASH: &str = "genesis";

pub const ACTION_POSITION_SCANNED: &str = "Position Scanned";
pub const ACTION_RISK_ALERT: &str = "Risk Alert";
pub const ACTION_REBALANCE_EXECUTED: &str = "Rebalance Executed";
pub const ACTION_LIQUIDATION_PREVENTED: &str = "Liquidation Prevented";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub details: String,
    #[serde(default)]
    pub tx_signature: Option<String>,
    /// Health factor at the time of the event. Risk level is derived from it
    /// on read.
    #[serde(default)]
    pub health_factor: Option<f64>,
    pub previous_hash: String,
    pub entry_hash: String,
}

#[derive(Serialize)]
struct HashInput<'a> {
    sequence: u64,
    timestamp: &'a DateTime<Utc>,
    action: &'a str,
    details: &'a str,
    tx_signature: Option<&'a str>,
    health_factor: Option<f64>,
    previous_hash: &'a str,
}

impl ActivityEntry {
    pub fn compute_hash(&self) -> String {
        let input = HashInput {
            sequence: self.sequence,
            timestamp: &self.timestamp,
            action: &self.action,
            details: &self.details,
            tx_signature: self.tx_signature.as_deref(),
            health_factor: self.health_factor,
            previous_hash: &self.previous_hash,
        };
        // Serializing a struct of plain fields cannot fail.
        let bytes = serde_json::to_vec(&input).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    pub fn risk_level(&self) -> Option<RiskLevel> {
        self.health_factor.map(classify)
    }
}

/// An event to be appended; the log fills in sequence and hashes.
#[derive(Debug, Clone, Default)]
pub struct NewActivity {
    pub action: String,
    pub details: String,
    pub tx_signature: Option<String>,
    pub health_factor: Option<f64>,
}

impl NewActivity {
    pub fn new(action: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            details: details.into(),
            ..Default::default()
        }
    }

    pub fn health_factor(mut self, hf: f64) -> Self {
        self.health_factor = Some(hf);
        self
    }

    pub fn tx_signature(mut self, sig: impl Into<String>) -> Self {
        self.tx_signature = Some(sig.into());
        self
    }
}

/// Outcome of walking the chain from the start of the file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verification {
    pub valid: bool,
    pub entries_verified: usize,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySummary {
    pub total_entries: u64,
    pub actions: BTreeMap<String, usize>,
    pub last_hash: String,
}

impl ActivitySummary {
    pub fn count(&self, action: &str) -> usize {
        self.actions.get(action).copied().unwrap_or(0)
    }
}

pub struct ActivityLog {
    path: PathBuf,
    next_sequence: u64,
    last_hash: String,
    actions: BTreeMap<String, usize>,
    /// Set when the file ends in a partial line left by an interrupted write.
    needs_newline: bool,
}

impl ActivityLog {
    /// Open (or create) the log at `path`, continuing any existing chain.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        }

        let mut log = Self {
            needs_newline: missing_trailing_newline(&path)?,
            path,
            next_sequence: 0,
            last_hash: GENESIS_HASH.to_string(),
            actions: BTreeMap::new(),
        };
        for (line_no, entry) in read_lines(&log.path)? {
            let Some(entry) = entry else {
                warn!(line = line_no, log = %log.path.display(), "Skipping malformed activity entry");
                continue;
            };
            log.next_sequence = entry.sequence + 1;
            log.last_hash = entry.entry_hash;
            *log.actions.entry(entry.action).or_insert(0) += 1;
        }
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> &str {
        &self.last_hash
    }

    pub fn append(&mut self, activity: NewActivity) -> Result<ActivityEntry> {
        let mut entry = ActivityEntry {
            sequence: self.next_sequence,
            timestamp: Utc::now(),
            action: activity.action,
            details: activity.details,
            tx_signature: activity.tx_signature,
            // JSON has no representation for NaN or infinities
            health_factor: activity.health_factor.filter(|hf| hf.is_finite()),
            previous_hash: self.last_hash.clone(),
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash();

        let mut line = if self.needs_newline { String::from("\n") } else { String::new() };
        line.push_str(&serde_json::to_string(&entry).context("Failed to encode activity entry")?);
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open activity log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;

        self.needs_newline = false;
        self.last_hash = entry.entry_hash.clone();
        self.next_sequence += 1;
        *self.actions.entry(entry.action.clone()).or_insert(0) += 1;

        debug!(
            action = %entry.action,
            sequence = entry.sequence,
            hash = &entry.entry_hash[..16],
            "Activity logged"
        );

        Ok(entry)
    }

    /// Entries that parse; malformed lines are left out.
    pub fn entries(&self) -> Result<Vec<ActivityEntry>> {
        Ok(read_lines(&self.path)?.into_iter().filter_map(|(_, e)| e).collect())
    }

    pub fn verify(&self) -> Result<Verification> {
        verify_file(&self.path)
    }

    /// Counts are kept in memory from `open` onward, so this does not touch
    /// the file.
    pub fn summary(&self) -> ActivitySummary {
        ActivitySummary {
            total_entries: self.next_sequence,
            actions: self.actions.clone(),
            last_hash: self.last_hash.clone(),
        }
    }
}

/// Every non-blank line with its 1-based number; `None` where the line does
/// not parse.
fn read_lines(path: &Path) -> Result<Vec<(usize, Option<ActivityEntry>)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut lines = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        lines.push((idx + 1, serde_json::from_str(&line).ok()));
    }
    Ok(lines)
}

fn missing_trailing_newline(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    if len == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))
        .and_then(|_| file.read_exact(&mut last))
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(last[0] != b'\n')
}

/// Walk the log from the start, checking each link and each entry hash.
pub fn verify_file(path: &Path) -> Result<Verification> {
    let mut previous_hash = GENESIS_HASH.to_string();
    let mut count = 0;

    for (line_no, entry) in read_lines(path)? {
        let Some(entry) = entry else {
            error!(line = line_no, "Malformed activity entry");
            return Ok(Verification {
                valid: false,
                entries_verified: count,
                failure: Some(format!("entry at line {line_no} is malformed")),
            });
        };
        if entry.previous_hash != previous_hash {
            error!(
                sequence = entry.sequence,
                expected = %previous_hash,
                got = %entry.previous_hash,
                "Activity chain broken"
            );
            return Ok(Verification {
                valid: false,
                entries_verified: count,
                failure: Some(format!("entry {} does not link to its predecessor", entry.sequence)),
            });
        }

        let computed = entry.compute_hash();
        if computed != entry.entry_hash {
            error!(
                sequence = entry.sequence,
                expected = %entry.entry_hash,
                computed = %computed,
                "Activity hash mismatch"
            );
            return Ok(Verification {
                valid: false,
                entries_verified: count,
                failure: Some(format!("entry {} hash mismatch", entry.sequence)),
            });
        }

        previous_hash = entry.entry_hash;
        count += 1;
    }

    Ok(Verification {
        valid: true,
        entries_verified: count,
        failure: None,
    })
}
