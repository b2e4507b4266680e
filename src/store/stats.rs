use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{LoadOutcome, load_json, write_json_atomic};

/// Length cap of the recent activity log.
pub const MAX_RECENT_EMAILS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentEmail {
    pub subject: String,
    #[serde(rename = "from")]
    pub sender: String,
    pub category: String,
    #[serde(deserialize_with = "deserialize_epoch")]
    pub timestamp: i64,
}

// Fractional epoch seconds are accepted and truncated.
fn deserialize_epoch<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let secs = f64::deserialize(d)?;
    Ok(secs as i64)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(default)]
    pub by_category: BTreeMap<String, u64>,
    /// Most recent first.
    #[serde(default)]
    pub recent_emails: Vec<RecentEmail>,
}

/// Per-category counters and recent activity, written through on every record.
#[derive(Debug)]
pub struct StatsStore {
    path: PathBuf,
    stats: StatsSnapshot,
}

impl StatsStore {
    pub fn load(path: impl Into<PathBuf>) -> (Self, LoadOutcome) {
        let path = path.into();
        let (mut stats, outcome) = load_json::<StatsSnapshot>(&path);
        if let LoadOutcome::Corrupt(reason) = &outcome {
            log::warn!(
                "Stats file {} unreadable ({reason}); starting empty",
                path.display()
            );
        }
        stats.recent_emails.truncate(MAX_RECENT_EMAILS);
        (Self { path, stats }, outcome)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &StatsSnapshot {
        &self.stats
    }

    pub fn count(&self, category: &str) -> u64 {
        self.stats.by_category.get(category).copied().unwrap_or(0)
    }

    /// Counts the email, prepends it to the recent log and persists immediately.
    pub fn record_email(&mut self, category: &str, subject: &str, sender: &str, timestamp: i64) {
        *self
            .stats
            .by_category
            .entry(category.to_string())
            .or_insert(0) += 1;

        self.stats.recent_emails.insert(
            0,
            RecentEmail {
                subject: subject.to_string(),
                sender: sender.to_string(),
                category: category.to_string(),
                timestamp,
            },
        );
        self.stats.recent_emails.truncate(MAX_RECENT_EMAILS);

        if let Err(e) = self.try_save() {
            log::error!("Error saving stats to {}: {e:#}", self.path.display());
        }
    }

    pub fn try_save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.stats)
    }
}
