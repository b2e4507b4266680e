use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use super::{LoadOutcome, load_json, write_json_atomic};

/// Most recent processed ids retained; older ones are dropped first.
pub const MAX_PROCESSED_IDS: usize = 1000;

/// On-disk shape of the state file, also read by the health probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingState {
    #[serde(rename = "processed_emails", default)]
    pub processed_ids: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_check_time")]
    pub last_check_time: Option<DateTime<Utc>>,
}

// Older state files carry naive ISO timestamps without an offset; read them as UTC.
fn deserialize_check_time<'de, D>(d: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(d)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Ok(t) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(t.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|t| Some(t.and_utc()))
        .map_err(serde::de::Error::custom)
}

/// Processed message ids plus the time of the last completed cycle.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    ids: VecDeque<String>,
    index: HashSet<String>,
    last_check_time: Option<DateTime<Utc>>,
}

impl StateStore {
    pub fn load(path: impl Into<PathBuf>) -> (Self, LoadOutcome) {
        let path = path.into();
        let (doc, outcome) = load_json::<ProcessingState>(&path);
        match &outcome {
            LoadOutcome::Loaded => log::debug!(
                "Loaded state from {} ({} processed ids)",
                path.display(),
                doc.processed_ids.len()
            ),
            LoadOutcome::Missing => {
                log::info!("No state file at {}; starting empty", path.display())
            }
            LoadOutcome::Corrupt(reason) => log::warn!(
                "State file {} unreadable ({reason}); starting empty",
                path.display()
            ),
        }

        let mut store = Self {
            path,
            ids: VecDeque::new(),
            index: HashSet::new(),
            last_check_time: doc.last_check_time,
        };
        for id in doc.processed_ids {
            store.mark_processed(&id);
        }
        (store, outcome)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Adds `id` as the newest entry. Already-known ids keep their position.
    pub fn mark_processed(&mut self, id: &str) {
        if !self.index.insert(id.to_string()) {
            return;
        }
        self.ids.push_back(id.to_string());
        while self.ids.len() > MAX_PROCESSED_IDS {
            if let Some(oldest) = self.ids.pop_front() {
                self.index.remove(&oldest);
            }
        }
    }

    pub fn record_check(&mut self, at: DateTime<Utc>) {
        self.last_check_time = Some(at);
    }

    pub fn last_check_time(&self) -> Option<DateTime<Utc>> {
        self.last_check_time
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Oldest first.
    pub fn processed_ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn snapshot(&self) -> ProcessingState {
        ProcessingState {
            processed_ids: self.ids.iter().cloned().collect(),
            last_check_time: self.last_check_time,
        }
    }

    pub fn try_save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.snapshot())
    }

    /// Persists the state; a failure is logged and the in-memory copy stays authoritative.
    pub fn save(&self) -> bool {
        match self.try_save() {
            Ok(()) => {
                log::debug!("State saved: {} processed ids", self.ids.len());
                true
            }
            Err(e) => {
                log::error!("Error saving state to {}: {e:#}", self.path.display());
                false
            }
        }
    }
}
