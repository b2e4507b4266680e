use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::path::Path;

use crate::config::Config;
use crate::store::state::ProcessingState;
use crate::store::stats::{RecentEmail, StatsSnapshot};
use crate::store::{LoadOutcome, load_json};

/// Recent entries included in the status summary.
const STATUS_RECENT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    /// No completed cycle recorded yet.
    Starting,
    Healthy { age: TimeDelta },
    Stale { age: TimeDelta },
    Unreadable(String),
}

impl Health {
    pub fn is_ok(&self) -> bool {
        matches!(self, Health::Starting | Health::Healthy { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Health::Starting => "starting",
            Health::Healthy { .. } => "healthy",
            Health::Stale { .. } => "stale",
            Health::Unreadable(_) => "unreadable",
        }
    }
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Health::Starting => write!(f, "HEALTHY: service starting up"),
            Health::Healthy { age } => {
                write!(f, "HEALTHY: last check {}s ago", age.num_seconds())
            }
            Health::Stale { age } => write!(f, "UNHEALTHY: last check {}s ago", age.num_seconds()),
            Health::Unreadable(reason) => write!(f, "UNHEALTHY: {reason}"),
        }
    }
}

/// Healthy while the last completed cycle is younger than `stale_after`.
pub fn evaluate(
    state: &ProcessingState,
    outcome: &LoadOutcome,
    now: DateTime<Utc>,
    stale_after: std::time::Duration,
) -> Health {
    if let LoadOutcome::Corrupt(reason) = outcome {
        return Health::Unreadable(reason.clone());
    }
    let Some(last) = state.last_check_time else {
        return Health::Starting;
    };

    let age = now - last;
    let limit = TimeDelta::from_std(stale_after).unwrap_or(TimeDelta::MAX);
    if age < limit {
        Health::Healthy { age }
    } else {
        Health::Stale { age }
    }
}

pub fn check(cfg: &Config, now: DateTime<Utc>) -> Health {
    let (state, outcome) = load_json::<ProcessingState>(&cfg.state_path());
    evaluate(&state, &outcome, now, cfg.stale_after())
}

/// Read-only summary of the persisted files.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub status: &'static str,
    pub last_check: String,
    pub total_processed: usize,
    pub by_category: std::collections::BTreeMap<String, u64>,
    pub recent_emails: Vec<RecentEmail>,
}

pub fn summary(
    state_path: &Path,
    stats_path: &Path,
    stale_after: std::time::Duration,
    now: DateTime<Utc>,
) -> StatusSummary {
    let (state, outcome) = load_json::<ProcessingState>(state_path);
    let (mut stats, _) = load_json::<StatsSnapshot>(stats_path);
    let health = evaluate(&state, &outcome, now, stale_after);

    stats.recent_emails.truncate(STATUS_RECENT);
    StatusSummary {
        status: health.label(),
        last_check: state
            .last_check_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "Never".to_string()),
        total_processed: state.processed_ids.len(),
        by_category: stats.by_category,
        recent_emails: stats.recent_emails,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, h, m, 0).unwrap()
    }

    fn state_checked_at(t: Option<DateTime<Utc>>) -> ProcessingState {
        ProcessingState {
            processed_ids: vec![],
            last_check_time: t,
        }
    }

    #[test]
    fn staleness_uses_single_threshold() {
        let limit = Duration::from_secs(15 * 60);
        let state = state_checked_at(Some(at(12, 0)));

        let h = evaluate(&state, &LoadOutcome::Loaded, at(12, 14), limit);
        assert!(matches!(h, Health::Healthy { .. }));
        assert!(h.is_ok());

        let h = evaluate(&state, &LoadOutcome::Loaded, at(12, 15), limit);
        assert_eq!(h, Health::Stale { age: TimeDelta::minutes(15) });
        assert!(!h.is_ok());
    }

    #[test]
    fn no_check_yet_is_starting() {
        let h = evaluate(
            &state_checked_at(None),
            &LoadOutcome::Missing,
            at(0, 0),
            Duration::from_secs(1),
        );
        assert_eq!(h, Health::Starting);
        assert!(h.is_ok());
    }

    #[test]
    fn corrupt_state_is_unhealthy() {
        let h = evaluate(
            &ProcessingState::default(),
            &LoadOutcome::Corrupt("eof".into()),
            at(0, 0),
            Duration::from_secs(1),
        );
        assert_eq!(h.label(), "unreadable");
        assert!(!h.is_ok());
    }

    #[test]
    fn summary_reads_both_files() {
        let temp = tempfile::tempdir().expect("temp dir");
        let state_path = temp.path().join("email_state.json");
        let stats_path = temp.path().join("email_stats.json");

        let missing = summary(&state_path, &stats_path, Duration::from_secs(900), at(12, 0));
        assert_eq!(missing.status, "starting");
        assert_eq!(missing.last_check, "Never");
        assert_eq!(missing.total_processed, 0);

        std::fs::write(
            &state_path,
            serde_json::json!({
                "processed_emails": ["a", "b", "c"],
                "last_check_time": "2026-06-01T11:58:00Z"
            })
            .to_string(),
        )
        .unwrap();
        let recent: Vec<_> = (0..12)
            .map(|i| {
                serde_json::json!({
                    "subject": format!("s{i}"),
                    "from": "x",
                    "category": "general",
                    "timestamp": i
                })
            })
            .collect();
        std::fs::write(
            &stats_path,
            serde_json::json!({"by_category": {"general": 12}, "recent_emails": recent}).to_string(),
        )
        .unwrap();

        let s = summary(&state_path, &stats_path, Duration::from_secs(900), at(12, 0));
        assert_eq!(s.status, "healthy");
        assert_eq!(s.total_processed, 3);
        assert_eq!(s.by_category["general"], 12);
        assert_eq!(s.recent_emails.len(), STATUS_RECENT);
        assert_eq!(s.recent_emails[0].subject, "s0");
    }
}
