pub mod dispatcher;

use anyhow::Result;
use chrono::Utc;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use crate::daemon::dispatcher::{DispatchOutcome, Dispatcher};
use crate::domain::email::Message;
use crate::mail::InboxGateway;
use crate::notify::NotificationSink;
use crate::rules::classifier::Classifier;
use crate::store::state::StateStore;
use crate::store::stats::StatsStore;

/// Longest single sleep before the shutdown flag is looked at again.
const SLEEP_SLICE: Duration = Duration::from_secs(1);

pub struct DaemonConfig {
    pub interval: Duration,
    pub max_results: u32,
    pub reply_from: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Polling,
    Cycling,
    Sleeping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub id: String,
    pub category: String,
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub listed: usize,
    pub already_processed: usize,
    pub fetch_failures: usize,
    pub dispatched: Vec<Dispatched>,
}

/// Drives poll -> classify -> dispatch -> persist, one cycle at a time.
pub struct Scheduler<'a> {
    gateway: &'a dyn InboxGateway,
    classifier: &'a Classifier,
    dispatcher: Dispatcher<'a>,
    state: StateStore,
    stats: StatsStore,
    interval: Duration,
    max_results: u32,
    phase: Phase,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        gateway: &'a dyn InboxGateway,
        sink: &'a dyn NotificationSink,
        classifier: &'a Classifier,
        state: StateStore,
        stats: StatsStore,
        cfg: DaemonConfig,
    ) -> Self {
        Self {
            gateway,
            classifier,
            dispatcher: Dispatcher::new(classifier.rules(), gateway, sink, cfg.reply_from),
            state,
            stats,
            interval: cfg.interval,
            max_results: cfg.max_results,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn stats(&self) -> &StatsStore {
        &self.stats
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            log::debug!("{:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    /// Confirms credentials. The only failure that ends the service.
    pub fn authenticate(&mut self) -> Result<()> {
        self.enter(Phase::Idle);
        self.gateway.authenticate()?;
        log::info!("Mailbox authenticated");
        Ok(())
    }

    /// Unseen messages not yet processed, fully fetched, in listing order.
    fn poll(&mut self, report: &mut CycleReport) -> Result<Vec<Message>> {
        self.enter(Phase::Polling);
        let listed = self.gateway.list_unseen(self.max_results)?;
        report.listed = listed.len();

        let mut messages = Vec::with_capacity(listed.len());
        for item in listed {
            if self.state.is_processed(&item.id) {
                report.already_processed += 1;
                continue;
            }
            match self.gateway.fetch(&item.id) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    // left unprocessed, so the next cycle tries again
                    log::warn!("Fetching {} failed: {e:#}", item.id);
                    report.fetch_failures += 1;
                }
            }
        }
        Ok(messages)
    }

    /// One full cycle. Errors from listing propagate; per-message failures do not.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let messages = self.poll(&mut report)?;

        self.enter(Phase::Cycling);
        if messages.is_empty() {
            log::info!("No new emails");
        } else {
            log::info!("Found {} new email(s)", messages.len());
        }

        let classifier = self.classifier;
        for msg in &messages {
            let category = classifier.classify(&msg.subject, &msg.snippet, &msg.sender);
            log::info!(
                "Processing {}: '{}' from {} -> {category}",
                msg.id,
                msg.subject,
                msg.sender
            );
            let outcome = self
                .dispatcher
                .handle(msg, category, &mut self.state, &mut self.stats);
            report.dispatched.push(Dispatched {
                id: msg.id.clone(),
                category: category.to_string(),
                outcome,
            });
        }

        self.state.record_check(Utc::now());
        self.state.save();
        Ok(report)
    }

    /// Runs a cycle, logging instead of returning any failure.
    pub fn run_cycle_isolated(&mut self) -> Option<CycleReport> {
        match self.run_cycle() {
            Ok(report) => Some(report),
            Err(e) => {
                log::error!("Error in cycle: {e:#}");
                None
            }
        }
    }

    /// Authenticates, then cycles until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        self.authenticate()?;
        log::info!("Check interval: {} seconds", self.interval.as_secs());

        while running.load(Ordering::SeqCst) {
            self.run_cycle_isolated();

            self.enter(Phase::Sleeping);
            sleep_while_running(self.interval, running);
        }

        self.enter(Phase::Idle);
        log::info!("Shutting down");
        Ok(())
    }
}

/// Sleeps for `total`, or until `running` clears. An unrepresentable deadline sleeps until stopped.
fn sleep_while_running(total: Duration, running: &AtomicBool) {
    let deadline = Instant::now().checked_add(total);
    while running.load(Ordering::SeqCst) {
        let slice = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                (deadline - now).min(SLEEP_SLICE)
            }
            None => SLEEP_SLICE,
        };
        thread::sleep(slice);
    }
}
