#![allow(dead_code)]

use anyhow::{Result, anyhow};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use mail_triage::domain::email::{Message, MessageRef, Reply};
use mail_triage::mail::InboxGateway;
use mail_triage::notify::{Alert, NotificationSink};
use mail_triage::store::state::StateStore;
use mail_triage::store::stats::StatsStore;

pub fn msg(id: &str, subject: &str, snippet: &str, sender: &str) -> Message {
    Message {
        id: id.to_string(),
        thread_id: format!("thread-{id}"),
        subject: subject.to_string(),
        sender: sender.to_string(),
        snippet: snippet.to_string(),
        received_at_epoch_seconds: 1_700_000_000,
    }
}

pub fn stores(dir: &Path) -> (StateStore, StatsStore) {
    let (state, _) = StateStore::load(dir.join("email_state.json"));
    let (stats, _) = StatsStore::load(dir.join("email_stats.json"));
    (state, stats)
}

/// In-memory mailbox. Marking a message read drops it from the unseen listing.
#[derive(Default)]
pub struct FakeGateway {
    pub unseen: Mutex<Vec<Message>>,
    pub fetched: Mutex<Vec<String>>,
    pub replies: Mutex<Vec<Reply>>,
    pub marked_read: Mutex<Vec<String>>,
    pub list_calls: AtomicUsize,
    pub fail_auth: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_reply: AtomicBool,
    pub fail_mark_read: AtomicBool,
    pub fail_fetch: Mutex<HashSet<String>>,
}

impl FakeGateway {
    pub fn with_unseen(messages: Vec<Message>) -> Self {
        Self {
            unseen: Mutex::new(messages),
            ..Default::default()
        }
    }

    pub fn deliver(&self, m: Message) {
        self.unseen.lock().unwrap().insert(0, m);
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn marked_read(&self) -> Vec<String> {
        self.marked_read.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.replies.lock().unwrap().clone()
    }
}

impl InboxGateway for FakeGateway {
    fn authenticate(&self) -> Result<()> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(anyhow!("invalid_grant"));
        }
        Ok(())
    }

    fn list_unseen(&self, max: u32) -> Result<Vec<MessageRef>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(anyhow!("503 backend error"));
        }
        Ok(self
            .unseen
            .lock()
            .unwrap()
            .iter()
            .take(max as usize)
            .map(|m| MessageRef { id: m.id.clone() })
            .collect())
    }

    fn fetch(&self, id: &str) -> Result<Message> {
        self.fetched.lock().unwrap().push(id.to_string());
        if self.fail_fetch.lock().unwrap().contains(id) {
            return Err(anyhow!("timed out fetching {id}"));
        }
        self.unseen
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| anyhow!("no message {id}"))
    }

    fn send_reply(&self, reply: &Reply) -> Result<()> {
        if self.fail_reply.load(Ordering::SeqCst) {
            return Err(anyhow!("send rejected"));
        }
        self.replies.lock().unwrap().push(reply.clone());
        Ok(())
    }

    fn mark_read(&self, id: &str) -> Result<()> {
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(anyhow!("modify rejected"));
        }
        self.marked_read.lock().unwrap().push(id.to_string());
        self.unseen.lock().unwrap().retain(|m| m.id != id);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub alerts: Mutex<Vec<Alert>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, alert: &Alert) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("webhook 500"));
        }
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}
