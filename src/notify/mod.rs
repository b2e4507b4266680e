pub mod desktop;
pub mod webhook;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::domain::email::Message;
use crate::mail::decoders::truncate_snippet;

/// Alert bodies are cut to this many characters.
pub const ALERT_BODY_MAX_CHARS: usize = 200;

/// Structured alert about a newly classified message.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub title: String,
    pub body: String,
    pub color: u32,
    pub from: String,
    pub subject: String,
    pub category: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn for_message(msg: &Message, category: &str, color: u32) -> Self {
        Self {
            title: format!("New {} message", category.to_uppercase()),
            body: truncate_snippet(&msg.snippet, ALERT_BODY_MAX_CHARS),
            color,
            from: msg.sender.clone(),
            subject: msg.subject.clone(),
            category: category.to_uppercase(),
            timestamp: DateTime::from_timestamp(msg.received_at_epoch_seconds, 0)
                .unwrap_or_default(),
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn deliver(&self, alert: &Alert) -> Result<()>;
}

/// Used when no sink is configured.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn deliver(&self, _alert: &Alert) -> Result<()> {
        Ok(())
    }
}

/// Delivers to every sink; reports the first failure after trying them all.
pub struct MultiSink {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

impl NotificationSink for MultiSink {
    fn deliver(&self, alert: &Alert) -> Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(alert)
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

pub fn build_sink(cfg: &Config) -> Result<Box<dyn NotificationSink>> {
    let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();
    if !cfg.webhook_url.is_empty() {
        sinks.push(Box::new(webhook::WebhookSink::new(
            &cfg.webhook_url,
            cfg.webhook_mention.clone(),
            cfg.request_timeout(),
        )?));
    }
    if cfg.desktop_notify {
        sinks.push(Box::new(desktop::DesktopSink::new()));
    }

    Ok(match sinks.len() {
        0 => Box::new(NullSink),
        1 => sinks.remove(0),
        _ => Box::new(MultiSink::new(sinks)),
    })
}
