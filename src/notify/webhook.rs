use anyhow::{Context, Result, anyhow};
use chrono::SecondsFormat;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::time::Duration;

use super::{Alert, NotificationSink};

const USERNAME: &str = "Mail Triage Monitor";

/// Posts alerts as Discord-style embeds to a webhook URL.
pub struct WebhookSink {
    http: Client,
    url: String,
    mention: Option<String>,
}

impl WebhookSink {
    pub fn new(url: &str, mention: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("building webhook HTTP client")?;
        Ok(Self {
            http,
            url: url.to_string(),
            mention,
        })
    }
}

pub fn build_payload(alert: &Alert, mention: Option<&str>) -> Value {
    let mut payload = json!({
        "username": USERNAME,
        "embeds": [{
            "title": alert.title,
            "description": alert.body,
            "color": alert.color,
            "timestamp": alert.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            "fields": [
                {"name": "From", "value": alert.from, "inline": false},
                {"name": "Subject", "value": alert.subject, "inline": false},
                {"name": "Category", "value": alert.category, "inline": true},
            ],
        }],
    });
    if let Some(m) = mention {
        payload["content"] = Value::String(m.to_string());
    }
    payload
}

impl NotificationSink for WebhookSink {
    fn deliver(&self, alert: &Alert) -> Result<()> {
        let payload = build_payload(alert, self.mention.as_deref());
        let resp = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .context("webhook request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body: String = resp.text().unwrap_or_default().chars().take(200).collect();
            return Err(anyhow!("webhook returned {status}: {body}"));
        }
        log::info!("Notified webhook about {} message", alert.category);
        Ok(())
    }
}
