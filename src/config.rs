use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::rules::{CategoryRule, RuleTable, default_rules};

const APP_DIR: &str = "mail_triage";
pub const STATE_FILE_NAME: &str = "email_state.json";
pub const STATS_FILE_NAME: &str = "email_stats.json";

/// One week.
const MAX_CHECK_INTERVAL_SECS: u64 = 7 * 24 * 3600;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;
/// Upper bound on `check_interval_secs * stale_after_intervals`: 30 days.
const MAX_STALE_AFTER_SECS: u64 = 30 * 24 * 3600;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    /// Empty disables webhook notifications.
    pub webhook_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_mention: Option<String>,
    pub desktop_notify: bool,
    pub check_interval_secs: u64,
    pub data_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_from: Option<String>,
    pub request_timeout_secs: u64,
    pub stale_after_intervals: u32,
    pub max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<CategoryRule>>,
}

impl Default for Config {
    fn default() -> Self {
        let cfg_dir = config_dir();
        Self {
            credentials_path: cfg_dir.join("credentials.json"),
            token_path: cfg_dir.join("token.json"),
            webhook_url: String::new(),
            webhook_mention: None,
            desktop_notify: false,
            check_interval_secs: 300,
            data_dir: default_data_dir(),
            reply_from: None,
            request_timeout_secs: 30,
            stale_after_intervals: 3,
            max_results: 50,
            rules: None,
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("data"))
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn parse_bool(key: &str, v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(anyhow!("{key}: expected a boolean, got '{other}'")),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, v: &str) -> Result<T> {
    v.trim()
        .parse::<T>()
        .map_err(|_| anyhow!("{key}: expected a number, got '{v}'"))
}

impl Config {
    /// Overrides fields from environment-style variables.
    pub fn apply_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GMAIL_CREDENTIALS_PATH") {
            self.credentials_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("GMAIL_TOKEN_PATH") {
            self.token_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DISCORD_WEBHOOK_URL") {
            self.webhook_url = v.trim().to_string();
        }
        if let Some(v) = lookup("WEBHOOK_MENTION") {
            self.webhook_mention = Some(v).filter(|m| !m.trim().is_empty());
        }
        if let Some(v) = lookup("DESKTOP_NOTIFY") {
            self.desktop_notify = parse_bool("DESKTOP_NOTIFY", &v)?;
        }
        if let Some(v) = lookup("CHECK_INTERVAL") {
            self.check_interval_secs = parse_num("CHECK_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("REPLY_FROM") {
            self.reply_from = Some(v).filter(|m| !m.trim().is_empty());
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT") {
            self.request_timeout_secs = parse_num("REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("STALE_AFTER_INTERVALS") {
            self.stale_after_intervals = parse_num("STALE_AFTER_INTERVALS", &v)?;
        }
        if let Some(v) = lookup("MAX_RESULTS") {
            self.max_results = parse_num("MAX_RESULTS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CHECK_INTERVAL_SECS).contains(&self.check_interval_secs) {
            return Err(anyhow!(
                "check interval must be between 1 and {MAX_CHECK_INTERVAL_SECS} seconds"
            ));
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.request_timeout_secs) {
            return Err(anyhow!(
                "request timeout must be between 1 and {MAX_REQUEST_TIMEOUT_SECS} seconds"
            ));
        }
        if self.stale_after_intervals == 0 {
            return Err(anyhow!("stale_after_intervals must be positive"));
        }
        let stale = self
            .check_interval_secs
            .checked_mul(u64::from(self.stale_after_intervals))
            .filter(|secs| *secs <= MAX_STALE_AFTER_SECS);
        if stale.is_none() {
            return Err(anyhow!(
                "check_interval_secs * stale_after_intervals exceeds {MAX_STALE_AFTER_SECS} seconds"
            ));
        }
        if !(1..=500).contains(&self.max_results) {
            return Err(anyhow!("max_results must be between 1 and 500"));
        }
        if !self.webhook_url.is_empty() {
            let url = url::Url::parse(&self.webhook_url)
                .map_err(|e| anyhow!("invalid webhook URL: {e}"))?;
            if url.scheme() != "https" && url.scheme() != "http" {
                return Err(anyhow!("webhook URL must be http(s)"));
            }
        }
        self.rule_table()?;
        Ok(())
    }

    pub fn rule_table(&self) -> Result<RuleTable> {
        match &self.rules {
            Some(rules) => RuleTable::new(rules.clone()).context("invalid [[rules]] in config"),
            None => Ok(RuleTable::default()),
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Age beyond which the last completed cycle counts as stale.
    pub fn stale_after(&self) -> Duration {
        self.check_interval()
            .checked_mul(self.stale_after_intervals)
            .unwrap_or(Duration::MAX)
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE_NAME)
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join(STATS_FILE_NAME)
    }
}

fn read_file(path: &Path) -> Result<Config> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}

/// Defaults, then the TOML file (explicit path, or the default one if present),
/// then environment variables.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut cfg = match path {
        Some(p) => read_file(p)?,
        None => {
            let p = default_config_path();
            if p.exists() {
                read_file(&p)?
            } else {
                Config::default()
            }
        }
    };
    cfg.apply_lookup(|k| std::env::var(k).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

const TEMPLATE_HEADER: &str = "\
# mail-triage configuration.
# Environment variables (CHECK_INTERVAL, DISCORD_WEBHOOK_URL, DATA_DIR, ...) override these values.
# Delete the [[rules]] tables to fall back to the built-in categories.

";

/// Writes a template config for users to edit. Never overwrites.
pub fn write_template(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow!("{} already exists", path.display()));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let sample = Config {
        reply_from: Some("you@example.com".to_string()),
        rules: Some(default_rules()),
        ..Config::default()
    };
    let body = toml::to_string_pretty(&sample)?;
    fs::write(path, format!("{TEMPLATE_HEADER}{body}"))?;
    Ok(())
}
