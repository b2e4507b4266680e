pub mod classifier;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Category assigned when no rule matches. Never beaten by a real rule.
pub const DEFAULT_CATEGORY: &str = "general";

/// Embed colour used for categories without a rule or colour of their own.
pub const DEFAULT_COLOR: u32 = 0x808080;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub keywords: Vec<String>,
    /// Lower is more important.
    pub priority: u32,
    #[serde(default)]
    pub notify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_response: Option<String>,
    #[serde(default = "default_color")]
    pub color: u32,
}

fn default_color() -> u32 {
    DEFAULT_COLOR
}

impl CategoryRule {
    pub fn new(name: &str, keywords: &[&str], priority: u32) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            priority,
            notify: false,
            auto_response: None,
            color: DEFAULT_COLOR,
        }
    }

    pub fn notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    pub fn auto_response(mut self, text: &str) -> Self {
        self.auto_response = Some(text.to_string());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    /// The reply template, if there is one worth sending.
    pub fn response_template(&self) -> Option<&str> {
        self.auto_response
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

/// Ordered, immutable rule list. Declaration order breaks priority ties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<CategoryRule>,
}

impl RuleTable {
    /// Validates names and normalizes keywords to lowercase (deduplicated, order kept).
    pub fn new(rules: Vec<CategoryRule>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(rules.len());

        for mut rule in rules {
            let name = rule.name.trim().to_string();
            if name.is_empty() {
                return Err(anyhow!("rule with empty category name"));
            }
            if name == DEFAULT_CATEGORY {
                return Err(anyhow!(
                    "'{DEFAULT_CATEGORY}' is the fallback category and cannot carry a rule"
                ));
            }
            if !seen.insert(name.clone()) {
                return Err(anyhow!("duplicate rule for category '{name}'"));
            }

            let mut kw_seen = HashSet::new();
            rule.keywords = rule
                .keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty() && kw_seen.insert(k.clone()))
                .collect();
            if rule.keywords.is_empty() {
                return Err(anyhow!("rule '{name}' has no keywords"));
            }
            rule.name = name;
            normalized.push(rule);
        }

        Ok(Self { rules: normalized })
    }

    pub fn get(&self, category: &str) -> Option<&CategoryRule> {
        self.rules.iter().find(|r| r.name == category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn color_for(&self, category: &str) -> u32 {
        self.get(category).map(|r| r.color).unwrap_or(DEFAULT_COLOR)
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

/// Built-in rule table used when the config file does not declare `[[rules]]`.
pub fn default_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "urgent",
            &[
                "urgent",
                "asap",
                "emergency",
                "critical",
                "immediately",
                "time-sensitive",
            ],
            1,
        )
        .notify(true)
        .color(0xFF0000)
        .auto_response(
            "Thank you for your urgent message. I've been notified and will respond as soon as possible.",
        ),
        CategoryRule::new(
            "partnership",
            &[
                "partnership",
                "collaboration",
                "collaborate",
                "work together",
                "joint venture",
            ],
            2,
        )
        .notify(true)
        .color(0x00FF00)
        .auto_response(
            "Thank you for reaching out about a potential partnership. I'm interested in exploring collaboration opportunities. I'll review your proposal and get back to you within 24-48 hours.",
        ),
        CategoryRule::new(
            "technical",
            &[
                "bug",
                "error",
                "issue",
                "problem",
                "technical",
                "deploy",
                "code",
                "github",
            ],
            2,
        )
        .notify(true)
        .color(0x0000FF),
        CategoryRule::new(
            "business",
            &[
                "invoice",
                "payment",
                "contract",
                "agreement",
                "proposal",
                "quote",
            ],
            2,
        )
        .notify(true)
        .color(0xFFD700)
        .auto_response(
            "Thank you for your business inquiry. I'll review the details and respond within 48 hours.",
        ),
        CategoryRule::new(
            "community",
            &["newsletter", "community", "event", "meetup", "announcement"],
            3,
        ),
        CategoryRule::new(
            "spam",
            &[
                "unsubscribe",
                "marketing",
                "promotion",
                "discount",
                "free trial",
            ],
            4,
        ),
    ]
}
