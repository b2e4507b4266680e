use super::{DEFAULT_CATEGORY, RuleTable};

/// Maps a message's text fields to exactly one category.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: RuleTable,
}

impl Classifier {
    pub fn new(rules: RuleTable) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Lowest priority number among matching rules wins; the first declared rule wins ties.
    /// Falls back to `general` when nothing matches.
    pub fn classify(&self, subject: &str, snippet: &str, sender: &str) -> &str {
        let content = format!("{subject} {snippet} {sender}").to_lowercase();

        let mut best: Option<(&str, u32)> = None;
        for rule in self.rules.iter() {
            if !rule.keywords.iter().any(|k| content.contains(k.as_str())) {
                continue;
            }
            match best {
                Some((_, priority)) if rule.priority >= priority => {}
                _ => best = Some((rule.name.as_str(), rule.priority)),
            }
        }

        best.map(|(name, _)| name).unwrap_or(DEFAULT_CATEGORY)
    }
}
