use anyhow::{Result, anyhow};
use notify_rust::{Hint, Notification};

use super::{Alert, NotificationSink};

/// Raises a desktop notification on the local session.
pub struct DesktopSink {
    app_name: String,
}

impl DesktopSink {
    pub fn new() -> Self {
        Self {
            app_name: "mail-triage".to_string(),
        }
    }
}

impl Default for DesktopSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for DesktopSink {
    fn deliver(&self, alert: &Alert) -> Result<()> {
        let mut n = Notification::new();
        n.appname(&self.app_name)
            .summary(&format!("{}: {}", alert.title, alert.subject))
            .body(&format!("{}\n{}", alert.from, alert.body))
            .hint(Hint::Category("email".to_string()));

        n.show()
            .map(|_| ())
            .map_err(|e| anyhow!("desktop notification failed: {e}"))
    }
}
