use crate::domain::email::{Message, Reply};
use crate::mail::InboxGateway;
use crate::mail::decoders::extract_address;
use crate::notify::{Alert, NotificationSink};
use crate::rules::RuleTable;
use crate::store::state::StateStore;
use crate::store::stats::StatsStore;

/// Categories left unread so a human follows up on them.
pub const KEEP_UNREAD: [&str; 3] = ["urgent", "partnership", "technical"];

/// Which side effects of a dispatch went through.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub notified: bool,
    pub replied: bool,
    pub marked_read: bool,
}

/// Runs the category-determined side effects for one message.
/// Outbound failures are logged and never stop the remaining steps.
pub struct Dispatcher<'a> {
    rules: &'a RuleTable,
    gateway: &'a dyn InboxGateway,
    sink: &'a dyn NotificationSink,
    reply_from: String,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        rules: &'a RuleTable,
        gateway: &'a dyn InboxGateway,
        sink: &'a dyn NotificationSink,
        reply_from: Option<String>,
    ) -> Self {
        Self {
            rules,
            gateway,
            sink,
            reply_from: reply_from.unwrap_or_default(),
        }
    }

    pub fn handle(
        &self,
        msg: &Message,
        category: &str,
        state: &mut StateStore,
        stats: &mut StatsStore,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let rule = self.rules.get(category);

        if rule.is_some_and(|r| r.notify) {
            let alert = Alert::for_message(msg, category, self.rules.color_for(category));
            match self.sink.deliver(&alert) {
                Ok(()) => outcome.notified = true,
                Err(e) => log::warn!("Notification for {} failed: {e:#}", msg.id),
            }
        }

        if let Some(template) = rule.and_then(|r| r.response_template()) {
            let reply = Reply {
                thread_id: msg.thread_id.clone(),
                to: extract_address(&msg.sender).to_string(),
                from: self.reply_from.clone(),
                subject: format!("Re: {}", msg.subject),
                body: template.to_string(),
            };
            match self.gateway.send_reply(&reply) {
                Ok(()) => {
                    log::info!("Sent auto-response to {}", reply.to);
                    outcome.replied = true;
                }
                Err(e) => log::warn!("Auto-response for {} failed: {e:#}", msg.id),
            }
        }

        stats.record_email(
            category,
            &msg.subject,
            &msg.sender,
            msg.received_at_epoch_seconds,
        );

        // write-ahead: persist the marker before touching read state
        state.mark_processed(&msg.id);
        state.save();

        if !KEEP_UNREAD.contains(&category) {
            match self.gateway.mark_read(&msg.id) {
                Ok(()) => outcome.marked_read = true,
                Err(e) => log::warn!("Marking {} as read failed: {e:#}", msg.id),
            }
        }

        outcome
    }
}
