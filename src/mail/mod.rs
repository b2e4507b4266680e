pub mod decoders;
pub mod gmail;

use anyhow::Result;

use crate::domain::email::{Message, MessageRef, Reply};

/// Mailbox operations the service depends on.
pub trait InboxGateway: Send + Sync {
    /// Confirms credentials are usable. Failure here is fatal at startup.
    fn authenticate(&self) -> Result<()>;

    /// Unseen messages in the primary mailbox, most recent first, at most `max`.
    fn list_unseen(&self, max: u32) -> Result<Vec<MessageRef>>;

    fn fetch(&self, id: &str) -> Result<Message>;

    fn send_reply(&self, reply: &Reply) -> Result<()>;

    fn mark_read(&self, id: &str) -> Result<()>;
}
