use serde::{Deserialize, Serialize};

pub type MessageId = String;

/// A message as fetched from the mailbox. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub snippet: String,
    pub received_at_epoch_seconds: i64,
}

/// Listing entry returned by the unseen-messages query. The full fetch supplies the rest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageRef {
    pub id: MessageId,
}

/// Outgoing auto-reply, threaded to the original conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub thread_id: String,
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}
