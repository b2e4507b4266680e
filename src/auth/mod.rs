pub mod oauth;
pub mod token_file;
pub mod token_manager;

use anyhow::Result;

/// Supplies a bearer token for mailbox API calls, refreshing it when needed.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Result<String>;
}
