//! Collaborator traits. The chat platform is an external collaborator;
//! everything the control plane needs from it fits in one trait so tests
//! can swap in a recording fake.

use async_trait::async_trait;

use crate::error::Result;

/// A guild member as the chat platform knows them.
#[derive(Debug, Clone)]
pub struct Member {
    pub user_id: String,
    pub display_name: String,
}

/// The messaging collaborator: direct messages, channel messages, and
/// member lookup. Implemented over Discord REST in `torneo-channels`.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a direct message. A failure here is a `Delivery`/`Channel`
    /// error for this one recipient only.
    async fn send_dm(&self, user_id: &str, text: &str) -> Result<()>;

    /// Post to a channel.
    async fn send_channel(&self, channel_id: &str, text: &str) -> Result<()>;

    /// Look up one member, or `None` if the guild does not know them.
    async fn resolve_member(&self, guild_id: &str, user_id: &str) -> Result<Option<Member>>;

    /// Full membership snapshot.
    async fn list_members(&self, guild_id: &str) -> Result<Vec<Member>>;

    /// Remove a message (used to scrub operator commands). Best effort;
    /// callers ignore failures.
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()>;
}
