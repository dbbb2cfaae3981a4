//! Store traits implemented by the persistence layer.

use {anyhow::Result, async_trait::async_trait};

use crate::{bundle::Bundle, session::AuthoringSession};

/// A `(channel_id, owner_id)` pair recording which administrator
/// connected which channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    pub channel_id: i64,
    pub owner_id: i64,
}

/// Persistent storage for in-progress authoring sessions, keyed by owner.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find(&self, owner_id: i64) -> Result<Option<AuthoringSession>>;

    /// Insert or overwrite the owner's session.
    async fn upsert(&self, session: &AuthoringSession) -> Result<()>;

    /// Atomically append one video and return the updated session.
    ///
    /// The push and the count it reports happen in a single statement,
    /// so two near-simultaneous uploads from the same owner cannot lose
    /// an append. Returns `None` when the owner has no collecting
    /// session or the stored sequence is already at its target count.
    async fn append_video(&self, owner_id: i64, video: &str) -> Result<Option<AuthoringSession>>;

    async fn delete(&self, owner_id: i64) -> Result<()>;
}

/// Result of a bundle insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// A bundle with this token already exists; the caller should
    /// regenerate and retry.
    TokenTaken,
}

/// Write-once storage for published bundles, keyed by token.
#[async_trait]
pub trait BundleStore: Send + Sync {
    async fn create(&self, bundle: &Bundle) -> Result<CreateOutcome>;
    async fn find(&self, token: &str) -> Result<Option<Bundle>>;
}

/// Upsert-only registry of channel ownership.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Record `binding`, replacing any earlier owner of the channel.
    async fn bind(&self, binding: &ChannelBinding) -> Result<()>;
    async fn find(&self, channel_id: i64) -> Result<Option<ChannelBinding>>;
}
