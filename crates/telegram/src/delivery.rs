//! Token redemption: resolve a bundle and replay it to the requester.

use std::{sync::Arc, time::Duration};

use {
    anyhow::Result,
    tracing::{info, warn},
};

use batchlink_core::BundleStore;

use crate::outbound::Outbound;

/// Reply for a token with no matching bundle.
pub const INVALID_LINK_MSG: &str = "❌ Invalid or expired link.";
/// Acknowledgment after the last video.
pub const ALL_SENT_MSG: &str = "✅ All videos sent.";

/// Pacing and fault policy for a delivery run.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    /// Pause after each video dispatch, success or failure.
    pub pause: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            pause: Duration::from_secs(3),
        }
    }
}

/// Outcome of a delivery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// No bundle matched the token; the requester was told.
    NotFound,
    /// The bundle was replayed. Individual video sends may have failed;
    /// the requester gets no per-item failure notice.
    Delivered { delivered: usize, failed: usize },
}

/// Replays bundles to requesters in stored order with fixed pacing.
pub struct DeliveryEngine {
    bundles: Arc<dyn BundleStore>,
    policy: DeliveryPolicy,
}

impl DeliveryEngine {
    pub fn new(bundles: Arc<dyn BundleStore>, policy: DeliveryPolicy) -> Self {
        Self { bundles, policy }
    }

    /// Deliver the bundle behind `token` to `chat_id`.
    ///
    /// Sends the message, then each video in stored order. A failed
    /// video dispatch is logged and skipped; the remaining videos still
    /// go out, each after the same pause.
    pub async fn deliver(
        &self,
        outbound: &dyn Outbound,
        chat_id: i64,
        token: &str,
    ) -> Result<DeliveryOutcome> {
        let Some(bundle) = self.bundles.find(token).await? else {
            info!(chat_id, token, "redemption for unknown token");
            outbound.send_text(chat_id, INVALID_LINK_MSG).await?;
            return Ok(DeliveryOutcome::NotFound);
        };

        outbound.send_text(chat_id, &bundle.message).await?;

        let mut delivered = 0usize;
        let mut failed = 0usize;
        for video in &bundle.videos {
            match outbound.send_video(chat_id, video).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(chat_id, token, error = %e, "failed to send video");
                },
            }
            tokio::time::sleep(self.policy.pause).await;
        }

        outbound.send_text(chat_id, ALL_SENT_MSG).await?;
        info!(chat_id, token, delivered, failed, "bundle delivered");
        Ok(DeliveryOutcome::Delivered { delivered, failed })
    }
}
