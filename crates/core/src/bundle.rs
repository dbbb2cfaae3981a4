//! Published bundles and the token-allocation routine.

use tracing::debug;

use crate::{
    error::Error,
    store::{BundleStore, CreateOutcome},
    token,
};

/// How many fresh tokens to try before giving up on publication.
const MAX_TOKEN_ATTEMPTS: usize = 5;

/// Immutable `(message, ordered video list)` pair addressable by token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub token: String,
    pub message: String,
    /// Video references in their original submission order.
    pub videos: Vec<String>,
}

/// Publish a finalized batch: allocate a token and insert the bundle.
///
/// Tokens are random and unchecked at generation time; a collision is
/// detected by the store's insert and answered with a fresh token, up
/// to [`MAX_TOKEN_ATTEMPTS`] tries.
pub async fn publish(
    store: &dyn BundleStore,
    message: String,
    videos: Vec<String>,
) -> anyhow::Result<Bundle> {
    for attempt in 1..=MAX_TOKEN_ATTEMPTS {
        let bundle = Bundle {
            token: token::generate(token::DEFAULT_TOKEN_LEN),
            message: message.clone(),
            videos: videos.clone(),
        };
        match store.create(&bundle).await? {
            CreateOutcome::Created => return Ok(bundle),
            CreateOutcome::TokenTaken => {
                debug!(token = %bundle.token, attempt, "token collision, regenerating");
            },
        }
    }
    Err(Error::TokenSpaceExhausted {
        attempts: MAX_TOKEN_ATTEMPTS,
    }
    .into())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        anyhow::Result,
        async_trait::async_trait,
        std::sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    /// Store that reports `TokenTaken` for the first `conflicts` inserts.
    #[derive(Default)]
    struct ConflictingStore {
        conflicts: usize,
        attempts: AtomicUsize,
        created: Mutex<Vec<Bundle>>,
    }

    impl ConflictingStore {
        fn with_conflicts(conflicts: usize) -> Self {
            Self {
                conflicts,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl BundleStore for ConflictingStore {
        async fn create(&self, bundle: &Bundle) -> Result<CreateOutcome> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.conflicts {
                return Ok(CreateOutcome::TokenTaken);
            }
            self.created.lock().unwrap().push(bundle.clone());
            Ok(CreateOutcome::Created)
        }

        async fn find(&self, token: &str) -> Result<Option<Bundle>> {
            Ok(self
                .created
                .lock()
                .unwrap()
                .iter()
                .find(|b| b.token == token)
                .cloned())
        }
    }

    #[tokio::test]
    async fn publish_creates_bundle_with_first_token() {
        let store = ConflictingStore::with_conflicts(0);
        let bundle = publish(&store, "Hello".into(), vec!["x".into(), "y".into()])
            .await
            .unwrap();

        assert_eq!(bundle.token.len(), 6);
        assert_eq!(bundle.message, "Hello");
        assert_eq!(bundle.videos, vec!["x", "y"]);
        assert_eq!(store.attempts.load(Ordering::SeqCst), 1);

        let found = store.find(&bundle.token).await.unwrap().unwrap();
        assert_eq!(found, bundle);
    }

    #[tokio::test]
    async fn publish_regenerates_on_collision() {
        let store = ConflictingStore::with_conflicts(3);
        let bundle = publish(&store, "m".into(), vec!["v".into()]).await.unwrap();

        assert_eq!(store.attempts.load(Ordering::SeqCst), 4);
        assert!(store.find(&bundle.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn publish_gives_up_after_bounded_retries() {
        let store = ConflictingStore::with_conflicts(usize::MAX);
        let err = publish(&store, "m".into(), vec!["v".into()])
            .await
            .unwrap_err();

        assert_eq!(
            err.downcast::<Error>().unwrap(),
            Error::TokenSpaceExhausted { attempts: 5 }
        );
        assert!(store.created.lock().unwrap().is_empty());
    }
}
