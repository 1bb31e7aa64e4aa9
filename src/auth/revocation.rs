//! Revoked-credential set.
//!
//! Logout writes a flag keyed by token id whose TTL equals the credential's
//! remaining validity: never shorter (the credential would work again), and
//! no longer than needed. Every credential-bearing request checks the set;
//! this is the one store consumer that fails closed, because treating an
//! unreachable store as "not revoked" would resurrect revoked credentials.

use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use tracing::warn;

use crate::store::{StoreError, StoreHandle};

#[derive(Clone)]
pub struct RevocationSet {
    store: StoreHandle,
}

impl RevocationSet {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Record a credential as revoked for the rest of its lifetime.
    ///
    /// Errors surface to the caller: a logout that could not be recorded
    /// must not report success.
    pub async fn revoke(
        &self,
        token_id: &str,
        remaining_ttl: Duration,
    ) -> Result<(), StoreError> {
        self.store
            .put(&revoked_key(token_id), Bytes::from_static(b"1"), remaining_ttl)
            .await
    }

    /// Whether the credential has been revoked. Fails closed.
    pub async fn is_revoked(&self, token_id: &str) -> bool {
        match self.store.get(&revoked_key(token_id)).await {
            Ok(flag) => {
                let revoked = flag.is_some();
                if revoked {
                    counter!("raffica_revocation_denied_total").increment(1);
                }
                revoked
            }
            Err(error) => {
                counter!("raffica_revocation_denied_total").increment(1);
                warn!(
                    token_id,
                    error = %error,
                    "revocation set unreachable, denying credential"
                );
                true
            }
        }
    }
}

fn revoked_key(token_id: &str) -> String {
    format!("revoked:{token_id}")
}
