//! Tag-indexed invalidation.
//!
//! Cache keys are content-addressed, so a write handler cannot name them
//! directly. Tags give writes a symbolic handle: at cache-write time each
//! rendered tag is bound to the entry's key in a store-side key set, and
//! invalidating the tag purges every bound key plus the set itself.
//! Purging more than strictly necessary is acceptable; purging less never is.

use std::time::Duration;

use metrics::counter;
use tracing::{info, warn};

use crate::store::{StoreError, StoreHandle};

use super::keys;

/// Tag → key-set index maintained in the shared store.
#[derive(Clone)]
pub struct TagIndex {
    store: StoreHandle,
}

impl TagIndex {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Bind a cache key to a rendered tag.
    ///
    /// The set's TTL is extended to at least the entry's TTL so the index
    /// never forgets a key before the entry itself expires. A failed bind is
    /// logged and dropped; the entry still expires by TTL.
    pub async fn bind(&self, tag: &str, cache_key: &str, ttl: Duration) {
        if let Err(error) = self.store.set_add(&keys::tag_key(tag), cache_key, ttl).await {
            counter!("raffica_cache_degraded_total").increment(1);
            warn!(tag, cache_key, error = %error, "tag binding skipped");
        }
    }

    pub async fn keys_for(&self, tag: &str) -> Result<Vec<String>, StoreError> {
        self.store.set_members(&keys::tag_key(tag)).await
    }
}

/// Outcome of one invalidation pass.
#[derive(Debug, Default)]
pub struct InvalidationReport {
    /// Cache keys actually deleted from the store.
    pub purged: u64,
    /// Tags whose key sets could not be resolved or deleted.
    pub failed_tags: Vec<String>,
}

impl InvalidationReport {
    pub fn fully_applied(&self) -> bool {
        self.failed_tags.is_empty()
    }
}

/// Translates a write event into purged cache keys.
///
/// Must be called strictly after the underlying write is durably committed.
/// Failures are logged with the tag and keys needed to re-invalidate by hand
/// and reported to the caller, but never propagate as errors: the write has
/// already happened, and staleness is recoverable where a lost write is not.
#[derive(Clone)]
pub struct InvalidationCoordinator {
    store: StoreHandle,
    index: TagIndex,
}

impl InvalidationCoordinator {
    pub fn new(store: StoreHandle) -> Self {
        Self {
            index: TagIndex::new(store.clone()),
            store,
        }
    }

    pub fn index(&self) -> &TagIndex {
        &self.index
    }

    pub async fn invalidate(&self, tags: &[String]) -> InvalidationReport {
        let mut report = InvalidationReport::default();

        for tag in tags {
            let bound = match self.index.keys_for(tag).await {
                Ok(bound) => bound,
                Err(error) => {
                    counter!("raffica_invalidation_failed_total").increment(1);
                    warn!(
                        tag,
                        error = %error,
                        "tag key set unreadable; bound entries will only expire by ttl"
                    );
                    report.failed_tags.push(tag.clone());
                    continue;
                }
            };

            let mut doomed = bound.clone();
            doomed.push(keys::tag_key(tag));
            match self.store.remove(&doomed).await {
                Ok(_) => {
                    let purged = bound.len() as u64;
                    counter!("raffica_invalidation_purged_total").increment(purged);
                    info!(tag, purged, "purged cache keys for tag");
                    report.purged += purged;
                }
                Err(error) => {
                    counter!("raffica_invalidation_failed_total").increment(1);
                    warn!(
                        tag,
                        keys = ?bound,
                        error = %error,
                        "tag purge failed; re-invalidate these keys manually"
                    );
                    report.failed_tags.push(tag.clone());
                }
            }
        }

        report
    }
}
