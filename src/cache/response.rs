//! Response cache with content fingerprints.
//!
//! Stores serialized responses keyed by [`super::keys::response_key`] output
//! and negotiates conditional GETs against the stored fingerprint. Entries
//! are immutable once written; a re-store fully replaces. Store outages
//! degrade every path here to a miss, never to an error.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::warn;

use crate::store::StoreHandle;

/// Hex SHA-256 of the exact bytes served.
///
/// The fingerprint doubles as the ETag value; it must always be computed
/// from the byte representation that goes on the wire.
pub fn fingerprint(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// One cached response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(with = "payload_encoding")]
    pub payload: Bytes,
    pub content_type: Option<String>,
    pub fingerprint: String,
    #[serde(with = "time::serde::timestamp")]
    pub stored_at: OffsetDateTime,
    pub ttl_seconds: u64,
}

mod payload_encoding {
    use super::*;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(de::Error::custom)
    }
}

/// Outcome of a conditional lookup.
#[derive(Debug)]
pub enum Negotiation {
    /// The client already holds the stored representation.
    NotModified { fingerprint: String },
    /// A stored entry exists but the client's fingerprint is absent or stale.
    Hit { entry: CacheEntry },
    /// Nothing stored; the caller executes the real handler.
    Miss,
}

/// Get/set of serialized responses over the shared TTL store.
#[derive(Clone)]
pub struct ResponseCache {
    store: StoreHandle,
}

impl ResponseCache {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_slice::<CacheEntry>(&raw) {
                Ok(entry) => Some(entry),
                Err(error) => {
                    warn!(key, error = %error, "stored cache entry did not decode, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                counter!("raffica_cache_degraded_total").increment(1);
                warn!(key, error = %error, "cache lookup degraded to miss");
                None
            }
        }
    }

    /// Store a successful response, returning its fingerprint.
    ///
    /// `None` means the entry was not stored (store outage or entry encoding
    /// failure); callers proceed as if the write had happened, since a lost
    /// cache write only costs a future recomputation.
    pub async fn store(
        &self,
        key: &str,
        payload: Bytes,
        content_type: Option<String>,
        ttl: Duration,
    ) -> Option<String> {
        let fingerprint = fingerprint(&payload);
        let entry = CacheEntry {
            payload,
            content_type,
            fingerprint: fingerprint.clone(),
            stored_at: OffsetDateTime::now_utc(),
            ttl_seconds: ttl.as_secs(),
        };
        let raw = match serde_json::to_vec(&entry) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(key, error = %error, "cache entry failed to encode, skipping store");
                return None;
            }
        };
        match self.store.put(key, Bytes::from(raw), ttl).await {
            Ok(()) => {
                counter!("raffica_cache_store_total").increment(1);
                Some(fingerprint)
            }
            Err(error) => {
                counter!("raffica_cache_degraded_total").increment(1);
                warn!(key, error = %error, "cache store skipped");
                None
            }
        }
    }

    /// Conditional lookup: compare the client's fingerprint with the stored
    /// one and short-circuit when they match.
    pub async fn negotiate(&self, key: &str, client_fingerprint: Option<&str>) -> Negotiation {
        match self.lookup(key).await {
            Some(entry) => {
                if client_fingerprint == Some(entry.fingerprint.as_str()) {
                    counter!("raffica_cache_not_modified_total").increment(1);
                    Negotiation::NotModified {
                        fingerprint: entry.fingerprint,
                    }
                } else {
                    counter!("raffica_cache_hit_total").increment(1);
                    Negotiation::Hit { entry }
                }
            }
            None => {
                counter!("raffica_cache_miss_total").increment(1);
                Negotiation::Miss
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::store::MemoryStore;

    use super::*;

    fn cache() -> ResponseCache {
        ResponseCache::new(StoreHandle::new(
            Arc::new(MemoryStore::new()),
            Duration::from_millis(100),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn store_then_negotiate_returns_exact_payload() {
        let cache = cache();
        let payload = Bytes::from_static(b"{\"name\":\"p1\"}");

        let stored_fp = cache
            .store("k", payload.clone(), Some("application/json".into()), Duration::from_secs(60))
            .await
            .expect("stored");
        assert_eq!(stored_fp, fingerprint(&payload));

        match cache.negotiate("k", None).await {
            Negotiation::Hit { entry } => {
                assert_eq!(entry.payload, payload);
                assert_eq!(entry.fingerprint, stored_fp);
                assert_eq!(entry.content_type.as_deref(), Some("application/json"));
            }
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn matching_fingerprint_short_circuits() {
        let cache = cache();
        let payload = Bytes::from_static(b"body");
        let fp = cache
            .store("k", payload, None, Duration::from_secs(60))
            .await
            .expect("stored");

        match cache.negotiate("k", Some(&fp)).await {
            Negotiation::NotModified { fingerprint } => assert_eq!(fingerprint, fp),
            other => panic!("expected not-modified, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stale_fingerprint_returns_payload() {
        let cache = cache();
        cache
            .store("k", Bytes::from_static(b"fresh"), None, Duration::from_secs(60))
            .await
            .expect("stored");

        match cache.negotiate("k", Some("deadbeef")).await {
            Negotiation::Hit { entry } => assert_eq!(entry.payload, Bytes::from_static(b"fresh")),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn absent_key_is_a_miss() {
        let cache = cache();
        assert!(matches!(cache.negotiate("nope", None).await, Negotiation::Miss));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_with_ttl() {
        let cache = cache();
        cache
            .store("k", Bytes::from_static(b"v"), None, Duration::from_secs(60))
            .await
            .expect("stored");

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(matches!(cache.negotiate("k", None).await, Negotiation::Miss));
    }

    #[tokio::test(start_paused = true)]
    async fn restore_fully_replaces() {
        let cache = cache();
        cache
            .store("k", Bytes::from_static(b"old"), None, Duration::from_secs(60))
            .await
            .expect("stored");
        let new_fp = cache
            .store("k", Bytes::from_static(b"new"), None, Duration::from_secs(60))
            .await
            .expect("stored");

        match cache.negotiate("k", None).await {
            Negotiation::Hit { entry } => {
                assert_eq!(entry.payload, Bytes::from_static(b"new"));
                assert_eq!(entry.fingerprint, new_fp);
            }
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[test]
    fn entry_roundtrips_binary_payloads() {
        let entry = CacheEntry {
            payload: Bytes::from(vec![0u8, 159, 146, 150]),
            content_type: Some("application/octet-stream".into()),
            fingerprint: fingerprint(&[0u8, 159, 146, 150]),
            stored_at: OffsetDateTime::UNIX_EPOCH,
            ttl_seconds: 60,
        };
        let raw = serde_json::to_vec(&entry).expect("encodes");
        let decoded: CacheEntry = serde_json::from_slice(&raw).expect("decodes");
        assert_eq!(decoded.payload, entry.payload);
        assert_eq!(decoded.fingerprint, entry.fingerprint);
    }

    #[test]
    fn fingerprint_is_hex_sha256_of_exact_bytes() {
        // sha256("abc")
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(fingerprint(b"abc"), fingerprint(b"abc "));
    }
}
