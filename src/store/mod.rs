//! Shared TTL store contract.
//!
//! Every component in this crate keeps its mutable state in one logical
//! key/value store with expiry. The [`TtlStore`] trait is the contract a
//! backing store must satisfy; [`MemoryStore`] is the in-process
//! implementation. Components never hold a store directly: they receive a
//! [`StoreHandle`], a cheap clone of the single client constructed at startup,
//! which bounds every call with a timeout.

mod memory;
#[cfg(test)]
pub(crate) mod test_support;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::warn;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ttl store unavailable: {message}")]
    Unavailable { message: String },
    #[error("ttl store operation `{op}` timed out")]
    Timeout { op: &'static str },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Result of an atomic window increment.
#[derive(Debug, Clone, Copy)]
pub struct WindowCount {
    /// Counter value after this increment.
    pub count: u64,
    /// Time left until the counter expires and the window resets.
    pub remaining: Duration,
}

/// Key/value + key/list + key/set primitive with expiry.
///
/// Increment and push-trim must be atomic with respect to concurrent callers
/// of the same key; plain get/put may race freely (callers rely on immutable
/// values and last-write-wins).
#[async_trait]
pub trait TtlStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Delete the given keys, returning how many existed.
    async fn remove(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Increment a counter, creating it with the window's TTL when absent.
    ///
    /// The read-and-increment is one operation on the store; there is no
    /// get-then-set anywhere in the contract.
    async fn incr(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError>;

    /// Add a member to a set, extending the set's TTL to at least `ttl`.
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Push a value to the head of a list, drop entries beyond `max_len` from
    /// the tail, and refresh the list's TTL, as one operation.
    ///
    /// `id` is the caller's idempotency discriminator: a retried push whose id
    /// is still present in the retained window is a no-op.
    async fn push_trim(
        &self,
        key: &str,
        id: &str,
        value: Bytes,
        max_len: usize,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Up to `count` list values, newest first.
    async fn list_newest(&self, key: &str, count: usize) -> Result<Vec<Bytes>, StoreError>;

    /// Reset a key's TTL. No-op when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
}

/// The one long-lived store client, passed by clone into every component.
///
/// Applies a bounded timeout to each call so no operation blocks a request
/// indefinitely; what to do on failure (fail open or closed) stays with the
/// caller.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn TtlStore>,
    timeout: Duration,
}

impl StoreHandle {
    pub fn new(inner: Arc<dyn TtlStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                counter!("raffica_store_timeout_total").increment(1);
                warn!(
                    op,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "ttl store call exceeded its deadline"
                );
                Err(StoreError::Timeout { op })
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.bounded("get", self.inner.get(key)).await
    }

    pub async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        self.bounded("put", self.inner.put(key, value, ttl)).await
    }

    pub async fn remove(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.bounded("remove", self.inner.remove(keys)).await
    }

    pub async fn incr(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        self.bounded("incr", self.inner.incr(key, window)).await
    }

    pub async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        self.bounded("set_add", self.inner.set_add(key, member, ttl))
            .await
    }

    pub async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.bounded("set_members", self.inner.set_members(key))
            .await
    }

    pub async fn push_trim(
        &self,
        key: &str,
        id: &str,
        value: Bytes,
        max_len: usize,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.bounded("push_trim", self.inner.push_trim(key, id, value, max_len, ttl))
            .await
    }

    pub async fn list_newest(&self, key: &str, count: usize) -> Result<Vec<Bytes>, StoreError> {
        self.bounded("list_newest", self.inner.list_newest(key, count))
            .await
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.bounded("expire", self.inner.expire(key, ttl)).await
    }
}
