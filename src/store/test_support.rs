//! Store doubles shared by unit tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{StoreError, TtlStore, WindowCount};

/// A store whose every operation fails as unreachable.
pub(crate) struct OfflineStore;

#[async_trait]
impl TtlStore for OfflineStore {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn put(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn remove(&self, _keys: &[String]) -> Result<u64, StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn incr(&self, _key: &str, _window: Duration) -> Result<WindowCount, StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn set_add(&self, _key: &str, _member: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn set_members(&self, _key: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn push_trim(
        &self,
        _key: &str,
        _id: &str,
        _value: Bytes,
        _max_len: usize,
        _ttl: Duration,
    ) -> Result<(), StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn list_newest(&self, _key: &str, _count: usize) -> Result<Vec<Bytes>, StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }
}
