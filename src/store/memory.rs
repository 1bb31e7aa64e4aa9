//! In-process TTL store.
//!
//! Sharded map with per-entry expiry. Entries are reaped lazily on access and
//! by an optional interval sweeper. Atomicity for `incr` and `push_trim` comes
//! from holding the shard entry for the whole operation.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::{StoreError, TtlStore, WindowCount};

#[derive(Debug, Clone)]
enum SlotValue {
    Blob(Bytes),
    Counter(u64),
    Set(HashSet<String>),
    List(VecDeque<ListItem>),
}

#[derive(Debug, Clone)]
struct ListItem {
    id: String,
    value: Bytes,
}

#[derive(Debug, Clone)]
struct Slot {
    value: SlotValue,
    expires_at: Instant,
}

impl Slot {
    fn new(value: SlotValue, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// In-memory implementation of the store contract.
///
/// Single-process only: all semantics the components rely on (atomic
/// increments, atomic push-trim-refresh, expiry) hold, while a remote backend
/// can replace it behind [`TtlStore`] without touching anything above.
#[derive(Default)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Drop every expired entry.
    pub fn sweep(&self) {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.expired(now));
        let reaped = before.saturating_sub(self.slots.len());
        if reaped > 0 {
            debug!(reaped, remaining = self.slots.len(), "swept expired store entries");
        }
    }

    /// Spawn a background task sweeping expired entries at `interval`.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_sweeper(store: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.sweep();
            }
        })
    }

    fn live(&self, key: &str) -> Option<Slot> {
        let now = Instant::now();
        let expired = match self.slots.get(key) {
            Some(slot) if !slot.expired(now) => return Some(slot.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.slots.remove_if(key, |_, slot| slot.expired(now));
        }
        None
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

#[async_trait]
impl TtlStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        match self.live(key) {
            Some(Slot {
                value: SlotValue::Blob(bytes),
                ..
            }) => Ok(Some(bytes)),
            _ => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        self.slots
            .insert(key.to_string(), Slot::new(SlotValue::Blob(value), ttl));
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut removed = 0;
        for key in keys {
            if self.slots.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn incr(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let now = Instant::now();
        let mut entry = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(SlotValue::Counter(0), window));
        if entry.expired(now) {
            *entry = Slot::new(SlotValue::Counter(0), window);
        }
        let count = if let SlotValue::Counter(n) = &mut entry.value {
            *n += 1;
            *n
        } else {
            // key previously held another shape; the counter claims it
            *entry = Slot::new(SlotValue::Counter(1), window);
            1
        };
        let remaining = entry.expires_at.saturating_duration_since(now);
        Ok(WindowCount { count, remaining })
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entry = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(SlotValue::Set(HashSet::new()), ttl));
        if entry.expired(now) || !matches!(entry.value, SlotValue::Set(_)) {
            *entry = Slot::new(SlotValue::Set(HashSet::new()), ttl);
        }
        if let SlotValue::Set(members) = &mut entry.value {
            members.insert(member.to_string());
        }
        entry.expires_at = entry.expires_at.max(now + ttl);
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.live(key) {
            Some(Slot {
                value: SlotValue::Set(members),
                ..
            }) => Ok(members.into_iter().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn push_trim(
        &self,
        key: &str,
        id: &str,
        value: Bytes,
        max_len: usize,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entry = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(SlotValue::List(VecDeque::new()), ttl));
        if entry.expired(now) || !matches!(entry.value, SlotValue::List(_)) {
            *entry = Slot::new(SlotValue::List(VecDeque::new()), ttl);
        }
        if let SlotValue::List(items) = &mut entry.value {
            if !items.iter().any(|item| item.id == id) {
                items.push_front(ListItem {
                    id: id.to_string(),
                    value,
                });
                items.truncate(max_len);
            }
        }
        entry.expires_at = now + ttl;
        Ok(())
    }

    async fn list_newest(&self, key: &str, count: usize) -> Result<Vec<Bytes>, StoreError> {
        match self.live(key) {
            Some(Slot {
                value: SlotValue::List(items),
                ..
            }) => Ok(items.iter().take(count).map(|item| item.value.clone()).collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        if let Some(mut slot) = self.slots.get_mut(key) {
            if !slot.expired(now) {
                slot.expires_at = now + ttl;
            }
        }
        Ok(())
    }
}
