//! Bounded conversation log.
//!
//! Per-session, append-only message sequences capped at a maximum length
//! with oldest-first eviction, living in the shared TTL store as
//! `session:{sessionId}` lists plus a `session-seq:{sessionId}` counter.
//!
//! The store keeps messages newest-first; consumers always see chronological
//! order. That flip happens in exactly one place, [`ConversationLog::window`].

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::store::{StoreError, StoreHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One conversation turn as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Message identity; doubles as the idempotency key for retried appends.
    pub id: Uuid,
    /// Monotonic per-session sequence number; chronological order is sorted
    /// `seq`, never store insertion order.
    pub seq: u64,
    pub role: Role,
    pub content: String,
    #[serde(with = "time::serde::timestamp")]
    pub at: OffsetDateTime,
}

/// Append/window/clear over capped per-session message lists.
#[derive(Clone)]
pub struct ConversationLog {
    store: StoreHandle,
    max_length: usize,
    ttl: Duration,
}

impl ConversationLog {
    pub fn new(store: StoreHandle, max_length: usize, ttl: Duration) -> Self {
        Self {
            store,
            max_length,
            ttl,
        }
    }

    /// Append one turn: push to the head, trim to the cap, refresh the TTL.
    ///
    /// Push-trim-refresh is a single atomic store operation; the message id
    /// makes a retried push a no-op. Returns `None` when the store was
    /// unreachable: the turn is dropped with a warning and the conversation
    /// continues.
    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> Option<StoredMessage> {
        let seq = match self.store.incr(&seq_key(session_id), self.ttl).await {
            Ok(window) => window.count,
            Err(error) => {
                counter!("raffica_log_degraded_total").increment(1);
                warn!(session_id, error = %error, "message sequence unavailable, append dropped");
                return None;
            }
        };

        let message = StoredMessage {
            id: Uuid::new_v4(),
            seq,
            role,
            content: content.into(),
            at: OffsetDateTime::now_utc(),
        };
        let raw = match serde_json::to_vec(&message) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(session_id, error = %error, "message failed to encode, append dropped");
                return None;
            }
        };

        match self
            .store
            .push_trim(
                &list_key(session_id),
                &message.id.to_string(),
                Bytes::from(raw),
                self.max_length,
                self.ttl,
            )
            .await
        {
            Ok(()) => {
                counter!("raffica_log_append_total").increment(1);
                // keep the sequence counter alive as long as the list itself
                if let Err(error) = self.store.expire(&seq_key(session_id), self.ttl).await {
                    warn!(session_id, error = %error, "sequence ttl refresh failed");
                }
                Some(message)
            }
            Err(error) => {
                counter!("raffica_log_degraded_total").increment(1);
                warn!(session_id, error = %error, "message append dropped");
                None
            }
        }
    }

    /// The last `k` messages, oldest first.
    ///
    /// Messages evicted by the cap are permanently gone. A store outage
    /// degrades to an empty window.
    pub async fn window(&self, session_id: &str, k: usize) -> Vec<StoredMessage> {
        let raw = match self.store.list_newest(&list_key(session_id), k).await {
            Ok(raw) => raw,
            Err(error) => {
                counter!("raffica_log_degraded_total").increment(1);
                warn!(session_id, error = %error, "history window degraded to empty");
                return Vec::new();
            }
        };

        let mut messages: Vec<StoredMessage> = raw
            .iter()
            .filter_map(|bytes| match serde_json::from_slice(bytes) {
                Ok(message) => Some(message),
                Err(error) => {
                    warn!(session_id, error = %error, "skipping undecodable stored message");
                    None
                }
            })
            .collect();
        messages.sort_by_key(|m| m.seq);
        messages
    }

    /// Delete the session's messages and sequence counter.
    pub async fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        self.store
            .remove(&[list_key(session_id), seq_key(session_id)])
            .await
            .map(|_| ())
    }
}

fn list_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

fn seq_key(session_id: &str) -> String {
    format!("session-seq:{session_id}")
}
