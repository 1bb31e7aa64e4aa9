//! Raffica
//!
//! A request-scoped caching and bounded-log layer for APIs that sit in front
//! of a durable data store and an external completion provider. All mutable
//! state lives in one shared TTL store, so the serving layer scales out
//! without holding anything in process memory.
//!
//! What lives here:
//!
//! - **store**: the TTL key/value/list/set contract, an in-memory
//!   implementation, and the injected client handle with bounded timeouts
//! - **cache**: key derivation, route policies, the fingerprinted response
//!   cache, tag-indexed invalidation, and the axum read-through layer
//! - **session**: capped per-conversation message logs
//! - **limit**: fixed-window rate limiting
//! - **auth**: request principal and the revoked-credential set
//! - **chat**: the gate → context → complete → record flow
//!
//! ## Configuration
//!
//! Settings layer an optional `raffica.toml` under `RAFFICA__*` environment
//! overrides:
//!
//! ```toml
//! [cache]
//! enabled = true
//! default_ttl_seconds = 60
//!
//! [session]
//! max_messages = 100
//! context_window = 10
//!
//! [chat_rate_limit]
//! window_seconds = 60
//! max_requests = 10
//! ```
//!
//! Store outages degrade rather than fail: reads recompute, appends drop
//! with a warning, rate checks allow. The one exception is the revocation
//! set, which denies when it cannot be read.

pub mod auth;
pub mod cache;
pub mod chat;
pub mod config;
pub mod limit;
pub mod session;
pub mod store;
pub mod telemetry;
