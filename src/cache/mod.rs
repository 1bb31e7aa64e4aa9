//! Response caching and invalidation.
//!
//! Four pieces cooperate over the shared TTL store:
//!
//! - **keys**: deterministic cache key derivation
//! - **policy**: route shape → `{namespace, ttl, tags}` registry
//! - **response**: serialized response entries with content fingerprints
//! - **tags**: tag → key-set index and the invalidation coordinator
//!
//! `middleware` wraps the four into a read-through decorator for axum
//! routers; write handlers call the coordinator after their write commits.

pub mod keys;
mod middleware;
mod policy;
mod response;
mod tags;

pub use keys::{ANONYMOUS, ParamSet, response_key};
pub use middleware::{CACHE_OUTCOME_HEADER, CacheState, read_through_layer};
pub use policy::{CachePolicy, PolicyRegistry, PolicyRegistryBuilder, Resolution, TagTemplate};
pub use response::{CacheEntry, Negotiation, ResponseCache, fingerprint};
pub use tags::{InvalidationCoordinator, InvalidationReport, TagIndex};
