//! Cache key derivation.
//!
//! A cache key is a pure function of (namespace, principal, route shape,
//! request parameters). Parameters are serialized canonically before hashing
//! so key order or whitespace differences never produce distinct keys.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Principal label used when no authenticated principal is present.
pub const ANONYMOUS: &str = "anonymous";

/// Request parameters that participate in key derivation.
///
/// `body` is populated only when the resolved policy opts into caching
/// non-GET responses; for the default GET-only policies it stays `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    pub query: BTreeMap<String, String>,
    pub path: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl ParamSet {
    /// Parse a raw query string (`a=1&b=2`) into sorted pairs.
    ///
    /// Duplicate names keep the last value, matching how the routing layer
    /// hands parameters to read handlers.
    pub fn from_query_str(raw: &str) -> Self {
        let mut query = BTreeMap::new();
        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((name, value)) => query.insert(name.to_string(), value.to_string()),
                None => query.insert(pair.to_string(), String::new()),
            };
        }
        Self {
            query,
            ..Self::default()
        }
    }

    pub fn with_path(mut self, path: BTreeMap<String, String>) -> Self {
        self.path = path;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Derive the response-cache key for one logical request.
///
/// Shape: `response-cache:{namespace}:{principal}:{route}:{paramHash}`.
pub fn response_key(
    namespace: &str,
    principal: Option<&str>,
    route: &str,
    params: &ParamSet,
) -> String {
    let principal = principal.unwrap_or(ANONYMOUS);
    let hash = param_hash(params);
    format!("response-cache:{namespace}:{principal}:{route}:{hash}")
}

/// Store key holding the key-set bound to an invalidation tag.
pub fn tag_key(tag: &str) -> String {
    format!("cache-tags:{tag}")
}

fn param_hash(params: &ParamSet) -> String {
    let mut root = serde_json::Map::new();
    root.insert(
        "query".to_string(),
        Value::Object(
            params
                .query
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        ),
    );
    root.insert(
        "path".to_string(),
        Value::Object(
            params
                .path
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        ),
    );
    if let Some(body) = &params.body {
        root.insert("body".to_string(), body.clone());
    }

    let mut canonical = String::new();
    write_canonical(&Value::Object(root), &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Write `value` as compact JSON with object keys in sorted order, at every
/// depth. `serde_json`'s map ordering is representation-dependent; the key
/// derivation must not be.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by_key(|(k, _)| k.as_str());
            out.push('{');
            for (i, (key, inner)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(inner, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
