//! Read-through response cache middleware.
//!
//! Wraps read handlers with "serve from cache or compute": conditional-GET
//! short-circuiting on the stored fingerprint, cached replay with the
//! original content type, and population on miss. Population runs detached
//! from the request so an aborted client still pays forward to future ones.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::auth::Principal;

use super::{
    keys::{self, ParamSet},
    policy::PolicyRegistry,
    response::{Negotiation, ResponseCache, fingerprint},
    tags::TagIndex,
};

/// Header reporting whether the response came from the cache.
pub const CACHE_OUTCOME_HEADER: &str = "x-cache";

/// Shared state for the read-through layer.
#[derive(Clone)]
pub struct CacheState {
    pub enabled: bool,
    /// Responses larger than this pass through uncached.
    pub max_body_bytes: usize,
    pub policies: Arc<PolicyRegistry>,
    pub cache: ResponseCache,
    pub tags: TagIndex,
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn read_through_layer(
    State(state): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    let resolution = state.policies.resolve(request.uri().path());
    let is_get = request.method() == Method::GET;
    if !is_get && !resolution.policy.cache_mutating {
        return next.run(request).await;
    }

    let principal = request
        .extensions()
        .get::<Principal>()
        .map(|p| p.id.clone());
    let mut params = ParamSet::from_query_str(request.uri().query().unwrap_or(""))
        .with_path(resolution.path_params.clone());

    // The request body joins the key hash only for opted-in mutating routes.
    let request = if is_get {
        request
    } else {
        let (parts, body) = request.into_parts();
        let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
        };
        params = params.with_body(body_value(&bytes));
        Request::from_parts(parts, Body::from(bytes))
    };

    let route = format!("{}:{}", request.method(), resolution.route);
    let key = keys::response_key(
        &resolution.policy.namespace,
        principal.as_deref(),
        &route,
        &params,
    );
    let ttl = resolution.policy.ttl;
    let client_fingerprint = client_fingerprint(request.headers());

    match state.cache.negotiate(&key, client_fingerprint.as_deref()).await {
        Negotiation::NotModified { fingerprint } => {
            debug!(outcome = "not_modified", "client copy is current");
            return revalidated_response(&fingerprint, ttl);
        }
        Negotiation::Hit { entry } => {
            debug!(outcome = "hit", "serving cached response");
            return hit_response(entry.payload, entry.content_type, &entry.fingerprint, ttl);
        }
        Negotiation::Miss => {}
    }

    debug!(outcome = "miss", "executing handler");
    let response = next.run(request).await;

    if response.status() != StatusCode::OK {
        return response;
    }
    if content_length_over(response.headers(), state.max_body_bytes) {
        debug!(key, "response declared larger than cacheable cap, passing through");
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(key, error = %error, "response body could not be buffered");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let new_fingerprint = fingerprint(&bytes);
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cache = state.cache.clone();
    let tag_index = state.tags.clone();
    let rendered_tags: Vec<String> = resolution
        .policy
        .tags
        .iter()
        .map(|t| t.render(&resolution.path_params))
        .collect();
    let task_key = key.clone();
    let task_payload = bytes.clone();
    tokio::spawn(async move {
        if cache
            .store(&task_key, task_payload, content_type, ttl)
            .await
            .is_some()
        {
            for tag in &rendered_tags {
                tag_index.bind(tag, &task_key, ttl).await;
            }
        }
    });

    apply_cache_headers(&mut parts.headers, &new_fingerprint, ttl, "miss");
    Response::from_parts(parts, Body::from(bytes))
}

/// First entry of `If-None-Match`, unquoted, weak prefix dropped.
fn client_fingerprint(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::IF_NONE_MATCH)?.to_str().ok()?;
    let first = raw.split(',').next()?.trim();
    let first = first.strip_prefix("W/").unwrap_or(first);
    Some(first.trim_matches('"').to_string())
}

fn body_value(bytes: &Bytes) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn content_length_over(headers: &HeaderMap, cap: usize) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .is_some_and(|length| length > cap)
}

fn apply_cache_headers(headers: &mut HeaderMap, etag: &str, ttl: Duration, outcome: &'static str) {
    if let Ok(value) = HeaderValue::from_str(&format!("\"{etag}\"")) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("max-age={}", ttl.as_secs() / 2)) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    headers.insert(CACHE_OUTCOME_HEADER, HeaderValue::from_static(outcome));
}

fn revalidated_response(etag: &str, ttl: Duration) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    apply_cache_headers(response.headers_mut(), etag, ttl, "hit");
    response
}

fn hit_response(
    payload: Bytes,
    content_type: Option<String>,
    etag: &str,
    ttl: Duration,
) -> Response {
    let mut response = Response::new(Body::from(payload));
    if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    apply_cache_headers(response.headers_mut(), etag, ttl, "hit");
    response
}
