//! End-to-end read-through caching over a real router: populate, revalidate,
//! invalidate on write, recompute.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use tower::ServiceExt;

use raffica::cache::{
    CACHE_OUTCOME_HEADER, CachePolicy, CacheState, InvalidationCoordinator, PolicyRegistry,
    ResponseCache, TagIndex, read_through_layer,
};
use raffica::store::{MemoryStore, StoreHandle};

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<HashMap<String, String>>>,
    invalidation: InvalidationCoordinator,
}

async fn get_project(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let name = state.db.lock().unwrap().get(&id).cloned();
    match name {
        Some(name) => (
            [(header::CONTENT_TYPE, "application/json")],
            format!("{{\"id\":\"{id}\",\"name\":\"{name}\"}}"),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn put_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> Response {
    state.db.lock().unwrap().insert(id.clone(), body);
    // invalidation runs after the write committed and before the response
    let report = state
        .invalidation
        .invalidate(&[format!("project:{id}")])
        .await;
    assert!(report.fully_applied());
    StatusCode::NO_CONTENT.into_response()
}

fn app() -> Router {
    let store = StoreHandle::new(Arc::new(MemoryStore::new()), Duration::from_millis(100));
    let policies = PolicyRegistry::builder(CachePolicy::new("misc", Duration::from_secs(30)))
        .route(
            "/projects/:id",
            CachePolicy::new("projects", Duration::from_secs(3600)).with_tags(["project:{id}"]),
        )
        .build();
    let cache_state = CacheState {
        enabled: true,
        max_body_bytes: 1024 * 1024,
        policies: Arc::new(policies),
        cache: ResponseCache::new(store.clone()),
        tags: TagIndex::new(store.clone()),
    };

    let mut db = HashMap::new();
    db.insert("p1".to_string(), "first".to_string());
    let app_state = AppState {
        db: Arc::new(Mutex::new(db)),
        invalidation: InvalidationCoordinator::new(store),
    };

    Router::new()
        .route("/projects/{id}", get(get_project).put(put_project))
        .layer(middleware::from_fn_with_state(
            cache_state,
            read_through_layer,
        ))
        .with_state(app_state)
}

async fn settle() {
    // allow the detached cache-population task to finish
    tokio::time::sleep(Duration::from_millis(5)).await;
}

fn get_request(etag: Option<&str>) -> Request<Body> {
    let mut builder = Request::get("/projects/p1");
    if let Some(etag) = etag {
        builder = builder.header(header::IF_NONE_MATCH, etag);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn cached_get_then_conditional_revalidation() {
    let app = app();

    let first = app.clone().oneshot(get_request(None)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[CACHE_OUTCOME_HEADER], "miss");
    assert_eq!(first.headers()[header::CACHE_CONTROL], "max-age=1800");
    let etag = first.headers()[header::ETAG].to_str().unwrap().to_string();
    let first_body = axum::body::to_bytes(first.into_body(), 1024).await.unwrap();
    assert_eq!(&first_body[..], b"{\"id\":\"p1\",\"name\":\"first\"}");
    settle().await;

    // cached replay for a client without a fingerprint
    let second = app.clone().oneshot(get_request(None)).await.unwrap();
    assert_eq!(second.headers()[CACHE_OUTCOME_HEADER], "hit");
    assert_eq!(second.headers()[header::CONTENT_TYPE], "application/json");
    let second_body = axum::body::to_bytes(second.into_body(), 1024).await.unwrap();
    assert_eq!(second_body, first_body);

    // revalidation for a client holding the current fingerprint
    let revalidated = app.oneshot(get_request(Some(&etag))).await.unwrap();
    assert_eq!(revalidated.status(), StatusCode::NOT_MODIFIED);
    let empty = axum::body::to_bytes(revalidated.into_body(), 1024).await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test(start_paused = true)]
async fn write_invalidates_and_next_get_recomputes() {
    let app = app();

    let first = app.clone().oneshot(get_request(None)).await.unwrap();
    let old_etag = first.headers()[header::ETAG].to_str().unwrap().to_string();
    settle().await;
    assert_eq!(
        app.clone()
            .oneshot(get_request(None))
            .await
            .unwrap()
            .headers()[CACHE_OUTCOME_HEADER],
        "hit"
    );

    let update = app
        .clone()
        .oneshot(
            Request::put("/projects/p1")
                .body(Body::from("renamed"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(update.status(), StatusCode::NO_CONTENT);

    // the stale entry is gone: the next read recomputes and re-fingerprints
    let fresh = app.clone().oneshot(get_request(None)).await.unwrap();
    assert_eq!(fresh.headers()[CACHE_OUTCOME_HEADER], "miss");
    let new_etag = fresh.headers()[header::ETAG].to_str().unwrap().to_string();
    assert_ne!(new_etag, old_etag);
    let body = axum::body::to_bytes(fresh.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"{\"id\":\"p1\",\"name\":\"renamed\"}");
    settle().await;

    // a stale client fingerprint no longer revalidates
    let stale_client = app.oneshot(get_request(Some(&old_etag))).await.unwrap();
    assert_eq!(stale_client.status(), StatusCode::OK);
    assert_eq!(stale_client.headers()[CACHE_OUTCOME_HEADER], "hit");
}

#[tokio::test(start_paused = true)]
async fn entries_expire_without_any_write() {
    let app = app();

    app.clone().oneshot(get_request(None)).await.unwrap();
    settle().await;
    assert_eq!(
        app.clone()
            .oneshot(get_request(None))
            .await
            .unwrap()
            .headers()[CACHE_OUTCOME_HEADER],
        "hit"
    );

    tokio::time::advance(Duration::from_secs(3601)).await;
    assert_eq!(
        app.oneshot(get_request(None)).await.unwrap().headers()[CACHE_OUTCOME_HEADER],
        "miss"
    );
}
