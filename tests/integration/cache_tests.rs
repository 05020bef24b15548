//! Cache effectiveness integration tests.
//!
//! Tests verify:
//! - Rendered tiles (including EMPTY tiles) are cached, off-grid tiles are not
//! - The cache stays within its configured entry bound
//! - Concurrent requests for one tile all succeed with identical bytes

use std::num::NonZeroUsize;

use axum::http::StatusCode;
use tower::ServiceExt;

use cog_tile_server::TileServiceOptions;

use super::test_utils::{
    body_bytes, body_json, build_router, build_router_with_options, fixture_dir, get,
};

async fn cache_size(router: &axum::Router) -> u64 {
    let response = router.clone().oneshot(get("/health")).await.unwrap();
    body_json(response).await["cache_size"].as_u64().unwrap()
}

#[tokio::test]
async fn test_rendered_and_empty_tiles_are_cached() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    assert_eq!(cache_size(&router).await, 0);

    for uri in ["/tiles/ortho/5/10/10.png", "/tiles/ortho/5/0/0.png"] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-cache").unwrap(), "MISS");
    }
    assert_eq!(cache_size(&router).await, 2);

    // EMPTY tiles are served from the cache on repeat
    let response = router
        .clone()
        .oneshot(get("/tiles/ortho/5/0/0.png"))
        .await
        .unwrap();
    assert_eq!(response.headers().get("x-cache").unwrap(), "HIT");
    assert_eq!(cache_size(&router).await, 2);
}

#[tokio::test]
async fn test_errors_are_not_cached() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    for uri in [
        "/tiles/nowhere/5/10/10.png",
        "/tiles/ghost/5/10/10.png",
        "/tiles/ortho/31/0/0.png",
    ] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_ne!(response.status(), StatusCode::OK, "{}", uri);
    }

    assert_eq!(cache_size(&router).await, 0);
}

#[tokio::test]
async fn test_off_grid_tiles_are_not_cached() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    for uri in ["/tiles/ortho/1/5/5.png", "/tiles/ortho/5/-1/0.png"] {
        for _ in 0..2 {
            let response = router.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
            assert_eq!(response.headers().get("x-cache").unwrap(), "MISS");
        }
    }

    assert_eq!(cache_size(&router).await, 0);
}

#[tokio::test]
async fn test_cache_is_bounded() {
    let dir = fixture_dir();
    let options = TileServiceOptions {
        cache_tiles: NonZeroUsize::new(2).unwrap(),
        ..TileServiceOptions::default()
    };
    let router = build_router_with_options(&dir, options);

    for x in 0..5 {
        let uri = format!("/tiles/ortho/3/{}/0.png", x);
        let response = router.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(cache_size(&router).await, 2);

    // The oldest entry was evicted and renders again
    let response = router
        .clone()
        .oneshot(get("/tiles/ortho/3/0/0.png"))
        .await
        .unwrap();
    assert_eq!(response.headers().get("x-cache").unwrap(), "MISS");

    // The most recent one survived
    let response = router
        .clone()
        .oneshot(get("/tiles/ortho/3/4/0.png"))
        .await
        .unwrap();
    assert_eq!(response.headers().get("x-cache").unwrap(), "HIT");
}

#[tokio::test]
async fn test_concurrent_requests_same_tile() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let router = router.clone();
            tokio::spawn(async move {
                let response = router
                    .oneshot(get("/tiles/ortho/5/10/10.png"))
                    .await
                    .unwrap();
                assert_eq!(response.status(), StatusCode::OK);
                body_bytes(response).await
            })
        })
        .collect();

    let mut bodies = Vec::new();
    for handle in handles {
        bodies.push(handle.await.unwrap());
    }

    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(cache_size(&router).await, 1);
}
