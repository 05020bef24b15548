//! API integration tests for tile retrieval and error handling.
//!
//! Tests verify:
//! - Tile rendering from a real GeoTIFF, including alpha and headers
//! - The EMPTY tile for tiles outside the raster
//! - Error cases (unknown source, missing file, bad coordinates, bad paths)
//! - Source listing, metadata, health and CORS

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use tower::ServiceExt;

use super::test_utils::{
    body_bytes, body_json, build_router, decode_png, fixture_dir, get, is_empty_tile,
    FIXTURE_COLOR,
};

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval_success() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router.oneshot(get("/tiles/ortho/5/10/10.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=86400"
    );
    assert_eq!(response.headers().get("x-cache").unwrap(), "MISS");

    let tile = decode_png(&body_bytes(response).await);
    assert_eq!(tile.dimensions(), (256, 256));

    // Left half of the raster is pure black, so transparent
    assert_eq!(tile.get_pixel(10, 128).0, [0, 0, 0, 0]);
    assert_eq!(tile.get_pixel(127, 0).0, [0, 0, 0, 0]);

    let [r, g, b] = FIXTURE_COLOR;
    assert_eq!(tile.get_pixel(128, 0).0, [r, g, b, 255]);
    assert_eq!(tile.get_pixel(255, 255).0, [r, g, b, 255]);
}

#[tokio::test]
async fn test_tile_without_extension() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router.oneshot(get("/tiles/ortho/5/10/10")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let tile = decode_png(&body_bytes(response).await);
    assert_eq!(tile.dimensions(), (256, 256));
}

#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let first = router
        .clone()
        .oneshot(get("/tiles/ortho/5/10/10.png"))
        .await
        .unwrap();
    assert_eq!(first.headers().get("x-cache").unwrap(), "MISS");
    let first_body = body_bytes(first).await;

    let second = router.oneshot(get("/tiles/ortho/5/10/10.png")).await.unwrap();
    assert_eq!(second.headers().get("x-cache").unwrap(), "HIT");
    assert_eq!(body_bytes(second).await, first_body);
}

#[tokio::test]
async fn test_zoomed_in_tile_inside_raster() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    // Top-right child of 5/10/10 lies entirely in the coloured half
    let response = router.oneshot(get("/tiles/ortho/6/21/20.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let tile = decode_png(&body_bytes(response).await);
    assert_eq!(tile.dimensions(), (256, 256));

    // The window edge may snap one source column into the black half
    let [r, g, b] = FIXTURE_COLOR;
    for y in (0..256).step_by(15) {
        for x in (16..256).step_by(15) {
            assert_eq!(tile.get_pixel(x, y).0, [r, g, b, 255], "({}, {})", x, y);
        }
    }
}

#[tokio::test]
async fn test_zoomed_out_tile_partial_placement() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    // 4/5/5 contains 5/10/10 as its top-left quadrant
    let response = router.oneshot(get("/tiles/ortho/4/5/5.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let tile = decode_png(&body_bytes(response).await);
    assert_eq!(tile.dimensions(), (256, 256));

    let [r, g, b] = FIXTURE_COLOR;
    assert_eq!(tile.get_pixel(100, 50).0, [r, g, b, 255]);
    // Outside the placement the canvas stays transparent
    assert_eq!(tile.get_pixel(200, 200)[3], 0);
    assert_eq!(tile.get_pixel(100, 200)[3], 0);
}

#[tokio::test]
async fn test_tile_outside_raster_is_empty() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router.oneshot(get("/tiles/ortho/5/0/0.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert!(is_empty_tile(&body_bytes(response).await));
}

#[tokio::test]
async fn test_tile_outside_grid_is_empty() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router.oneshot(get("/tiles/ortho/1/5/5.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(is_empty_tile(&body_bytes(response).await));
}

#[tokio::test]
async fn test_signed_or_oversized_coordinates_are_empty() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    for uri in [
        "/tiles/ortho/5/-1/10.png",
        "/tiles/ortho/5/10/-3.png",
        "/tiles/ortho/5/4294967296/0.png",
        "/tiles/ortho/5/0/99999999999999999999999.png",
    ] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
        assert_eq!(response.headers().get("x-cache").unwrap(), "MISS");
        assert!(is_empty_tile(&body_bytes(response).await), "{}", uri);
    }
}

#[tokio::test]
async fn test_negative_zoom_is_400() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router.oneshot(get("/tiles/ortho/-1/0/0.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_zoom");
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_unknown_source_is_404() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router.oneshot(get("/tiles/nowhere/5/10/10.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
    assert_eq!(json["status"], 404);
    assert!(json["message"].as_str().unwrap().contains("nowhere"));
}

#[tokio::test]
async fn test_missing_file_source_is_404() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router.oneshot(get("/tiles/ghost/5/10/10.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["error"], "source_unavailable");
}

#[tokio::test]
async fn test_non_integer_coordinates_are_400() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    for uri in [
        "/tiles/ortho/five/10/10.png",
        "/tiles/ortho/5/10/ten.png",
        "/tiles/ortho/5/10/10.jpg",
    ] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);

        let json = body_json(response).await;
        assert_eq!(json["error"], "invalid_coordinates", "{}", uri);
    }
}

#[tokio::test]
async fn test_zoom_above_limit_is_400() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router.oneshot(get("/tiles/ortho/31/0/0.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_zoom");
}

#[tokio::test]
async fn test_malformed_tile_path_is_400() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    for uri in ["/tiles/ortho/5/10", "/tiles/ortho/5/10/10/extra.png"] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);

        let json = body_json(response).await;
        assert_eq!(json["error"], "invalid_path", "{}", uri);
    }
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router.oneshot(get("/does/not/exist")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
}

// =============================================================================
// Metadata Endpoints
// =============================================================================

#[tokio::test]
async fn test_health() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sources"], serde_json::json!(["ghost", "ortho"]));
    assert_eq!(json["cache_size"], 0);
    assert_eq!(json["opened_sources"], 0);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_sources_listing() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router.oneshot(get("/sources")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["sources"], serde_json::json!(["ghost", "ortho"]));
    assert_eq!(json["tileUrl"], "/tiles/{source}/{z}/{x}/{y}.png");
}

#[tokio::test]
async fn test_source_metadata() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router.oneshot(get("/sources/ortho")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["source"], "ortho");
    assert_eq!(json["width"], 64);
    assert_eq!(json["height"], 64);
    assert_eq!(json["bands"], 3);
    assert_eq!(json["tileUrl"], "/tiles/ortho/{z}/{x}/{y}.png");

    let bbox = cog_tile_server::tile_bbox(5, 10, 10);
    let west = json["bounds"]["west"].as_f64().unwrap();
    let north = json["bounds"]["north"].as_f64().unwrap();
    assert!((west - bbox.west).abs() < 1e-6);
    assert!((north - bbox.north).abs() < 1e-6);
}

#[tokio::test]
async fn test_source_metadata_errors() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let response = router
        .clone()
        .oneshot(get("/sources/nowhere"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router.oneshot(get("/sources/ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "source_unavailable");
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn test_cors_preflight() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/tiles/ortho/5/10/10.png")
        .header("origin", "https://map.example.com")
        .header("access-control-request-method", "GET")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_cors_header_on_tile() {
    let dir = fixture_dir();
    let router = build_router(&dir);

    let request = Request::builder()
        .uri("/tiles/ortho/5/10/10.png")
        .header("origin", "https://map.example.com")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}
