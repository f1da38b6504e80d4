use async_trait::async_trait;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use mg_api::bundle::{BundleSource, FetchedBundle};
use mg_api::config::AppConfig;
use mg_api::error::FetchError;
use mg_api::server::routes::build_router;
use mg_api::server::state::AppState;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

const BUNDLE: &str = concat!(
    "var Rr;Rr=(t=>(t.Common=\"Common\",t.Uncommon=\"Uncommon\",t.Rare=\"Rare\",t))(Rr||{});",
    "const Pt={Worm:{coinsToFullyReplenishHunger:500,innateAbilityWeights:{},hoursToMature:12,rarity:Rr.Common}};",
);

struct StaticBundle;

#[async_trait]
impl BundleSource for StaticBundle {
    async fn fetch_bundle(&self) -> Result<FetchedBundle, FetchError> {
        Ok(FetchedBundle {
            index_url: "https://game.test/assets/index-1.js".into(),
            main_url: "https://game.test/assets/main-1.js".into(),
            text: BUNDLE.into(),
        })
    }
}

fn config(root: &Path, max_requests: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.data_dir = root.join("data");
    config.sprites.export_dir = root.join("sprites");
    config.sprites.base_url = "http://api.test".into();
    config.websocket.enabled = false;
    config.rate_limit.max_requests = max_requests;
    config
}

fn app(root: &Path, max_requests: u32) -> Router {
    let state = AppState::with_source(config(root, max_requests), reqwest::Client::new(), Arc::new(StaticBundle));
    build_router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), 100);

    let response = app.clone().oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"alive": true}));

    let response = app.clone().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cache"]["hasBundleCached"], false);
    assert_eq!(body["websocket"]["connected"], false);
    assert_eq!(body["spriteSyncRunning"], false);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(dir.path(), 100).oneshot(get("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "Endpoint not found");
}

#[tokio::test]
async fn test_index_lists_endpoints_with_rate_headers() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(dir.path(), 100).oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["ratelimit-limit"], "100");
    assert_eq!(response.headers()["ratelimit-remaining"], "99");
    let body = json_body(response).await;
    assert_eq!(body["endpoints"]["data"], "/data");
}

#[tokio::test]
async fn test_category_data_with_etag_revalidation() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), 100);

    let response = app.clone().oneshot(get("/data/pets")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();
    assert!(etag.starts_with("W/\""));
    assert!(response.headers()[header::CACHE_CONTROL].to_str().unwrap().contains("max-age=300"));
    let body = json_body(response).await;
    assert_eq!(body["Worm"]["rarity"], "Common");
    assert_eq!(body["Worm"]["hoursToMature"], 12);

    let revalidate = Request::builder()
        .uri("/data/pets")
        .header(header::IF_NONE_MATCH, etag.as_str())
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(revalidate).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    let response = app.clone().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_category_data_as_csv() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(dir.path(), 100).oneshot(get("/data/pets?format=csv")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
    let csv = text_body(response).await;
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("id,coinsToFullyReplenishHunger,hoursToMature,rarity"));
    assert_eq!(lines.next(), Some("Worm,500,12,Common"));
}

#[tokio::test]
async fn test_bad_category_and_format() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), 100);

    let response = app.clone().oneshot(get("/data/hats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.clone().oneshot(get("/data/pets?format=xml")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(get("/data/abilities")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "EXTRACTION_FAILED");
    assert!(body["error"]["details"]["originalMessage"].as_str().unwrap().contains("abilities"));
}

#[tokio::test]
async fn test_sprite_files_are_served_from_export_dir() {
    let dir = tempfile::tempdir().unwrap();
    let seeds = dir.path().join("sprites/sprite/seeds");
    std::fs::create_dir_all(&seeds).unwrap();
    std::fs::write(seeds.join("Carrot.png"), b"\x89PNG fake").unwrap();
    let app = app(dir.path(), 100);

    let response = app.clone().oneshot(get("/assets/sprites/seeds/Carrot.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=86400");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"\x89PNG fake");

    let response = app.clone().oneshot(get("/assets/sprites/seeds/Tomato.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.clone().oneshot(get("/assets/sprites/hats/Carrot.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(get("/assets/sprites/seeds/Carrot.jpg")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sprite_category_listing() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(dir.path(), 100).oneshot(get("/assets/sprites")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["baseUrl"], "http://api.test");
    assert!(body["categories"].as_array().unwrap().contains(&json!("tallPlants")));
}

#[tokio::test]
async fn test_live_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), 100);

    let response = app.clone().oneshot(get("/live")).await.unwrap();
    assert_eq!(json_body(response).await, json!({"weather": null, "shops": null}));

    let response = app.oneshot(get("/live/weather")).await.unwrap();
    assert_eq!(json_body(response).await, json!({"weather": null}));
}

#[tokio::test]
async fn test_sse_stream_opens() {
    let dir = tempfile::tempdir().unwrap();
    let response = app(dir.path(), 100).oneshot(get("/live/weather/stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));
}

#[tokio::test]
async fn test_rate_limit_rejects_then_health_still_answers() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), 2);

    for _ in 0..2 {
        let response = app.clone().oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(json_body(response).await["error"]["code"], "RATE_LIMITED");

    let response = app.oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Game origin serving one version whose manifest carries cosmetic and audio bundles.
async fn asset_origin() -> String {
    let manifest = json!({
        "bundles": [
            {"name": "cosmetic", "assets": [{"src": ["cosmetic/Hat_Straw.png", "cosmetic/Shirt_Blue.png"]}]},
            {"name": "audio", "assets": [{"src": [
                "audio/music/Garden.mp3", "audio/ambience/Garden.mp3", "audio/sfx/sfx.mp3", "audio/sfx/sfx.json"
            ]}]}
        ]
    });
    let origin = Router::new()
        .route("/platform/v1/version", axum::routing::get(|| async { axum::Json(json!({"version": "v9"})) }))
        .route(
            "/version/v9/assets/manifest.json",
            axum::routing::get(move || {
                let manifest = manifest.clone();
                async move { axum::Json(manifest) }
            }),
        )
        .route(
            "/version/v9/assets/audio/sfx/sfx.json",
            axum::routing::get(|| async { axum::Json(json!({"Pop": [0.5, 0.75], "Bad": "x"})) }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, origin).await });
    format!("http://{}", addr)
}

fn app_with_origin(root: &Path, origin: &str) -> Router {
    let mut config = config(root, 100);
    config.game.origin = origin.to_string();
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let state = AppState::with_source(config, client, Arc::new(StaticBundle));
    build_router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
}

#[tokio::test]
async fn test_cosmetics_listing_follows_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let origin = asset_origin().await;
    let app = app_with_origin(dir.path(), &origin);
    let base = format!("{}/version/v9/assets/", origin);

    let response = app.clone().oneshot(get("/assets/cosmetics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["baseUrl"], base);
    assert_eq!(body["count"], 2);
    assert_eq!(
        body["categories"][0],
        json!({"cat": "Hat", "items": [{"id": "Hat_Straw", "name": "Straw", "url": format!("{}cosmetic/Hat_Straw.png", base)}]})
    );

    let body = json_body(app.oneshot(get("/assets/cosmetics?full=1")).await.unwrap()).await;
    assert_eq!(body["categories"][1]["items"][0]["src"], "cosmetic/Shirt_Blue.png");
}

#[tokio::test]
async fn test_audio_listing_pairs_themes_and_times_sfx() {
    let dir = tempfile::tempdir().unwrap();
    let origin = asset_origin().await;
    let base = format!("{}/version/v9/assets/", origin);

    let response = app_with_origin(dir.path(), &origin).oneshot(get("/assets/audios")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(
        body["themes"],
        json!([{
            "name": "Garden",
            "ambience": format!("{}audio/ambience/Garden.mp3", base),
            "music": format!("{}audio/music/Garden.mp3", base)
        }])
    );
    assert_eq!(body["sfx"]["url"], format!("{}audio/sfx/sfx.mp3", base));
    assert_eq!(body["sfx"]["items"], json!([{"name": "Pop", "start": 0.5, "end": 0.75, "duration": 0.25}]));
}
