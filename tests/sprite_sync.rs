use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use image::{ImageFormat, Rgba, RgbaImage};
use mg_api::atlas::sync::SkipReason;
use mg_api::atlas::{CatalogCache, ManifestLoader, SpriteSync, SyncOutcome};
use mg_api::game::{StateStore, VersionClient};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Static game origin: version endpoint plus versioned asset files, with every
/// requested path recorded.
#[derive(Clone, Default)]
struct FakeGame {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    hits: Arc<Mutex<Vec<String>>>,
    version_delay: Arc<Mutex<Duration>>,
}

impl FakeGame {
    fn put(&self, path: &str, body: Vec<u8>) {
        self.files.lock().unwrap().insert(path.to_string(), body);
    }

    fn put_json(&self, path: &str, body: Value) {
        self.put(path, body.to_string().into_bytes());
    }

    fn set_version(&self, version: &str) {
        self.put_json("/platform/v1/version", json!({ "version": version }));
    }

    fn hit(&self, path: &str) -> bool {
        self.hits.lock().unwrap().iter().any(|p| p == path)
    }
}

async fn serve_file(State(game): State<FakeGame>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    game.hits.lock().unwrap().push(path.clone());
    if path == "/platform/v1/version" {
        let delay = *game.version_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
    }
    let body = game.files.lock().unwrap().get(&path).cloned();
    match body {
        Some(body) => body.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 255]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn plants_atlas() -> Value {
    json!({
        "frames": {
            "sprite/plant/Carrot": {"frame": {"x": 0, "y": 0, "w": 2, "h": 2}},
            "sprite/plant/Wheat": {"frame": {"x": 2, "y": 0, "w": 2, "h": 2}}
        },
        "meta": {"image": "plants.png"}
    })
}

/// Publishes a version whose default bundle holds the plants atlas plus `extra`
/// manifest entries.
fn publish(game: &FakeGame, version: &str, extra: &[&str]) {
    let base = format!("/version/{}/assets", version);
    let mut src = vec!["sprites/plants.json", "sprites/plants.webp"];
    src.extend_from_slice(extra);
    game.put_json(
        &format!("{}/manifest.json", base),
        json!({"bundles": [{"name": "default", "assets": [{"src": src}]}]}),
    );
    game.put_json(&format!("{}/sprites/plants.json", base), plants_atlas());
    game.put(&format!("{}/sprites/plants.png", base), png(4, 2));
    game.set_version(version);
}

struct Harness {
    game: FakeGame,
    sync: SpriteSync,
    data: TempDir,
    out: TempDir,
}

async fn harness() -> Harness {
    let game = FakeGame::default();
    let app = Router::new().fallback(serve_file).with_state(game.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await });

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let sync = SpriteSync::new(
        VersionClient::new(client.clone(), &origin),
        StateStore::new(data.path()),
        CatalogCache::new(ManifestLoader::new(client)),
        out.path(),
    );
    Harness { game, sync, data, out }
}

fn exported(out: &Path, cat: &str, name: &str) -> bool {
    out.join("sprite").join(cat).join(format!("{}.png", name)).is_file()
}

#[tokio::test]
async fn test_unchanged_version_skips_without_touching_assets() {
    let h = harness().await;
    publish(&h.game, "v1", &[]);
    h.sync.store().save_version("v1").await.unwrap();

    let outcome = h.sync.sync(false).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Skipped { reason: SkipReason::VersionUnchanged, version_updated: false });
    assert!(!h.game.hit("/version/v1/assets/manifest.json"));
    assert!(!h.data.path().join("atlases.json").exists());
}

#[tokio::test]
async fn test_first_sync_exports_frames_then_persists_state() {
    let h = harness().await;
    publish(&h.game, "v1", &[]);

    let outcome = h.sync.sync(false).await.unwrap();
    let SyncOutcome::Success { exported: count, added, modified, removed, full_export, .. } = outcome else {
        panic!("expected success, got {:?}", outcome);
    };
    assert_eq!((count, added, modified, removed, full_export), (2, 2, 0, 0, false));
    assert!(exported(h.out.path(), "plants", "Carrot"));
    assert!(exported(h.out.path(), "plants", "Wheat"));

    assert_eq!(h.sync.store().load_version().await.unwrap().as_deref(), Some("v1"));
    let stored = h.sync.store().load_atlases().await.unwrap();
    assert_eq!(stored.keys().collect::<Vec<_>>(), ["sprites/plants.json"]);
    assert!(!h.sync.is_running());
}

#[tokio::test]
async fn test_identical_atlases_only_record_the_new_version() {
    let h = harness().await;
    publish(&h.game, "v1", &[]);
    assert!(h.sync.sync(false).await.unwrap().is_success());
    let atlases_before = std::fs::read_to_string(h.data.path().join("atlases.json")).unwrap();

    publish(&h.game, "v2", &[]);
    h.sync.versions().invalidate();
    let outcome = h.sync.sync(false).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Skipped { reason: SkipReason::NoSpriteChanges, version_updated: true });
    assert_eq!(h.sync.store().load_version().await.unwrap().as_deref(), Some("v2"));
    assert_eq!(std::fs::read_to_string(h.data.path().join("atlases.json")).unwrap(), atlases_before);
    assert!(!h.game.hit("/version/v2/assets/sprites/plants.png"));
}

#[tokio::test]
async fn test_missing_manifest_is_an_error_and_saves_nothing() {
    let h = harness().await;
    h.game.set_version("v1");

    let outcome = h.sync.sync(false).await.unwrap();
    let SyncOutcome::Error { message } = &outcome else {
        panic!("expected error, got {:?}", outcome);
    };
    assert!(message.contains("manifest"), "{}", message);
    assert_eq!(h.sync.store().load_version().await.unwrap(), None);
    assert!(h.sync.store().load_atlases().await.unwrap().is_empty());
    assert!(!h.sync.is_running());
}

#[tokio::test]
async fn test_unreachable_atlas_json_is_skipped() {
    let h = harness().await;
    // only the image is listed; its guessed JSON companion does not exist
    publish(&h.game, "v1", &["sprites/pets.webp"]);

    let outcome = h.sync.sync(false).await.unwrap();
    assert!(outcome.is_success(), "{:?}", outcome);
    assert!(h.game.hit("/version/v1/assets/sprites/pets.json"));

    let stored = h.sync.store().load_atlases().await.unwrap();
    assert!(stored.contains_key("sprites/plants.json"));
    assert!(!stored.contains_key("sprites/pets.json"));
}

#[tokio::test]
async fn test_failed_export_leaves_state_unsaved() {
    let h = harness().await;
    publish(&h.game, "v1", &["sprites/pets.json"]);
    // the pets atlas image is never served
    h.game.put_json(
        "/version/v1/assets/sprites/pets.json",
        json!({
            "frames": {"sprite/pet/Bee": {"frame": {"x": 0, "y": 0, "w": 2, "h": 2}}},
            "meta": {"image": "pets.png"}
        }),
    );

    let outcome = h.sync.sync(false).await.unwrap();
    assert!(outcome.is_error(), "{:?}", outcome);
    assert_eq!(h.sync.store().load_version().await.unwrap(), None);
    assert!(h.sync.store().load_atlases().await.unwrap().is_empty());
    // the healthy atlas finished before the error was reported
    assert!(exported(h.out.path(), "plants", "Carrot"));
    assert!(!exported(h.out.path(), "pets", "Bee"));
}

#[tokio::test]
async fn test_second_sync_while_running_is_ignored() {
    let h = harness().await;
    publish(&h.game, "v1", &[]);
    *h.game.version_delay.lock().unwrap() = Duration::from_millis(300);

    let (first, second) = tokio::join!(h.sync.sync(false), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.sync.sync(false).await
    });

    assert!(first.is_some_and(|o| o.is_success()));
    assert!(second.is_none());
    assert!(!h.sync.is_running());
}
