use mg_api::*;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = config::AppConfig::load()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("mg-api v{}", env!("CARGO_PKG_VERSION"));

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "export" => return run_export(&config, args.get(2).map(|s| s.as_str())).await,
            "sync" => return run_sync(config, args[2..].iter().any(|a| a == "--force")).await,
            other => {
                eprintln!("Unknown command: {}", other);
                eprintln!("Usage:");
                eprintln!("  mg-api                 Start the HTTP server and the live feed");
                eprintln!("  mg-api export [dir]    Export every sprite of the current game version");
                eprintln!("  mg-api sync [--force]  Run one sprite sync against the stored state");
                std::process::exit(1);
            }
        }
    }

    serve(config).await
}

async fn serve(config: config::AppConfig) -> Result<()> {
    let state = server::state::AppState::new(config)?;

    if state.config.websocket.enabled {
        ws::SpriteSyncListener::new(state.sprite_sync.clone(), state.sprite_index.clone()).spawn(&state.connection);
        let connection = state.connection.clone();
        tokio::spawn(async move { connection.run().await });
    } else {
        tracing::warn!("Live feed disabled (WS_ENABLED=false)");
    }

    let bundles = state.bundles.clone();
    tokio::spawn(async move {
        match bundles.get_bundle().await {
            Ok(bundle) => tracing::info!(url = %bundle.url, "Bundle warmed ({} bytes)", bundle.text.len()),
            Err(e) => tracing::warn!("Initial bundle fetch failed: {}", e),
        }
    });

    let connection = state.connection.clone();
    server::run(state).await?;
    connection.stop();
    Ok(())
}

async fn run_export(config: &config::AppConfig, out_dir: Option<&str>) -> Result<()> {
    let out_dir = out_dir.map(PathBuf::from).unwrap_or_else(|| config.sprites.export_dir.clone());
    let client = server::state::http_client()?;

    let versions = game::VersionClient::new(client.clone(), &config.game.origin);
    let base_url = versions.asset_base_url().await.context("resolving asset base URL")?;
    tracing::info!(base_url = %base_url, out_dir = %out_dir.display(), "Exporting all sprites");

    let catalogs = atlas::CatalogCache::new(atlas::ManifestLoader::new(client.clone()));
    let catalog = catalogs.get(&base_url).await.context("loading sprite catalog")?;
    let report = atlas::export::export_sprites(&client, &catalog, atlas::export::ExportOptions::full(&out_dir)).await?;

    tracing::info!(
        "Export complete: {} sprites from {} atlases into {}",
        report.exported,
        report.atlases,
        report.out_dir.display()
    );
    Ok(())
}

async fn run_sync(config: config::AppConfig, force: bool) -> Result<()> {
    let state = server::state::AppState::new(config)?;
    match state.sprite_sync.sync(force).await {
        Some(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if outcome.is_error() {
                std::process::exit(1);
            }
        }
        None => tracing::warn!("Another sync is already running"),
    }
    Ok(())
}
