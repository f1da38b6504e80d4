use super::handlers;
use super::rate_limit::{rate_limit_middleware, stream_rate_limit_middleware};
use super::state::AppState;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let stream_limit = || middleware::from_fn_with_state(state.clone(), stream_rate_limit_middleware);

    let health_router = Router::new()
        .route("/", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/live", get(handlers::health::live));

    let data_router = Router::new()
        .route("/", get(handlers::data::get_all))
        .route("/{category}", get(handlers::data::get_category));

    let live_router = Router::new()
        .route("/", get(handlers::live::snapshot))
        .route("/weather", get(handlers::live::weather))
        .route("/shops", get(handlers::live::shops))
        .route("/stream", get(handlers::live::stream_all).layer(stream_limit()))
        .route("/weather/stream", get(handlers::live::stream_weather).layer(stream_limit()))
        .route("/shops/stream", get(handlers::live::stream_shops).layer(stream_limit()));

    let assets_router = Router::new()
        .route("/sprite-data", get(handlers::assets::sprite_data))
        .route("/cosmetics", get(handlers::assets::cosmetics))
        .route("/audios", get(handlers::assets::audios))
        .route("/sprites", get(handlers::assets::list_sprite_categories))
        .route("/sprites/{category}/{name}", get(handlers::assets::serve_sprite));

    let admin_router = Router::new().route("/sprites/sync", post(handlers::admin::sync_sprites));

    let api_router = Router::new()
        .route("/", get(handlers::index::root))
        .nest("/data", data_router)
        .nest("/live", live_router)
        .nest("/assets", assets_router)
        .nest("/admin", admin_router)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware));

    // health checks stay outside the rate limit
    Router::new()
        .nest("/health", health_router)
        .merge(api_router)
        .fallback(handlers::index::not_found)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
