use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{ClientIpConfig, CorsConfig};
use crate::counter::CounterService;

use super::handlers::{
    apply_like, get_post_stats, health_check, list_posts, record_view, AppState,
};

pub fn create_api_router(
    counter: Arc<CounterService>,
    client_ip: ClientIpConfig,
    cors: &CorsConfig,
) -> Router {
    let state = Arc::new(AppState { counter, client_ip });

    let api_routes = Router::new()
        .route("/views", post(record_view))
        .route("/likes", post(apply_like))
        .route("/posts", get(list_posts))
        .route("/posts/{slug}", get(get_post_stats))
        .with_state(state);

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes);

    match cors_layer(cors) {
        Some(cors) => router.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        ),
        None => router.layer(TraceLayer::new_for_http()),
    }
}

fn cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{origin}'");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE]),
    )
}
