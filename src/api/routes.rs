use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::LinkService;

use super::handlers::{
    create_url, get_analytics, health_check, list_urls, list_urls_by_tag, AppState,
};

pub fn create_api_router(service: Arc<LinkService>) -> Router {
    let state = Arc::new(AppState { service });

    let url_routes = Router::new()
        .route("/urls", get(list_urls).post(create_url))
        .route("/urls/tags/{tag}", get(list_urls_by_tag))
        .route("/urls/{code}/analytics", get(get_analytics))
        .with_state(state);

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .merge(url_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
