use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::AnalyticsConfig;
use crate::service::LinkService;

use super::handlers::{health_check, redirect_url, RedirectState};

/// Router for the public redirect listener. Needs to be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_redirect_router(
    service: Arc<LinkService>,
    analytics_config: AnalyticsConfig,
) -> Router {
    let state = Arc::new(RedirectState {
        service,
        analytics_config,
    });

    Router::new()
        .route("/", get(health_check))
        .route("/{code}", get(redirect_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
