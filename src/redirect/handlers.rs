use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;

use crate::analytics::{extract_client_ip, RequestMeta};
use crate::config::AnalyticsConfig;
use crate::service::LinkService;

pub struct RedirectState {
    pub service: Arc<LinkService>,
    pub analytics_config: AnalyticsConfig,
}

/// Redirect to the destination of a short code, recording the visit.
///
/// Unknown codes answer 404 and expired ones 410; neither records anything.
/// A visit that cannot be persisted fails the request instead of
/// redirecting untracked.
pub async fn redirect_url(
    State(state): State<Arc<RedirectState>>,
    Path(code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let client_ip = extract_client_ip(&headers, addr.ip(), &state.analytics_config);
    let meta = RequestMeta::new(
        client_ip,
        header_text(&headers, &header::USER_AGENT),
        header_text(&headers, &header::REFERER),
    );

    match state.service.redirect(&code, &meta).await {
        Ok(target) => match HeaderValue::try_from(target) {
            Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
            Err(err) => {
                error!(short_code = %code, error = %err, "stored destination is not a valid Location header");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        Err(err) => err.into_response(),
    }
}

/// Raw header text; bytes outside visible ASCII are kept lossily rather
/// than dropping the whole value.
fn header_text(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: &'static str,
    }

    Json(HealthResponse { status: "OK" })
}
