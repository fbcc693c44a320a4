//! Redirect integration tests
//!
//! Drives the redirect router end to end and checks what ends up recorded
//! against the link.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{Duration, Utc};
use linktrail::config::{AnalyticsConfig, TrustedProxyMode};
use linktrail::redirect;
use linktrail::service::{CreateLinkRequest, HoursInput, LinkService, ServiceSettings};
use linktrail::storage::{SqliteStorage, Storage};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::{Layer, ServiceExt};

/// Helper to create a service over a fresh in-memory SQLite database
async fn create_test_service() -> Arc<LinkService> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(LinkService::new(
        Arc::new(storage),
        ServiceSettings::default(),
    ))
}

async fn create_link(service: &LinkService, code: &str, url: &str) {
    service
        .create(CreateLinkRequest {
            original_url: Some(url.to_string()),
            custom_code: Some(code.to_string()),
            ..CreateLinkRequest::default()
        })
        .await
        .unwrap();
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
struct TestConnectInfoLayer;

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware { inner }
    }
}

#[derive(Clone)]
struct TestConnectInfoMiddleware<S> {
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let addr = SocketAddr::from(([127, 0, 0, 1], 12345));
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(addr));

        self.inner.call(req)
    }
}

fn redirect_app(service: Arc<LinkService>, analytics: AnalyticsConfig) -> axum::Router {
    redirect::create_redirect_router(service, analytics).layer(TestConnectInfoLayer)
}

#[tokio::test]
async fn test_redirect_active_url() {
    let service = create_test_service().await;
    create_link(&service, "redirect_test", "https://example.com/destination").await;

    let app = redirect_app(service.clone(), AnalyticsConfig::default());

    let request = Request::builder()
        .uri("/redirect_test")
        .header(
            header::USER_AGENT,
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148",
        )
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://example.com/destination"
    );

    // The visit is persisted before the response goes out
    let link = service
        .storage()
        .find_authoritative("redirect_test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(link.analytics.total_visits, 1);
    assert_eq!(link.analytics.unique_visitors, 1);
    assert_eq!(link.analytics.device_types["mobile"], 1);
    assert_eq!(link.analytics.referrers[0].source, "direct");
    assert_eq!(link.analytics.visits[0].ip.to_string(), "127.0.0.1");
}

#[tokio::test]
async fn test_redirect_destination_with_control_characters() {
    let service = create_test_service().await;
    create_link(&service, "nlcode", "https://example.com/a\nb").await;

    let app = redirect_app(service.clone(), AnalyticsConfig::default());

    let request = Request::builder()
        .uri("/nlcode")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://example.com/ab"
    );

    let link = service
        .storage()
        .find_authoritative("nlcode")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(link.original_url, "https://example.com/ab");
    assert_eq!(link.analytics.total_visits, 1);
}

#[tokio::test]
async fn test_redirect_non_ascii_destination_is_encoded() {
    let service = create_test_service().await;
    create_link(&service, "utf8code", "https://example.com/café").await;

    let app = redirect_app(service, AnalyticsConfig::default());

    let request = Request::builder()
        .uri("/utf8code")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://example.com/caf%C3%A9"
    );
}

#[tokio::test]
async fn test_redirect_nonexistent_url() {
    let service = create_test_service().await;
    let app = redirect_app(service, AnalyticsConfig::default());

    let request = Request::builder()
        .uri("/nonexistent")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.status(),
        StatusCode::NOT_FOUND,
        "Nonexistent URL should return 404"
    );
}

#[tokio::test]
async fn test_redirect_expired_url() {
    let service = create_test_service().await;

    // Created two hours ago with a one hour lifetime
    service
        .create_at(
            CreateLinkRequest {
                original_url: Some("https://example.com".to_string()),
                custom_code: Some("expired_test".to_string()),
                expiry_hours: Some(HoursInput::Number(1.0)),
                ..CreateLinkRequest::default()
            },
            Utc::now() - Duration::hours(2),
        )
        .await
        .unwrap();

    let app = redirect_app(service.clone(), AnalyticsConfig::default());

    let request = Request::builder()
        .uri("/expired_test")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.status(),
        StatusCode::GONE,
        "Expired URL should return 410 GONE"
    );

    let link = service
        .storage()
        .find_authoritative("expired_test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(link.analytics.total_visits, 0);
    assert!(link.analytics.visits.is_empty());
}

#[tokio::test]
async fn test_redirect_records_referrer_and_forwarded_ip() {
    let service = create_test_service().await;
    create_link(&service, "proxied", "https://example.com").await;

    let analytics = AnalyticsConfig {
        trusted_proxy_mode: TrustedProxyMode::Standard,
        trusted_proxies: vec!["127.0.0.0/8".parse().unwrap()],
        ..AnalyticsConfig::default()
    };
    let app = redirect_app(service.clone(), analytics);

    let request = Request::builder()
        .uri("/proxied")
        .header("x-forwarded-for", "203.0.113.9, 127.0.0.2")
        .header(header::REFERER, "https://news.example.org/item?id=1")
        .header(header::USER_AGENT, "Mozilla/5.0 (Windows NT 10.0; Win64; x64)")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);

    let link = service
        .storage()
        .find_authoritative("proxied")
        .await
        .unwrap()
        .unwrap();
    let visit = &link.analytics.visits[0];
    assert_eq!(visit.ip.to_string(), "203.0.113.9");
    assert_eq!(visit.referrer, "https://news.example.org/item?id=1");
    assert_eq!(visit.device_type, "desktop");
}

#[tokio::test]
async fn test_repeat_visitor_counts_once() {
    let service = create_test_service().await;
    create_link(&service, "repeat", "https://example.com").await;

    let app = redirect_app(service.clone(), AnalyticsConfig::default());

    for _ in 0..3 {
        let request = Request::builder()
            .uri("/repeat")
            .header(header::USER_AGENT, "same-agent")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    let link = service
        .storage()
        .find_authoritative("repeat")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(link.analytics.total_visits, 3);
    assert_eq!(link.analytics.unique_visitors, 1);
    assert_eq!(link.analytics.visits.len(), 3);
}

#[tokio::test]
async fn test_concurrent_redirects() {
    let service = create_test_service().await;
    create_link(&service, "popular", "https://example.com").await;

    let app = redirect_app(service.clone(), AnalyticsConfig::default());

    let mut handles = vec![];
    for i in 0..10 {
        let app = app.clone();
        let handle = tokio::spawn(async move {
            let request = Request::builder()
                .uri("/popular")
                .header(header::USER_AGENT, format!("agent-{i}"))
                .body(Body::empty())
                .unwrap();
            app.oneshot(request).await.unwrap()
        });
        handles.push(handle);
    }

    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    let link = service
        .storage()
        .find_authoritative("popular")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(link.analytics.total_visits, 10);
    assert_eq!(link.analytics.unique_visitors, 10);
    assert_eq!(link.analytics.visits.len(), 10);
}

#[tokio::test]
async fn test_health_check() {
    let service = create_test_service().await;
    let app = redirect_app(service, AnalyticsConfig::default());

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
