use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::models::{AnalyticsView, CreatedLink, LinkOverview, LinkSummary};
use crate::service::{CreateLinkRequest, LinkService, ServiceError};

pub struct AppState {
    pub service: Arc<LinkService>,
}

/// Success envelope shared by every API response
#[derive(Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

type ApiResult<T> = Result<Json<DataResponse<T>>, ServiceError>;

/// Create a new short link
pub async fn create_url(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<DataResponse<CreatedLink>>), ServiceError> {
    let created = state.service.create(payload).await?;
    Ok((StatusCode::CREATED, DataResponse::new(created)))
}

/// List all links, newest first, with aggregated analytics
pub async fn list_urls(State(state): State<Arc<AppState>>) -> ApiResult<Vec<LinkOverview>> {
    Ok(DataResponse::new(state.service.list_all().await?))
}

/// List links carrying a tag
pub async fn list_urls_by_tag(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> ApiResult<Vec<LinkSummary>> {
    Ok(DataResponse::new(state.service.list_by_tag(&tag).await?))
}

/// Analytics for one short code
pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<AnalyticsView> {
    Ok(DataResponse::new(state.service.analytics(&code).await?))
}

/// Health check endpoint
pub async fn health_check() -> Json<DataResponse<&'static str>> {
    DataResponse::new("OK")
}
