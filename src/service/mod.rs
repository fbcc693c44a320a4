//! Link operations exposed to the transport layer
//!
//! `LinkService` wires the analytics engine to storage. Its one piece of
//! real policy is in [`LinkService::redirect`]: the read, record and save of
//! a visit happen under a per-link lock, so concurrent redirects on the same
//! code queue up instead of overwriting each other's counters.

pub mod locks;
pub mod validation;

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use rand::distr::{Alphanumeric, SampleString};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analytics::{is_expired, record, RequestMeta};
use crate::models::{short_url, AnalyticsView, CreatedLink, LinkOverview, LinkSummary};
use crate::storage::{NewLink, Storage, StorageError};

pub use locks::KeyedLocks;
pub use validation::{CreateLinkRequest, FieldError, HoursInput};

/// Length of generated short codes
pub const GENERATED_CODE_LEN: usize = 8;
const MAX_GENERATION_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("link not found")]
    NotFound,
    #[error("link has expired")]
    Gone,
    #[error("custom code already in use")]
    DuplicateCode,
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateCode => ServiceError::DuplicateCode,
            StorageError::NotFound => ServiceError::NotFound,
            other => ServiceError::Storage(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Prefix for `shortUrl` values
    pub base_url: String,
    /// Offset used when bucketing visits into days
    pub day_offset: FixedOffset,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            day_offset: Utc.fix(),
        }
    }
}

pub struct LinkService {
    storage: Arc<dyn Storage>,
    locks: KeyedLocks,
    settings: ServiceSettings,
}

impl LinkService {
    pub fn new(storage: Arc<dyn Storage>, settings: ServiceSettings) -> Self {
        Self {
            storage,
            locks: KeyedLocks::new(),
            settings,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Resolve a short code for a redirect and record the visit.
    pub async fn redirect(&self, short_code: &str, meta: &RequestMeta) -> ServiceResult<String> {
        self.redirect_at(short_code, meta, Utc::now()).await
    }

    pub async fn redirect_at(
        &self,
        short_code: &str,
        meta: &RequestMeta,
        now: DateTime<Utc>,
    ) -> ServiceResult<String> {
        let _guard = self.locks.lock(short_code).await;

        let mut link = self
            .storage
            .find_authoritative(short_code)
            .await?
            .ok_or(ServiceError::NotFound)?;

        if is_expired(&link, now) {
            debug!(short_code = %short_code, "redirect refused, link expired");
            return Err(ServiceError::Gone);
        }

        let target = record(&mut link, meta, now);

        if let Err(err) = self.storage.save(&link).await {
            warn!(short_code = %short_code, error = %err, "failed to persist visit");
            return Err(err.into());
        }

        Ok(target)
    }

    pub async fn analytics(&self, short_code: &str) -> ServiceResult<AnalyticsView> {
        let link = self
            .storage
            .find_by_short_code(short_code)
            .await?
            .ok_or(ServiceError::NotFound)?;

        Ok(AnalyticsView::for_link(&link, self.settings.day_offset))
    }

    pub async fn list_by_tag(&self, tag: &str) -> ServiceResult<Vec<LinkSummary>> {
        let links = self.storage.find_by_tag(tag).await?;
        Ok(links.iter().map(LinkSummary::from).collect())
    }

    pub async fn list_all(&self) -> ServiceResult<Vec<LinkOverview>> {
        let links = self.storage.find_all().await?;
        Ok(links
            .iter()
            .map(|link| {
                LinkOverview::for_link(link, &self.settings.base_url, self.settings.day_offset)
            })
            .collect())
    }

    pub async fn create(&self, request: CreateLinkRequest) -> ServiceResult<CreatedLink> {
        self.create_at(request, Utc::now()).await
    }

    pub async fn create_at(
        &self,
        request: CreateLinkRequest,
        now: DateTime<Utc>,
    ) -> ServiceResult<CreatedLink> {
        let valid = validation::validate(&request).map_err(ServiceError::Validation)?;

        let expires_at = valid
            .expiry_hours
            .map(|hours| now + Duration::milliseconds((hours * 3_600_000.0).round() as i64));

        let link = match valid.custom_code {
            Some(code) => {
                self.storage
                    .create_link(NewLink {
                        short_code: code,
                        original_url: valid.original_url,
                        tags: valid.tags,
                        expires_at,
                    })
                    .await?
            }
            None => {
                self.create_with_generated_code(valid.original_url, valid.tags, expires_at)
                    .await?
            }
        };

        info!(short_code = %link.short_code, "link created");

        Ok(CreatedLink {
            short_url: short_url(&self.settings.base_url, &link.short_code),
            short_code: link.short_code,
            original_url: link.original_url,
            expiry_date: link.expires_at,
        })
    }

    async fn create_with_generated_code(
        &self,
        original_url: String,
        tags: Vec<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> ServiceResult<crate::models::Link> {
        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let new = NewLink {
                short_code: generate_short_code(),
                original_url: original_url.clone(),
                tags: tags.clone(),
                expires_at,
            };

            match self.storage.create_link(new).await {
                Ok(link) => return Ok(link),
                Err(StorageError::DuplicateCode) => {
                    debug!(attempt, "generated short code collided, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ServiceError::Storage(StorageError::Other(anyhow::anyhow!(
            "failed to generate a unique short code after {MAX_GENERATION_ATTEMPTS} attempts"
        ))))
    }
}

pub fn generate_short_code() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), GENERATED_CODE_LEN)
}
