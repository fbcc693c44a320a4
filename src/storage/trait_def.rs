use crate::models::Link;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short code already exists")]
    DuplicateCode,
    #[error("link not found")]
    NotFound,
    /// The stored link moved on since the snapshot being saved was loaded
    #[error("link was modified concurrently")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Other(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Everything needed to register a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub short_code: String,
    pub original_url: String,
    pub tags: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn init(&self) -> Result<()>;

    /// Register a link. Fails with `DuplicateCode` if the code is taken.
    async fn create_link(&self, link: NewLink) -> StorageResult<Link>;

    /// Look up a link by short code. Implementations may serve this from a
    /// cache, so the result can trail the latest write slightly.
    async fn find_by_short_code(&self, short_code: &str) -> StorageResult<Option<Link>>;

    /// Look up a link bypassing any cache. Used before recording visits.
    async fn find_authoritative(&self, short_code: &str) -> StorageResult<Option<Link>> {
        self.find_by_short_code(short_code).await
    }

    /// Persist a link's analytics as a single update.
    ///
    /// Visits past `persisted_visits()` are appended; counters are replaced.
    /// Fails with `NotFound` if the link is gone and `Conflict` if another
    /// writer saved since this snapshot was loaded.
    async fn save(&self, link: &Link) -> StorageResult<()>;

    /// All links carrying the given tag
    async fn find_by_tag(&self, tag: &str) -> StorageResult<Vec<Link>>;

    /// All links, newest first
    async fn find_all(&self) -> StorageResult<Vec<Link>>;
}
