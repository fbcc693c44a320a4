use crate::models::Link;
use crate::storage::{NewLink, Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use moka::ops::compute::Op;
use std::sync::Arc;
use std::time::Duration;

/// Read-through cache in front of another storage backend.
///
/// Only `find_by_short_code` is served from the cache, and
/// `find_authoritative` always reads through so visit recording never starts
/// from a cached snapshot. Entries are weighed by their visit log length, so
/// the capacity bounds memory rather than the number of links.
pub struct CachedStorage {
    /// Underlying storage implementation
    inner: Arc<dyn Storage>,
    /// Read cache for link lookups, including misses
    read_cache: Cache<String, Option<Link>>,
}

impl CachedStorage {
    /// `max_weight` is counted as one unit per cached link plus one per
    /// visit held in its log.
    pub fn new(inner: Arc<dyn Storage>, max_weight: u64, ttl_secs: u64) -> Self {
        let read_cache = Cache::builder()
            .max_capacity(max_weight)
            .weigher(|_code: &String, link: &Option<Link>| entry_weight(link))
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, read_cache }
    }

    /// Store `candidate` unless the cache already holds a snapshot at least
    /// as far along.
    ///
    /// A reader that loaded a link before a concurrent save would otherwise
    /// put its older snapshot back after the save refreshed the entry.
    /// `total_visits` only grows, so it orders snapshots of one link; a miss
    /// orders before any link.
    async fn cache_if_newer(&self, short_code: &str, candidate: Option<Link>) {
        self.read_cache
            .entry_by_ref(short_code)
            .and_compute_with(|current| {
                let op = match current {
                    Some(entry) if version(entry.value()) >= version(&candidate) => Op::Nop,
                    _ => Op::Put(candidate),
                };
                std::future::ready(op)
            })
            .await;
    }

    async fn invalidate_cache(&self, short_code: &str) {
        self.read_cache.invalidate(short_code).await;
    }
}

fn version(link: &Option<Link>) -> Option<u64> {
    link.as_ref().map(|link| link.analytics.total_visits)
}

fn entry_weight(link: &Option<Link>) -> u32 {
    let visits = link.as_ref().map_or(0, |link| link.analytics.visits.len());
    u32::try_from(visits).unwrap_or(u32::MAX).saturating_add(1)
}

#[async_trait]
impl Storage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn create_link(&self, link: NewLink) -> StorageResult<Link> {
        let created = self.inner.create_link(link).await?;

        // Replaces a cached miss for this code, if any
        self.cache_if_newer(&created.short_code, Some(created.clone()))
            .await;

        Ok(created)
    }

    async fn find_by_short_code(&self, short_code: &str) -> StorageResult<Option<Link>> {
        if let Some(cached) = self.read_cache.get(short_code).await {
            return Ok(cached);
        }

        let result = self.inner.find_by_short_code(short_code).await?;
        self.cache_if_newer(short_code, result.clone()).await;

        Ok(result)
    }

    async fn find_authoritative(&self, short_code: &str) -> StorageResult<Option<Link>> {
        self.inner.find_authoritative(short_code).await
    }

    async fn save(&self, link: &Link) -> StorageResult<()> {
        match self.inner.save(link).await {
            Ok(()) => {
                let mut saved = link.clone();
                saved.analytics.mark_persisted();
                self.cache_if_newer(&link.short_code, Some(saved)).await;
                Ok(())
            }
            Err(err) => {
                self.invalidate_cache(&link.short_code).await;
                Err(err)
            }
        }
    }

    async fn find_by_tag(&self, tag: &str) -> StorageResult<Vec<Link>> {
        self.inner.find_by_tag(tag).await
    }

    async fn find_all(&self) -> StorageResult<Vec<Link>> {
        self.inner.find_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{record, RequestMeta};
    use crate::storage::MemoryStorage;
    use chrono::Utc;

    fn cached() -> CachedStorage {
        CachedStorage::new(Arc::new(MemoryStorage::new()), 100, 300)
    }

    fn new_link(code: &str) -> NewLink {
        NewLink {
            short_code: code.to_string(),
            original_url: "https://example.com".to_string(),
            tags: vec![],
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_cached_miss_replaced_on_create() {
        let storage = cached();
        assert!(storage.find_by_short_code("later").await.unwrap().is_none());

        storage.create_link(new_link("later")).await.unwrap();
        assert!(storage.find_by_short_code("later").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_save_refreshes_stale_entry() {
        let storage = cached();
        storage.create_link(new_link("hot")).await.unwrap();

        let before = storage.find_by_short_code("hot").await.unwrap().unwrap();
        assert_eq!(before.analytics.total_visits, 0);

        let mut link = storage.find_authoritative("hot").await.unwrap().unwrap();
        let visitor = RequestMeta::new("10.0.0.2".parse().unwrap(), None, None);
        record(&mut link, &visitor, Utc::now());
        storage.save(&link).await.unwrap();

        let after = storage.find_by_short_code("hot").await.unwrap().unwrap();
        assert_eq!(after.analytics.total_visits, 1);
    }

    #[tokio::test]
    async fn test_late_reader_cannot_restore_older_snapshot() {
        let storage = cached();
        storage.create_link(new_link("race")).await.unwrap();

        // Loaded before the save below lands
        let stale = storage.inner.find_by_short_code("race").await.unwrap();

        let mut link = storage.find_authoritative("race").await.unwrap().unwrap();
        let visitor = RequestMeta::new("10.0.0.3".parse().unwrap(), None, None);
        record(&mut link, &visitor, Utc::now());
        storage.save(&link).await.unwrap();

        storage.cache_if_newer("race", stale).await;

        let cached = storage.find_by_short_code("race").await.unwrap().unwrap();
        assert_eq!(cached.analytics.total_visits, 1);
    }

    #[tokio::test]
    async fn test_capacity_is_weighed_by_visit_log() {
        let storage = CachedStorage::new(Arc::new(MemoryStorage::new()), 5, 300);
        storage.create_link(new_link("small")).await.unwrap();
        storage.create_link(new_link("large")).await.unwrap();

        let mut link = storage.find_authoritative("large").await.unwrap().unwrap();
        for i in 0..10u8 {
            let visitor = RequestMeta::new(format!("10.0.1.{i}").parse().unwrap(), None, None);
            record(&mut link, &visitor, Utc::now());
        }
        storage.save(&link).await.unwrap();

        storage.read_cache.run_pending_tasks().await;
        assert!(storage.read_cache.contains_key("small"));
        assert!(!storage.read_cache.contains_key("large"));

        // Too heavy to cache, still served from the backend
        let large = storage.find_by_short_code("large").await.unwrap().unwrap();
        assert_eq!(large.analytics.total_visits, 10);
        assert_eq!(entry_weight(&Some(large)), 11);
        assert_eq!(entry_weight(&None), 1);
    }
}
