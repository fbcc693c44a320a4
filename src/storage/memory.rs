use crate::models::Link;
use crate::storage::{NewLink, Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

struct StoredLink {
    /// Insertion order, breaks ties between equal creation timestamps
    seq: u64,
    link: Link,
}

/// Process-local storage backed by a DashMap. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    links: DashMap<String, StoredLink>,
    next_seq: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_newest_first(&self, filter: impl Fn(&Link) -> bool) -> Vec<Link> {
        let mut matches: Vec<(u64, Link)> = self
            .links
            .iter()
            .filter(|entry| filter(&entry.link))
            .map(|entry| (entry.seq, entry.link.clone()))
            .collect();

        matches.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        matches.into_iter().map(|(_, link)| link).collect()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn create_link(&self, new: NewLink) -> StorageResult<Link> {
        match self.links.entry(new.short_code.clone()) {
            Entry::Occupied(_) => Err(StorageError::DuplicateCode),
            Entry::Vacant(slot) => {
                let link = Link::new(
                    new.short_code,
                    new.original_url,
                    new.tags,
                    Utc::now(),
                    new.expires_at,
                );
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(StoredLink {
                    seq,
                    link: link.clone(),
                });
                Ok(link)
            }
        }
    }

    async fn find_by_short_code(&self, short_code: &str) -> StorageResult<Option<Link>> {
        Ok(self.links.get(short_code).map(|entry| entry.link.clone()))
    }

    async fn save(&self, link: &Link) -> StorageResult<()> {
        let mut entry = self
            .links
            .get_mut(&link.short_code)
            .ok_or(StorageError::NotFound)?;

        if entry.link.analytics.visits.len() != link.analytics.persisted_visits() {
            return Err(StorageError::Conflict);
        }

        let mut stored = link.clone();
        stored.analytics.mark_persisted();
        entry.link = stored;
        Ok(())
    }

    async fn find_by_tag(&self, tag: &str) -> StorageResult<Vec<Link>> {
        Ok(self.sorted_newest_first(|link| link.tags.iter().any(|t| t == tag)))
    }

    async fn find_all(&self) -> StorageResult<Vec<Link>> {
        Ok(self.sorted_newest_first(|_| true))
    }
}
