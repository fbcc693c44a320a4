use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

/// Device categories every new snapshot starts with, each at zero.
pub const SEEDED_DEVICE_TYPES: [&str; 3] = ["desktop", "mobile", "tablet"];

/// A registered short link together with the analytics it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub short_code: String,
    pub original_url: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub analytics: AnalyticsSnapshot,
}

impl Link {
    pub fn new(
        short_code: impl Into<String>,
        original_url: impl Into<String>,
        tags: Vec<String>,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            short_code: short_code.into(),
            original_url: original_url.into(),
            tags,
            created_at,
            expires_at,
            analytics: AnalyticsSnapshot::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferrerCount {
    pub source: String,
    pub count: u64,
}

/// One redirect, as seen at the moment it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    pub timestamp: DateTime<Utc>,
    pub ip: IpAddr,
    pub user_agent: String,
    pub referrer: String,
    pub device_type: String,
}

impl VisitRecord {
    /// Heuristic visitor identity: client IP joined with the raw user agent.
    pub fn fingerprint(&self) -> String {
        format!("{}-{}", self.ip, self.user_agent)
    }
}

/// Running analytics state of a single link.
///
/// Counters are only ever advanced by the visit recorder. The fingerprint
/// set mirrors `visits` and is rebuilt whenever a snapshot is restored from
/// storage, so it never needs persisting.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsSnapshot {
    pub total_visits: u64,
    pub unique_visitors: u64,
    pub device_types: BTreeMap<String, u64>,
    pub referrers: Vec<ReferrerCount>,
    pub visits: Vec<VisitRecord>,
    pub(crate) seen_fingerprints: HashSet<String>,
    persisted_visits: usize,
}

impl Default for AnalyticsSnapshot {
    fn default() -> Self {
        Self {
            total_visits: 0,
            unique_visitors: 0,
            device_types: SEEDED_DEVICE_TYPES
                .iter()
                .map(|device| (device.to_string(), 0))
                .collect(),
            referrers: Vec::new(),
            visits: Vec::new(),
            seen_fingerprints: HashSet::new(),
            persisted_visits: 0,
        }
    }
}

impl AnalyticsSnapshot {
    /// Rebuild a snapshot from its stored parts. All supplied visits are
    /// considered persisted.
    pub fn restore(
        total_visits: u64,
        unique_visitors: u64,
        device_types: BTreeMap<String, u64>,
        referrers: Vec<ReferrerCount>,
        visits: Vec<VisitRecord>,
    ) -> Self {
        let seen_fingerprints = visits.iter().map(VisitRecord::fingerprint).collect();
        let persisted_visits = visits.len();

        Self {
            total_visits,
            unique_visitors,
            device_types,
            referrers,
            visits,
            seen_fingerprints,
            persisted_visits,
        }
    }

    /// Number of leading entries of `visits` that storage already holds.
    /// Anything after this index was appended since the snapshot was loaded.
    pub fn persisted_visits(&self) -> usize {
        self.persisted_visits
    }

    /// Visits appended since the snapshot was loaded.
    pub fn pending_visits(&self) -> &[VisitRecord] {
        &self.visits[self.persisted_visits.min(self.visits.len())..]
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.persisted_visits = self.visits.len();
    }
}
