//! Read-only projections handed to API callers

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::analytics::{aggregate_with_offset, AggregatedAnalytics};
use crate::models::Link;

/// Full analytics for one link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsView {
    pub original_url: String,
    #[serde(flatten)]
    pub analytics: AggregatedAnalytics,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl AnalyticsView {
    pub fn for_link(link: &Link, day_offset: FixedOffset) -> Self {
        Self {
            original_url: link.original_url.clone(),
            analytics: aggregate_with_offset(&link.analytics, day_offset),
            tags: link.tags.clone(),
            created_at: link.created_at,
            expiry_date: link.expires_at,
        }
    }
}

/// Counters-only listing entry, used for tag filtered listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSummary {
    pub short_code: String,
    pub original_url: String,
    pub total_visits: u64,
    pub unique_visitors: u64,
    pub created_at: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl From<&Link> for LinkSummary {
    fn from(link: &Link) -> Self {
        Self {
            short_code: link.short_code.clone(),
            original_url: link.original_url.clone(),
            total_visits: link.analytics.total_visits,
            unique_visitors: link.analytics.unique_visitors,
            created_at: link.created_at,
            expiry_date: link.expires_at,
        }
    }
}

/// Listing entry carrying the aggregated analytics sub-shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkOverview {
    pub short_code: String,
    pub short_url: String,
    pub original_url: String,
    pub tags: Vec<String>,
    pub analytics: AggregatedAnalytics,
    pub created_at: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl LinkOverview {
    pub fn for_link(link: &Link, base_url: &str, day_offset: FixedOffset) -> Self {
        Self {
            short_code: link.short_code.clone(),
            short_url: short_url(base_url, &link.short_code),
            original_url: link.original_url.clone(),
            tags: link.tags.clone(),
            analytics: aggregate_with_offset(&link.analytics, day_offset),
            created_at: link.created_at,
            expiry_date: link.expires_at,
        }
    }
}

/// Returned from link creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedLink {
    pub short_code: String,
    pub short_url: String,
    pub original_url: String,
    pub expiry_date: Option<DateTime<Utc>>,
}

pub fn short_url(base_url: &str, short_code: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), short_code)
}
