//! Read-side projections of an analytics snapshot
//!
//! Everything here is a pure function of the snapshot it is given: no
//! storage access, no clock, no failure modes. Calling [`aggregate`] twice
//! on the same snapshot yields identical output.

use chrono::{FixedOffset, Offset, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{AnalyticsSnapshot, ReferrerCount, VisitRecord};

/// Maximum number of referrers reported in a view
pub const TOP_REFERRER_LIMIT: usize = 5;

/// Date format used for the per-day time series keys
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Derived analytics for one link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedAnalytics {
    pub total_visits: u64,
    pub unique_visitors: u64,
    pub device_types: BTreeMap<String, u64>,
    pub top_referrers: Vec<ReferrerCount>,
    /// Day (`YYYY-MM-DD`) to visit count. Consumers must not depend on key
    /// order even though the map happens to iterate chronologically.
    pub visits_by_day: BTreeMap<String, u64>,
}

/// Aggregate a snapshot, bucketing days in UTC.
pub fn aggregate(snapshot: &AnalyticsSnapshot) -> AggregatedAnalytics {
    aggregate_with_offset(snapshot, utc_offset())
}

/// Aggregate a snapshot, bucketing days in the given fixed offset.
pub fn aggregate_with_offset(
    snapshot: &AnalyticsSnapshot,
    day_offset: FixedOffset,
) -> AggregatedAnalytics {
    AggregatedAnalytics {
        total_visits: snapshot.total_visits,
        unique_visitors: snapshot.unique_visitors,
        device_types: snapshot.device_types.clone(),
        top_referrers: top_referrers(&snapshot.referrers, TOP_REFERRER_LIMIT),
        visits_by_day: visits_by_day(&snapshot.visits, day_offset),
    }
}

/// Highest-count referrers first. `sort_by` is stable, so equal counts keep
/// the order in which the referrers were first seen.
pub fn top_referrers(referrers: &[ReferrerCount], limit: usize) -> Vec<ReferrerCount> {
    let mut ranked = referrers.to_vec();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(limit);
    ranked
}

pub fn visits_by_day(visits: &[VisitRecord], day_offset: FixedOffset) -> BTreeMap<String, u64> {
    let mut days = BTreeMap::new();
    for visit in visits {
        let day = visit
            .timestamp
            .with_timezone(&day_offset)
            .format(DAY_FORMAT)
            .to_string();
        *days.entry(day).or_insert(0) += 1;
    }
    days
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}
