//! Visit recording
//!
//! [`record`] is the only code that advances a link's analytics. It is a
//! pure in-memory transition; persisting the result as one update and
//! keeping concurrent writers apart is the caller's job (see
//! `service::LinkService::redirect`).

use chrono::{DateTime, Utc};
use std::net::IpAddr;

use crate::analytics::classifier::{classify, Classification};
use crate::models::{AnalyticsSnapshot, Link, ReferrerCount, VisitRecord};

/// Request metadata the recorder needs from the transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip: IpAddr,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

impl RequestMeta {
    pub fn new(ip: IpAddr, user_agent: Option<String>, referer: Option<String>) -> Self {
        Self {
            ip,
            user_agent,
            referer,
        }
    }
}

/// What recording a visit did to the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    pub new_visitor: bool,
}

/// Record one visit on `link` and return the redirect target.
pub fn record(link: &mut Link, meta: &RequestMeta, now: DateTime<Utc>) -> String {
    let Classification { device, referrer } =
        classify(meta.user_agent.as_deref(), meta.referer.as_deref());

    let visit = VisitRecord {
        timestamp: now,
        ip: meta.ip,
        user_agent: meta.user_agent.clone().unwrap_or_default(),
        referrer,
        device_type: device,
    };

    let outcome = apply_visit(&mut link.analytics, visit);
    tracing::trace!(
        short_code = %link.short_code,
        new_visitor = outcome.new_visitor,
        total_visits = link.analytics.total_visits,
        "visit recorded"
    );

    link.original_url.clone()
}

/// Fold a classified visit into the snapshot.
pub fn apply_visit(snapshot: &mut AnalyticsSnapshot, visit: VisitRecord) -> RecordOutcome {
    *snapshot
        .device_types
        .entry(visit.device_type.clone())
        .or_insert(0) += 1;

    match snapshot
        .referrers
        .iter_mut()
        .find(|entry| entry.source == visit.referrer)
    {
        Some(entry) => entry.count += 1,
        None => snapshot.referrers.push(ReferrerCount {
            source: visit.referrer.clone(),
            count: 1,
        }),
    }

    snapshot.total_visits += 1;

    // The set holds the fingerprints of every earlier visit, so a
    // successful insert means no prior record shares this one.
    let new_visitor = snapshot.seen_fingerprints.insert(visit.fingerprint());
    snapshot.visits.push(visit);

    if new_visitor {
        snapshot.unique_visitors += 1;
    }

    RecordOutcome { new_visitor }
}
