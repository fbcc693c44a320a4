use chrono::{DateTime, Utc};

use crate::models::Link;

/// A link is expired once `now` is strictly past its expiry timestamp.
/// Links without one never expire.
pub fn is_expired(link: &Link, now: DateTime<Utc>) -> bool {
    expired_at(link.expires_at, now)
}

pub fn expired_at(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expires_at, Some(expiry) if now > expiry)
}
