pub mod link;
pub mod views;

pub use link::{AnalyticsSnapshot, Link, ReferrerCount, VisitRecord, SEEDED_DEVICE_TYPES};
pub use views::{short_url, AnalyticsView, CreatedLink, LinkOverview, LinkSummary};
