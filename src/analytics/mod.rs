//! Visit analytics
//!
//! Classifies visitors, folds each redirect into a link's snapshot and
//! projects snapshots into read-side views. Nothing in this module touches
//! storage or fails.

pub mod aggregator;
pub mod classifier;
pub mod expiry;
pub mod ip_extractor;
pub mod recorder;

pub use aggregator::{aggregate, aggregate_with_offset, AggregatedAnalytics};
pub use classifier::{classify, Classification};
pub use expiry::is_expired;
pub use ip_extractor::extract_client_ip;
pub use recorder::{record, RecordOutcome, RequestMeta};
