//! Report normalization and derived analytics.
//!
//! Everything here is backend-agnostic and request-scoped: the normalizer
//! pivots backend tables into rows, and the comparison, anomaly and funnel
//! modules derive their results from those rows.

pub mod anomaly;
pub mod compare;
pub mod funnel;
pub mod normalize;
pub mod period;

pub use normalize::{OrderKey, ReportRequest};
pub use period::CompareMode;
