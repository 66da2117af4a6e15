//! Google Analytics Data API wire types.

pub mod funnel;
pub mod metadata;
pub mod report;

// Re-export commonly used types
pub use funnel::{RunFunnelReportRequest, RunFunnelReportResponse};
pub use metadata::MetadataResponse;
pub use report::{DateRange, ReportTable, RunReportRequest, RunReportResponse};
