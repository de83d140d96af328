// ABOUTME: Insight snapshot store and subsystem aggregation
// ABOUTME: Raw feed snapshots in, risk radar queries and report-ready insight blocks out

pub mod aggregator;
pub mod storage;
pub mod types;

pub use aggregator::{AggregationOutcome, InsightAggregator, SourceCandidate};
pub use storage::SnapshotStorage;
pub use types::{
    AggregatedInsights, InsightSnapshot, RiskLevel, SnapshotCreateInput, SnapshotFilter,
    SourceSystem, SubsystemInsight,
};
