// ABOUTME: Report lifecycle library: drafting, AI section generation, review, and publication
// ABOUTME: Every state change is recorded in an append-only audit trail that outlives the report

pub mod audit;
pub mod generator;
pub mod manager;
pub mod sections;
pub mod sources;
pub mod storage;
pub mod types;

pub use audit::{AuditEntry, AuditEvent, AuditStorage, NewAuditEntry};
pub use generator::SectionGenerator;
pub use manager::{
    GenerateOptions, GenerationRun, InsightsRefresh, PublishOptions, RefreshOptions, ReportError,
    ReportManager, ReportResult,
};
pub use sections::{
    section_plan, GeneratedContent, Section, SectionKind, SectionStatus, SectionStorage,
};
pub use sources::{Source, SourceStorage};
pub use storage::{ReportStorage, TransitionOutcome};
pub use types::{
    Report, ReportAudience, ReportCreateInput, ReportFilter, ReportFormat, ReportSortKey,
    ReportStatus, ReportUpdateInput, SortOrder, TargetLength, Tone,
};
