// ABOUTME: Report lifecycle orchestration: workflow transitions, generation runs, audit
// ABOUTME: The single entry point the HTTP layer talks to; storages stay behind it

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, warn};

use vantage_ai::{AIServiceError, TextGenerator};
use vantage_core::{require_non_empty, RequestContext, ValidationError};
use vantage_insights::{AggregatedInsights, InsightAggregator, SnapshotStorage};
use vantage_storage::StorageError;

use crate::audit::{AuditEntry, AuditEvent, AuditStorage, NewAuditEntry};
use crate::generator::{render_markdown, SectionGenerator};
use crate::sections::{section_plan, Section, SectionStatus, SectionStorage};
use crate::sources::{Source, SourceStorage};
use crate::storage::{ReportStorage, TransitionOutcome};
use crate::types::{Report, ReportCreateInput, ReportFilter, ReportStatus, ReportUpdateInput};

/// Cached aggregations younger than this are reused unless the caller
/// forces a refresh.
const INSIGHTS_TTL_MINUTES: i64 = 30;
/// Window when the report has no explicit period.
const DEFAULT_WINDOW_DAYS: i64 = 7;
const SUMMARY_MAX_LEN: usize = 280;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Report not found: {0}")]
    NotFound(String),
    #[error("Section not found: {0}")]
    SectionNotFound(String),
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: ReportStatus,
        to: ReportStatus,
    },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Generation failed: {0}")]
    Generation(String),
}

impl From<AIServiceError> for ReportError {
    fn from(err: AIServiceError) -> Self {
        ReportError::Generation(err.to_string())
    }
}

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateOptions {
    /// Re-aggregate even when a recent cached aggregation exists.
    #[serde(rename = "forceRefresh", default)]
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshOptions {
    #[serde(rename = "forceRefresh", default)]
    pub force_refresh: bool,
    #[serde(rename = "updateKpis", default)]
    pub update_kpis: bool,
    #[serde(rename = "updateSummary", default)]
    pub update_summary: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishOptions {
    /// Recorded in the audit detail; actual dispatch is external.
    #[serde(rename = "handOffToDelivery", default)]
    pub hand_off_to_delivery: bool,
}

/// What a full generation run did.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRun {
    pub report: Report,
    #[serde(rename = "sectionsGenerated")]
    pub sections_generated: usize,
    #[serde(rename = "sectionsFailed")]
    pub sections_failed: usize,
    #[serde(rename = "failedBlocks")]
    pub failed_blocks: Vec<String>,
    #[serde(rename = "tokensInput")]
    pub tokens_input: i64,
    #[serde(rename = "tokensOutput")]
    pub tokens_output: i64,
    #[serde(rename = "durationMs")]
    pub duration_ms: i64,
}

/// Result of an insights refresh.
#[derive(Debug, Clone, Serialize)]
pub struct InsightsRefresh {
    pub insights: AggregatedInsights,
    pub sources: Vec<Source>,
    #[serde(rename = "failedBlocks")]
    pub failed_blocks: Vec<String>,
    #[serde(rename = "fromCache")]
    pub from_cache: bool,
}

struct RunStats {
    generated: usize,
    failed: usize,
    failed_blocks: Vec<String>,
    tokens_input: i64,
    tokens_output: i64,
}

pub struct ReportManager {
    reports: ReportStorage,
    sections: SectionStorage,
    sources: SourceStorage,
    audit: AuditStorage,
    aggregator: InsightAggregator,
    generator: SectionGenerator,
}

impl ReportManager {
    pub fn new(pool: SqlitePool, text_generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            reports: ReportStorage::new(pool.clone()),
            sections: SectionStorage::new(pool.clone()),
            sources: SourceStorage::new(pool.clone()),
            audit: AuditStorage::new(pool.clone()),
            aggregator: InsightAggregator::new(SnapshotStorage::new(pool)),
            generator: SectionGenerator::new(text_generator),
        }
    }

    pub async fn create(
        &self,
        ctx: &RequestContext,
        input: ReportCreateInput,
    ) -> ReportResult<Report> {
        require_non_empty("title", &input.title)?;

        let entry =
            NewAuditEntry::new(AuditEvent::Created, &ctx.actor).entering(ReportStatus::Draft);
        let report = self
            .reports
            .create(&ctx.org_id, input, ctx.actor_email(), entry)
            .await?;

        info!("Created report '{}' ({})", report.title, report.id);
        Ok(report)
    }

    pub async fn get(&self, ctx: &RequestContext, report_id: &str) -> ReportResult<Option<Report>> {
        Ok(self.reports.get(&ctx.org_id, report_id).await?)
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        filter: &ReportFilter,
    ) -> ReportResult<(Vec<Report>, i64)> {
        Ok(self.reports.list(&ctx.org_id, filter).await?)
    }

    /// Patch mutable fields. Returns `Ok(None)` when the report does not
    /// exist for this org; a foreign row is indistinguishable from a
    /// missing one.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        report_id: &str,
        patch: ReportUpdateInput,
    ) -> ReportResult<Option<Report>> {
        if let Some(title) = &patch.title {
            require_non_empty("title", title)?;
        }
        if patch.is_empty() {
            return Ok(self.reports.get(&ctx.org_id, report_id).await?);
        }

        let updated = self
            .reports
            .update_fields(&ctx.org_id, report_id, &patch, ctx.actor_email())
            .await?;

        if let Some(report) = &updated {
            self.audit
                .append(
                    &ctx.org_id,
                    &report.id,
                    NewAuditEntry::new(AuditEvent::Updated, &ctx.actor),
                )
                .await?;
        }

        Ok(updated)
    }

    /// Full generation run: CAS into `generating`, refresh insights,
    /// generate every pending planned section, land in `review`. A
    /// failed run lands in `generation_failed` and can be retried.
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        report_id: &str,
        options: GenerateOptions,
    ) -> ReportResult<GenerationRun> {
        self.checked_transition(ctx, report_id, ReportStatus::Generating)
            .await?;
        let report = self.require_report(ctx, report_id).await?;

        info!("Starting generation run for report {}", report_id);
        let started = Instant::now();

        match self.run_generation(ctx, &report, &options).await {
            Ok(stats) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                self.finish_transition(ctx, report_id, ReportStatus::Review)
                    .await?;

                let detail = format!(
                    "{} sections generated, {} failed",
                    stats.generated, stats.failed
                );
                let entry = NewAuditEntry::new(AuditEvent::Generated, &ctx.actor)
                    .transition(ReportStatus::Generating, ReportStatus::Review)
                    .tokens(stats.tokens_input, stats.tokens_output)
                    .duration_ms(duration_ms)
                    .detail(&detail);
                self.audit.append(&ctx.org_id, report_id, entry).await?;

                info!("Generation run for report {} done: {}", report_id, detail);

                let report = self.require_report(ctx, report_id).await?;
                Ok(GenerationRun {
                    report,
                    sections_generated: stats.generated,
                    sections_failed: stats.failed,
                    failed_blocks: stats.failed_blocks,
                    tokens_input: stats.tokens_input,
                    tokens_output: stats.tokens_output,
                    duration_ms,
                })
            }
            Err(err) => {
                error!("Generation run failed for report {}: {}", report_id, err);
                if let Err(transition_err) = self
                    .finish_transition(ctx, report_id, ReportStatus::GenerationFailed)
                    .await
                {
                    error!(
                        "Could not mark report {} as generation_failed: {}",
                        report_id, transition_err
                    );
                }

                let entry = NewAuditEntry::new(AuditEvent::Generated, &ctx.actor)
                    .transition(ReportStatus::Generating, ReportStatus::GenerationFailed)
                    .detail(err.to_string());
                if let Err(audit_err) = self.audit.append(&ctx.org_id, report_id, entry).await {
                    error!(
                        "Could not record failed run for report {}: {}",
                        report_id, audit_err
                    );
                }

                Err(err)
            }
        }
    }

    /// `review -> approved`, recording the approver.
    pub async fn approve(&self, ctx: &RequestContext, report_id: &str) -> ReportResult<Report> {
        self.apply_transition(
            ctx,
            report_id,
            ReportStatus::Approved,
            AuditEvent::Approved,
            None,
        )
        .await
    }

    /// `approved -> published`. Delivery hand-off is only recorded.
    pub async fn publish(
        &self,
        ctx: &RequestContext,
        report_id: &str,
        options: PublishOptions,
    ) -> ReportResult<Report> {
        let detail = options
            .hand_off_to_delivery
            .then(|| "handed off to delivery".to_string());
        self.apply_transition(
            ctx,
            report_id,
            ReportStatus::Published,
            AuditEvent::Published,
            detail,
        )
        .await
    }

    /// Archive from any state. Archiving an archived report is a no-op
    /// success and appends no second audit entry.
    pub async fn archive(&self, ctx: &RequestContext, report_id: &str) -> ReportResult<Report> {
        let report = self.require_report(ctx, report_id).await?;
        if report.status == ReportStatus::Archived {
            return Ok(report);
        }
        self.apply_transition(
            ctx,
            report_id,
            ReportStatus::Archived,
            AuditEvent::Archived,
            None,
        )
        .await
    }

    /// Soft delete archives; hard delete removes the row (sections and
    /// sources cascade) while the audit trail stays. Returns false when
    /// there was nothing to delete.
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        report_id: &str,
        hard: bool,
    ) -> ReportResult<bool> {
        if !hard {
            return match self.archive(ctx, report_id).await {
                Ok(_) => Ok(true),
                Err(ReportError::NotFound(_)) => Ok(false),
                Err(e) => Err(e),
            };
        }

        let report = match self.reports.get(&ctx.org_id, report_id).await? {
            Some(report) => report,
            None => return Ok(false),
        };

        let entry =
            NewAuditEntry::new(AuditEvent::Deleted, &ctx.actor).leaving(report.status);
        let deleted = self.reports.delete(&ctx.org_id, report_id, entry).await?;
        if deleted {
            info!("Hard deleted report '{}' ({})", report.title, report_id);
        }
        Ok(deleted)
    }

    pub async fn sections(
        &self,
        ctx: &RequestContext,
        report_id: &str,
    ) -> ReportResult<Vec<Section>> {
        Ok(self.sections.list_for_report(&ctx.org_id, report_id).await?)
    }

    /// Manual edit: re-renders HTML, marks the section `edited`, never
    /// calls the generator.
    pub async fn edit_section(
        &self,
        ctx: &RequestContext,
        report_id: &str,
        section_id: &str,
        markdown: &str,
    ) -> ReportResult<Section> {
        require_non_empty("content", markdown)?;
        self.require_report(ctx, report_id).await?;

        let html = render_markdown(markdown);
        let section = match self
            .sections
            .store_manual_edit(
                &ctx.org_id,
                report_id,
                section_id,
                markdown,
                &html,
                ctx.actor_email(),
            )
            .await
        {
            Ok(section) => section,
            Err(StorageError::NotFound) => {
                return Err(ReportError::SectionNotFound(section_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let entry = NewAuditEntry::new(AuditEvent::Updated, &ctx.actor)
            .detail(format!("section {} edited", section.kind.as_str()));
        self.audit.append(&ctx.org_id, report_id, entry).await?;

        Ok(section)
    }

    /// Regenerate one section while the report sits in `review`.
    pub async fn regenerate_section(
        &self,
        ctx: &RequestContext,
        report_id: &str,
        section_id: &str,
    ) -> ReportResult<Section> {
        let report = self.require_report(ctx, report_id).await?;
        if report.status != ReportStatus::Review {
            return Err(ReportError::InvalidState(format!(
                "sections can only be regenerated in review, report is {}",
                report.status
            )));
        }

        let section = self
            .sections
            .get(&ctx.org_id, report_id, section_id)
            .await?
            .ok_or_else(|| ReportError::SectionNotFound(section_id.to_string()))?;

        let (insights, _, _) = self
            .insights_for(ctx, &report, &RefreshOptions::default())
            .await?;
        let content = self.generator.generate(&report, section.kind, &insights).await?;
        let updated = self
            .sections
            .store_generated(&ctx.org_id, report_id, section_id, &content)
            .await?;

        let entry = NewAuditEntry::new(AuditEvent::Regenerated, &ctx.actor)
            .tokens(content.tokens_input, content.tokens_output)
            .duration_ms(content.generation_ms)
            .detail(section.kind.as_str());
        self.audit.append(&ctx.org_id, report_id, entry).await?;

        Ok(updated)
    }

    /// All-or-nothing reorder; the id set must match the report's
    /// sections exactly.
    pub async fn reorder_sections(
        &self,
        ctx: &RequestContext,
        report_id: &str,
        ordered_ids: &[String],
    ) -> ReportResult<Vec<Section>> {
        self.require_report(ctx, report_id).await?;

        let sections = match self
            .sections
            .reorder(&ctx.org_id, report_id, ordered_ids)
            .await
        {
            Ok(sections) => sections,
            Err(StorageError::InvalidValue(message)) => {
                return Err(ReportError::Validation(ValidationError::new(
                    "orderedIds",
                    message,
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let entry = NewAuditEntry::new(AuditEvent::Updated, &ctx.actor)
            .detail("sections reordered");
        self.audit.append(&ctx.org_id, report_id, entry).await?;

        Ok(sections)
    }

    pub async fn sources(
        &self,
        ctx: &RequestContext,
        report_id: &str,
    ) -> ReportResult<Vec<Source>> {
        Ok(self.sources.list_for_report(&ctx.org_id, report_id).await?)
    }

    pub async fn audit_log(
        &self,
        ctx: &RequestContext,
        report_id: &str,
    ) -> ReportResult<Vec<AuditEntry>> {
        Ok(self.audit.list_for_report(&ctx.org_id, report_id).await?)
    }

    /// Re-aggregate (or reuse a recent cache) and attach sources.
    pub async fn refresh_insights(
        &self,
        ctx: &RequestContext,
        report_id: &str,
        options: RefreshOptions,
    ) -> ReportResult<InsightsRefresh> {
        let report = self.require_report(ctx, report_id).await?;
        let (insights, failed_blocks, from_cache) =
            self.insights_for(ctx, &report, &options).await?;
        let sources = self.sources.list_for_report(&ctx.org_id, report_id).await?;

        if !from_cache {
            let entry = NewAuditEntry::new(AuditEvent::Updated, &ctx.actor).detail(format!(
                "insights refreshed ({} sources, {} blocks degraded)",
                sources.len(),
                failed_blocks.len()
            ));
            self.audit.append(&ctx.org_id, report_id, entry).await?;
        }

        Ok(InsightsRefresh {
            insights,
            sources,
            failed_blocks: failed_blocks.iter().map(|s| s.to_string()).collect(),
            from_cache,
        })
    }

    // ---- internals ----

    async fn require_report(
        &self,
        ctx: &RequestContext,
        report_id: &str,
    ) -> ReportResult<Report> {
        self.reports
            .get(&ctx.org_id, report_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(report_id.to_string()))
    }

    /// Validated CAS: read the current status, check the matrix, compare
    /// and set. A concurrent writer makes the CAS miss and the fresh
    /// status is reported back.
    async fn checked_transition(
        &self,
        ctx: &RequestContext,
        report_id: &str,
        to: ReportStatus,
    ) -> ReportResult<ReportStatus> {
        let report = self.require_report(ctx, report_id).await?;
        let from = report.status;
        if !from.can_transition(to) {
            return Err(ReportError::InvalidTransition { from, to });
        }

        match self
            .reports
            .transition(&ctx.org_id, report_id, &[from], to, ctx.actor_email())
            .await?
        {
            TransitionOutcome::Applied => Ok(from),
            TransitionOutcome::Conflict(actual) => {
                Err(ReportError::InvalidTransition { from: actual, to })
            }
            TransitionOutcome::NotFound => Err(ReportError::NotFound(report_id.to_string())),
        }
    }

    /// Leave `generating` at the end of a run. The report was ours for
    /// the duration; a miss here means someone archived it mid-run.
    async fn finish_transition(
        &self,
        ctx: &RequestContext,
        report_id: &str,
        to: ReportStatus,
    ) -> ReportResult<()> {
        match self
            .reports
            .transition(
                &ctx.org_id,
                report_id,
                &[ReportStatus::Generating],
                to,
                ctx.actor_email(),
            )
            .await?
        {
            TransitionOutcome::Applied => Ok(()),
            TransitionOutcome::Conflict(actual) => {
                warn!(
                    "Report {} left generating underneath the run (now {})",
                    report_id, actual
                );
                Ok(())
            }
            TransitionOutcome::NotFound => Err(ReportError::NotFound(report_id.to_string())),
        }
    }

    async fn checked_transition_with_audit(
        &self,
        ctx: &RequestContext,
        report_id: &str,
        to: ReportStatus,
        event: AuditEvent,
        detail: Option<String>,
    ) -> ReportResult<Report> {
        let from = self.checked_transition(ctx, report_id, to).await?;

        let mut entry = NewAuditEntry::new(event, &ctx.actor).transition(from, to);
        if let Some(detail) = detail {
            entry = entry.detail(detail);
        }
        self.audit.append(&ctx.org_id, report_id, entry).await?;

        self.require_report(ctx, report_id).await
    }

    async fn apply_transition(
        &self,
        ctx: &RequestContext,
        report_id: &str,
        to: ReportStatus,
        event: AuditEvent,
        detail: Option<String>,
    ) -> ReportResult<Report> {
        let report = self
            .checked_transition_with_audit(ctx, report_id, to, event, detail)
            .await?;
        info!("Report {} is now {}", report_id, report.status);
        Ok(report)
    }

    /// Aggregate insights for the report window, attach sources and
    /// cache the result, or reuse a recent cached aggregation.
    async fn insights_for(
        &self,
        ctx: &RequestContext,
        report: &Report,
        options: &RefreshOptions,
    ) -> ReportResult<(AggregatedInsights, Vec<&'static str>, bool)> {
        if !options.force_refresh {
            if let Some((value, at)) = self.reports.cached_insights(&ctx.org_id, &report.id).await?
            {
                if Utc::now() - at < Duration::minutes(INSIGHTS_TTL_MINUTES) {
                    match serde_json::from_value::<AggregatedInsights>(value) {
                        Ok(insights) => return Ok((insights, Vec::new(), true)),
                        Err(e) => warn!(
                            "Discarding unreadable cached insights for report {}: {}",
                            report.id, e
                        ),
                    }
                }
            }
        }

        let (from, to) = report_window(report);
        let outcome = self.aggregator.aggregate(&ctx.org_id, from, to).await;
        self.sources
            .attach(&ctx.org_id, &report.id, &outcome.sources)
            .await?;

        let summary = if options.update_summary {
            build_summary(&outcome.insights)
        } else {
            None
        };
        let kpi = if options.update_kpis {
            Some(build_kpi_snapshot(&outcome.insights))
        } else {
            None
        };
        let insights_value =
            serde_json::to_value(&outcome.insights).map_err(StorageError::Json)?;
        self.reports
            .store_insights(
                &ctx.org_id,
                &report.id,
                &insights_value,
                summary.as_deref(),
                kpi.as_ref(),
            )
            .await?;

        Ok((outcome.insights, outcome.failed_blocks, false))
    }

    /// The run body: everything between entering and leaving
    /// `generating`. Per-section failures are counted, not propagated;
    /// only a run with zero successful sections errors out.
    async fn run_generation(
        &self,
        ctx: &RequestContext,
        report: &Report,
        options: &GenerateOptions,
    ) -> ReportResult<RunStats> {
        let refresh = RefreshOptions {
            force_refresh: options.force_refresh,
            update_kpis: true,
            update_summary: true,
        };
        let (insights, failed_blocks, _) = self.insights_for(ctx, report, &refresh).await?;

        // Make sure every planned section exists; a retry after a partial
        // failure finds the survivors already generated.
        let plan = section_plan(report.format, report.include_recommendations);
        let existing = self.sections.list_for_report(&ctx.org_id, &report.id).await?;
        for (position, kind) in plan.iter().enumerate() {
            if !existing.iter().any(|s| s.kind == *kind) {
                self.sections
                    .create_pending(&ctx.org_id, &report.id, *kind, position as i64)
                    .await?;
            }
        }

        let sections = self.sections.list_for_report(&ctx.org_id, &report.id).await?;
        let consumed_systems: Vec<_> = insights.blocks().map(|b| b.system).collect();

        let mut generated = 0usize;
        let mut failed = 0usize;
        let mut tokens_input = 0i64;
        let mut tokens_output = 0i64;

        for section in &sections {
            if section.status != SectionStatus::Pending {
                continue;
            }
            match self.generator.generate(report, section.kind, &insights).await {
                Ok(content) => {
                    tokens_input += content.tokens_input;
                    tokens_output += content.tokens_output;
                    self.sections
                        .store_generated(&ctx.org_id, &report.id, &section.id, &content)
                        .await?;
                    self.sources
                        .mark_consumed(&ctx.org_id, &report.id, &consumed_systems, &section.id)
                        .await?;
                    generated += 1;
                }
                Err(err) => {
                    warn!(
                        "Section {} failed for report {}: {}",
                        section.kind.as_str(),
                        report.id,
                        err
                    );
                    failed += 1;
                }
            }
        }

        if generated == 0 && failed > 0 {
            return Err(ReportError::Generation(format!(
                "all {} sections failed",
                failed
            )));
        }

        Ok(RunStats {
            generated,
            failed,
            failed_blocks: failed_blocks.iter().map(|s| s.to_string()).collect(),
            tokens_input,
            tokens_output,
        })
    }
}

fn report_window(report: &Report) -> (DateTime<Utc>, DateTime<Utc>) {
    match (report.period_start, report.period_end) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            let now = Utc::now();
            (now - Duration::days(DEFAULT_WINDOW_DAYS), now)
        }
    }
}

/// One headline per populated block, joined into the summary line
/// readers see in list views.
fn build_summary(insights: &AggregatedInsights) -> Option<String> {
    let headlines: Vec<&str> = insights.blocks().map(|b| b.headline.as_str()).collect();
    if headlines.is_empty() {
        return None;
    }
    Some(vantage_core::truncate(&headlines.join("; "), SUMMARY_MAX_LEN))
}

fn build_kpi_snapshot(insights: &AggregatedInsights) -> serde_json::Value {
    let snapshot_count: i64 = insights.blocks().map(|b| b.snapshot_count).sum();
    serde_json::json!({
        "blockCount": insights.blocks().count(),
        "snapshotCount": snapshot_count,
        "topRisk": insights.top_risk(),
        "refreshedAt": insights.refreshed_at,
    })
}
