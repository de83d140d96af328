// ABOUTME: Report row storage: CRUD, filtered listing, CAS status transitions
// ABOUTME: Everything is tenant-scoped; every write bumps the row version

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use vantage_core::generate_id;
use vantage_storage::StorageError;

use crate::audit::{insert_entry, NewAuditEntry};
use crate::types::{Report, ReportCreateInput, ReportFilter, ReportStatus, ReportUpdateInput};

/// Result of a compare-and-set status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    /// Row exists, but its status was none of the expected states.
    Conflict(ReportStatus),
    NotFound,
}

pub struct ReportStorage {
    pool: SqlitePool,
}

impl ReportStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new report at `draft`. The `created` audit entry rides
    /// the same transaction as the insert.
    pub async fn create(
        &self,
        org_id: &str,
        input: ReportCreateInput,
        created_by: Option<&str>,
        entry: NewAuditEntry,
    ) -> Result<Report, StorageError> {
        let now = Utc::now();
        let report = Report {
            id: generate_id("rpt"),
            org_id: org_id.to_string(),
            title: input.title.trim().to_string(),
            description: input.description,
            format: input.format.unwrap_or_default(),
            audience: input.audience.unwrap_or_default(),
            status: ReportStatus::Draft,
            period_start: input.period_start,
            period_end: input.period_end,
            tone: input.tone.unwrap_or_default(),
            target_length: input.target_length.unwrap_or_default(),
            include_recommendations: input.include_recommendations.unwrap_or(true),
            include_metrics: input.include_metrics.unwrap_or(true),
            include_sources: input.include_sources.unwrap_or(true),
            summary: None,
            kpi_snapshot: None,
            insights_refreshed_at: None,
            approved_by: None,
            published_at: None,
            created_by: created_by.map(str::to_string),
            updated_by: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        debug!("Creating report {} for org {}", report.id, org_id);

        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO reports (
                id, org_id, title, description, format, audience, status,
                period_start, period_end, tone, target_length,
                include_recommendations, include_metrics, include_sources,
                created_by, version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.id)
        .bind(&report.org_id)
        .bind(&report.title)
        .bind(&report.description)
        .bind(report.format)
        .bind(report.audience)
        .bind(report.status)
        .bind(report.period_start)
        .bind(report.period_end)
        .bind(report.tone)
        .bind(report.target_length)
        .bind(report.include_recommendations)
        .bind(report.include_metrics)
        .bind(report.include_sources)
        .bind(&report.created_by)
        .bind(report.version)
        .bind(report.created_at)
        .bind(report.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::Sqlx)?;

        insert_entry(&mut *tx, org_id, &report.id, entry).await?;

        tx.commit().await.map_err(StorageError::Sqlx)?;

        Ok(report)
    }

    /// Get a single report by ID, scoped to the org.
    pub async fn get(&self, org_id: &str, report_id: &str) -> Result<Option<Report>, StorageError> {
        let row = sqlx::query("SELECT * FROM reports WHERE id = ? AND org_id = ?")
            .bind(report_id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        row.map(|r| self.row_to_report(&r)).transpose()
    }

    /// Filtered listing with a total count for pagination.
    pub async fn list(
        &self,
        org_id: &str,
        filter: &ReportFilter,
    ) -> Result<(Vec<Report>, i64), StorageError> {
        let mut conditions = vec!["org_id = ?".to_string()];

        if filter.status.is_some() {
            conditions.push("status = ?".to_string());
        }
        if filter.format.is_some() {
            conditions.push("format = ?".to_string());
        }
        if filter.audience.is_some() {
            conditions.push("audience = ?".to_string());
        }
        // Period overlap: an unset report bound never excludes the row.
        if filter.from.is_some() {
            conditions.push("(period_end IS NULL OR period_end >= ?)".to_string());
        }
        if filter.to.is_some() {
            conditions.push("(period_start IS NULL OR period_start <= ?)".to_string());
        }
        if filter.search.is_some() {
            conditions.push("(title LIKE ? OR description LIKE ?)".to_string());
        }

        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) as count FROM reports WHERE {}", where_clause);
        let count_row = Self::bind_filter(sqlx::query(&count_sql), org_id, filter)
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;
        let total: i64 = count_row.try_get("count").map_err(StorageError::Sqlx)?;

        let mut list_sql = format!(
            "SELECT * FROM reports WHERE {} ORDER BY {}",
            where_clause,
            filter.order_clause()
        );
        if let Some(limit) = filter.limit {
            list_sql.push_str(&format!(" LIMIT {}", limit));
            if let Some(offset) = filter.offset {
                list_sql.push_str(&format!(" OFFSET {}", offset));
            }
        }

        let rows = Self::bind_filter(sqlx::query(&list_sql), org_id, filter)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        let reports = rows
            .iter()
            .map(|row| self.row_to_report(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((reports, total))
    }

    /// Bind listing filter values in the same order the WHERE clause
    /// names them.
    fn bind_filter<'q>(
        mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        org_id: &'q str,
        filter: &'q ReportFilter,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        query = query.bind(org_id);
        if let Some(status) = filter.status {
            query = query.bind(status);
        }
        if let Some(format) = filter.format {
            query = query.bind(format);
        }
        if let Some(audience) = filter.audience {
            query = query.bind(audience);
        }
        if let Some(from) = filter.from {
            query = query.bind(from);
        }
        if let Some(to) = filter.to {
            query = query.bind(to);
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", search);
            query = query.bind(pattern.clone()).bind(pattern);
        }
        query
    }

    /// Patch mutable fields. Status is never touched here. Returns the
    /// updated report, or `None` when the row is absent or foreign.
    pub async fn update_fields(
        &self,
        org_id: &str,
        report_id: &str,
        input: &ReportUpdateInput,
        updated_by: Option<&str>,
    ) -> Result<Option<Report>, StorageError> {
        if input.is_empty() {
            return self.get(org_id, report_id).await;
        }

        let now = Utc::now();
        let mut query_str = String::from(
            "UPDATE reports SET updated_at = ?, updated_by = ?, version = version + 1, ",
        );
        let mut updates = Vec::new();

        if input.title.is_some() {
            updates.push("title = ?");
        }
        if input.description.is_some() {
            updates.push("description = ?");
        }
        if input.format.is_some() {
            updates.push("format = ?");
        }
        if input.audience.is_some() {
            updates.push("audience = ?");
        }
        if input.period_start.is_some() {
            updates.push("period_start = ?");
        }
        if input.period_end.is_some() {
            updates.push("period_end = ?");
        }
        if input.tone.is_some() {
            updates.push("tone = ?");
        }
        if input.target_length.is_some() {
            updates.push("target_length = ?");
        }
        if input.include_recommendations.is_some() {
            updates.push("include_recommendations = ?");
        }
        if input.include_metrics.is_some() {
            updates.push("include_metrics = ?");
        }
        if input.include_sources.is_some() {
            updates.push("include_sources = ?");
        }
        if input.summary.is_some() {
            updates.push("summary = ?");
        }

        query_str.push_str(&updates.join(", "));
        query_str.push_str(" WHERE id = ? AND org_id = ?");

        let mut query = sqlx::query(&query_str).bind(now).bind(updated_by);

        // Bind parameters in the same order
        if let Some(title) = &input.title {
            query = query.bind(title);
        }
        if let Some(description) = &input.description {
            query = query.bind(description);
        }
        if let Some(format) = input.format {
            query = query.bind(format);
        }
        if let Some(audience) = input.audience {
            query = query.bind(audience);
        }
        if let Some(period_start) = input.period_start {
            query = query.bind(period_start);
        }
        if let Some(period_end) = input.period_end {
            query = query.bind(period_end);
        }
        if let Some(tone) = input.tone {
            query = query.bind(tone);
        }
        if let Some(target_length) = input.target_length {
            query = query.bind(target_length);
        }
        if let Some(include_recommendations) = input.include_recommendations {
            query = query.bind(include_recommendations);
        }
        if let Some(include_metrics) = input.include_metrics {
            query = query.bind(include_metrics);
        }
        if let Some(include_sources) = input.include_sources {
            query = query.bind(include_sources);
        }
        if let Some(summary) = &input.summary {
            query = query.bind(summary);
        }

        let result = query
            .bind(report_id)
            .bind(org_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get(org_id, report_id).await
    }

    /// Compare-and-set status transition. The UPDATE only fires when the
    /// current status is one of `expected`; on a miss the row is re-read
    /// so the caller can report the actual state.
    pub async fn transition(
        &self,
        org_id: &str,
        report_id: &str,
        expected: &[ReportStatus],
        to: ReportStatus,
        actor_email: Option<&str>,
    ) -> Result<TransitionOutcome, StorageError> {
        if expected.is_empty() {
            return Err(StorageError::InvalidValue(
                "transition requires at least one expected status".to_string(),
            ));
        }

        let now = Utc::now();
        let placeholders = vec!["?"; expected.len()].join(", ");

        let mut sets = vec![
            "status = ?",
            "updated_at = ?",
            "updated_by = ?",
            "version = version + 1",
        ];
        match to {
            ReportStatus::Approved => sets.push("approved_by = ?"),
            ReportStatus::Published => sets.push("published_at = ?"),
            _ => {}
        }

        let query_str = format!(
            "UPDATE reports SET {} WHERE id = ? AND org_id = ? AND status IN ({})",
            sets.join(", "),
            placeholders
        );

        let mut query = sqlx::query(&query_str).bind(to).bind(now).bind(actor_email);
        match to {
            ReportStatus::Approved => query = query.bind(actor_email),
            ReportStatus::Published => query = query.bind(now),
            _ => {}
        }
        query = query.bind(report_id).bind(org_id);
        for status in expected {
            query = query.bind(*status);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        if result.rows_affected() > 0 {
            debug!("Report {} transitioned to {}", report_id, to);
            return Ok(TransitionOutcome::Applied);
        }

        let row = sqlx::query("SELECT status FROM reports WHERE id = ? AND org_id = ?")
            .bind(report_id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => Ok(TransitionOutcome::Conflict(
                row.try_get("status").map_err(StorageError::Sqlx)?,
            )),
            None => Ok(TransitionOutcome::NotFound),
        }
    }

    /// Cache an aggregation result on the report, optionally together
    /// with the derived summary and KPI snapshot.
    pub async fn store_insights(
        &self,
        org_id: &str,
        report_id: &str,
        insights: &serde_json::Value,
        summary: Option<&str>,
        kpi_snapshot: Option<&serde_json::Value>,
    ) -> Result<bool, StorageError> {
        let now = Utc::now();
        let mut query_str = String::from(
            "UPDATE reports SET insights_json = ?, insights_refreshed_at = ?, \
             updated_at = ?, version = version + 1",
        );
        if summary.is_some() {
            query_str.push_str(", summary = ?");
        }
        if kpi_snapshot.is_some() {
            query_str.push_str(", kpi_snapshot = ?");
        }
        query_str.push_str(" WHERE id = ? AND org_id = ?");

        let insights_json = serde_json::to_string(insights).map_err(StorageError::Json)?;
        let mut query = sqlx::query(&query_str).bind(insights_json).bind(now).bind(now);
        if let Some(summary) = summary {
            query = query.bind(summary);
        }
        if let Some(kpi) = kpi_snapshot {
            query = query.bind(serde_json::to_string(kpi).map_err(StorageError::Json)?);
        }

        let result = query
            .bind(report_id)
            .bind(org_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// The cached aggregation, if one has been stored.
    pub async fn cached_insights(
        &self,
        org_id: &str,
        report_id: &str,
    ) -> Result<Option<(serde_json::Value, DateTime<Utc>)>, StorageError> {
        let row = sqlx::query(
            "SELECT insights_json, insights_refreshed_at FROM reports WHERE id = ? AND org_id = ?",
        )
        .bind(report_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let json: Option<String> = row.try_get("insights_json").map_err(StorageError::Sqlx)?;
        let refreshed_at: Option<DateTime<Utc>> = row
            .try_get("insights_refreshed_at")
            .map_err(StorageError::Sqlx)?;

        match (json, refreshed_at) {
            (Some(json), Some(at)) => {
                let value = serde_json::from_str(&json).map_err(StorageError::Json)?;
                Ok(Some((value, at)))
            }
            _ => Ok(None),
        }
    }

    /// Hard delete. Sections and sources cascade; the final `deleted`
    /// audit entry rides the same transaction, and earlier entries stay.
    pub async fn delete(
        &self,
        org_id: &str,
        report_id: &str,
        entry: NewAuditEntry,
    ) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        let result = sqlx::query("DELETE FROM reports WHERE id = ? AND org_id = ?")
            .bind(report_id)
            .bind(org_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        insert_entry(&mut *tx, org_id, report_id, entry).await?;

        tx.commit().await.map_err(StorageError::Sqlx)?;

        debug!("Hard deleted report {} for org {}", report_id, org_id);
        Ok(true)
    }

    fn row_to_report(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Report, StorageError> {
        let kpi_snapshot: Option<String> = row.try_get("kpi_snapshot").map_err(StorageError::Sqlx)?;

        Ok(Report {
            id: row.try_get("id").map_err(StorageError::Sqlx)?,
            org_id: row.try_get("org_id").map_err(StorageError::Sqlx)?,
            title: row.try_get("title").map_err(StorageError::Sqlx)?,
            description: row.try_get("description").map_err(StorageError::Sqlx)?,
            format: row.try_get("format").map_err(StorageError::Sqlx)?,
            audience: row.try_get("audience").map_err(StorageError::Sqlx)?,
            status: row.try_get("status").map_err(StorageError::Sqlx)?,
            period_start: row.try_get("period_start").map_err(StorageError::Sqlx)?,
            period_end: row.try_get("period_end").map_err(StorageError::Sqlx)?,
            tone: row.try_get("tone").map_err(StorageError::Sqlx)?,
            target_length: row.try_get("target_length").map_err(StorageError::Sqlx)?,
            include_recommendations: row
                .try_get("include_recommendations")
                .map_err(StorageError::Sqlx)?,
            include_metrics: row.try_get("include_metrics").map_err(StorageError::Sqlx)?,
            include_sources: row.try_get("include_sources").map_err(StorageError::Sqlx)?,
            summary: row.try_get("summary").map_err(StorageError::Sqlx)?,
            kpi_snapshot: kpi_snapshot.and_then(|s| serde_json::from_str(&s).ok()),
            insights_refreshed_at: row
                .try_get("insights_refreshed_at")
                .map_err(StorageError::Sqlx)?,
            approved_by: row.try_get("approved_by").map_err(StorageError::Sqlx)?,
            published_at: row.try_get("published_at").map_err(StorageError::Sqlx)?,
            created_by: row.try_get("created_by").map_err(StorageError::Sqlx)?,
            updated_by: row.try_get("updated_by").map_err(StorageError::Sqlx)?,
            version: row.try_get("version").map_err(StorageError::Sqlx)?,
            created_at: row.try_get("created_at").map_err(StorageError::Sqlx)?,
            updated_at: row.try_get("updated_at").map_err(StorageError::Sqlx)?,
        })
    }
}
