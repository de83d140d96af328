// ABOUTME: Report section types and storage layer
// ABOUTME: Pending/generated/edited/approved sections, ordered by position

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::fmt;
use tracing::debug;

use vantage_core::generate_id;
use vantage_storage::StorageError;

use crate::types::ReportFormat;

/// Section templates a report can be assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum SectionKind {
    ExecutiveSummary,
    KeyDevelopments,
    MediaAnalysis,
    CompetitiveLandscape,
    RiskMatrix,
    SentimentTrends,
    Recommendations,
    Appendix,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::ExecutiveSummary => "executive_summary",
            SectionKind::KeyDevelopments => "key_developments",
            SectionKind::MediaAnalysis => "media_analysis",
            SectionKind::CompetitiveLandscape => "competitive_landscape",
            SectionKind::RiskMatrix => "risk_matrix",
            SectionKind::SentimentTrends => "sentiment_trends",
            SectionKind::Recommendations => "recommendations",
            SectionKind::Appendix => "appendix",
        }
    }

    /// Display heading used in rendered output and prompts.
    pub fn heading(&self) -> &'static str {
        match self {
            SectionKind::ExecutiveSummary => "Executive Summary",
            SectionKind::KeyDevelopments => "Key Developments",
            SectionKind::MediaAnalysis => "Media Analysis",
            SectionKind::CompetitiveLandscape => "Competitive Landscape",
            SectionKind::RiskMatrix => "Risk Matrix",
            SectionKind::SentimentTrends => "Sentiment Trends",
            SectionKind::Recommendations => "Recommendations",
            SectionKind::Appendix => "Appendix",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Section plan for a report format, in reading order.
/// `include_recommendations = false` drops the Recommendations entry.
pub fn section_plan(format: ReportFormat, include_recommendations: bool) -> Vec<SectionKind> {
    use SectionKind::*;
    let plan: &[SectionKind] = match format {
        ReportFormat::Briefing => &[ExecutiveSummary, KeyDevelopments, Recommendations],
        ReportFormat::StrategicOverview => &[
            ExecutiveSummary,
            KeyDevelopments,
            MediaAnalysis,
            CompetitiveLandscape,
            RiskMatrix,
            Recommendations,
        ],
        ReportFormat::QuarterlyReview => &[
            ExecutiveSummary,
            MediaAnalysis,
            SentimentTrends,
            CompetitiveLandscape,
            Recommendations,
            Appendix,
        ],
        ReportFormat::BoardPack => &[
            ExecutiveSummary,
            KeyDevelopments,
            RiskMatrix,
            CompetitiveLandscape,
            SentimentTrends,
            Recommendations,
            Appendix,
        ],
        ReportFormat::CrisisRetrospective => &[
            ExecutiveSummary,
            KeyDevelopments,
            RiskMatrix,
            SentimentTrends,
            Recommendations,
        ],
    };

    plan.iter()
        .copied()
        .filter(|kind| include_recommendations || *kind != Recommendations)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum SectionStatus {
    Pending,
    Generated,
    Edited,
    Approved,
}

impl SectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionStatus::Pending => "pending",
            SectionStatus::Generated => "generated",
            SectionStatus::Edited => "edited",
            SectionStatus::Approved => "approved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    #[serde(rename = "reportId")]
    pub report_id: String,
    #[serde(rename = "orgId")]
    pub org_id: String,
    pub kind: SectionKind,
    pub position: i64,
    pub status: SectionStatus,
    #[serde(rename = "contentMarkdown")]
    pub content_markdown: Option<String>,
    #[serde(rename = "contentHtml")]
    pub content_html: Option<String>,
    #[serde(rename = "regenerationCount")]
    pub regeneration_count: i64,
    #[serde(rename = "editedBy")]
    pub edited_by: Option<String>,
    #[serde(rename = "editedAt")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(rename = "tokensInput")]
    pub tokens_input: Option<i64>,
    #[serde(rename = "tokensOutput")]
    pub tokens_output: Option<i64>,
    #[serde(rename = "generationMs")]
    pub generation_ms: Option<i64>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Generated content written back onto a pending or stale section.
#[derive(Debug, Clone)]
pub struct GeneratedContent {
    pub markdown: String,
    pub html: String,
    pub tokens_input: i64,
    pub tokens_output: i64,
    pub generation_ms: i64,
}

pub struct SectionStorage {
    pool: SqlitePool,
}

impl SectionStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a pending section at the given position.
    pub async fn create_pending(
        &self,
        org_id: &str,
        report_id: &str,
        kind: SectionKind,
        position: i64,
    ) -> Result<Section, StorageError> {
        let section_id = generate_id("sec");
        let now = Utc::now();

        debug!(
            "Creating pending section: {} ({}) for report: {}",
            section_id,
            kind.as_str(),
            report_id
        );

        sqlx::query(
            r#"
            INSERT INTO report_sections (
                id, report_id, org_id, kind, position, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&section_id)
        .bind(report_id)
        .bind(org_id)
        .bind(kind)
        .bind(position)
        .bind(SectionStatus::Pending)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        match self.get(org_id, report_id, &section_id).await? {
            Some(section) => Ok(section),
            None => Err(StorageError::NotFound),
        }
    }

    pub async fn get(
        &self,
        org_id: &str,
        report_id: &str,
        section_id: &str,
    ) -> Result<Option<Section>, StorageError> {
        let row = sqlx::query(
            "SELECT * FROM report_sections WHERE id = ? AND report_id = ? AND org_id = ?",
        )
        .bind(section_id)
        .bind(report_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        row.map(|r| self.row_to_section(&r)).transpose()
    }

    /// All sections of a report in reading order.
    pub async fn list_for_report(
        &self,
        org_id: &str,
        report_id: &str,
    ) -> Result<Vec<Section>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM report_sections WHERE report_id = ? AND org_id = ? ORDER BY position ASC",
        )
        .bind(report_id)
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(|row| self.row_to_section(row)).collect()
    }

    /// Write generated content onto a section. Bumps the regeneration
    /// counter and resets any manual-edit attribution.
    pub async fn store_generated(
        &self,
        org_id: &str,
        report_id: &str,
        section_id: &str,
        content: &GeneratedContent,
    ) -> Result<Section, StorageError> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE report_sections SET
                status = ?, content_markdown = ?, content_html = ?,
                regeneration_count = regeneration_count + 1,
                edited_by = NULL, edited_at = NULL,
                tokens_input = ?, tokens_output = ?, generation_ms = ?,
                updated_at = ?
            WHERE id = ? AND report_id = ? AND org_id = ?
            "#,
        )
        .bind(SectionStatus::Generated)
        .bind(&content.markdown)
        .bind(&content.html)
        .bind(content.tokens_input)
        .bind(content.tokens_output)
        .bind(content.generation_ms)
        .bind(now)
        .bind(section_id)
        .bind(report_id)
        .bind(org_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        match self.get(org_id, report_id, section_id).await? {
            Some(section) => Ok(section),
            None => Err(StorageError::NotFound),
        }
    }

    /// Replace content with a manual edit. Markdown and HTML are both
    /// provided by the caller so rendering stays in one place.
    pub async fn store_manual_edit(
        &self,
        org_id: &str,
        report_id: &str,
        section_id: &str,
        markdown: &str,
        html: &str,
        editor: Option<&str>,
    ) -> Result<Section, StorageError> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE report_sections SET
                status = ?, content_markdown = ?, content_html = ?,
                edited_by = ?, edited_at = ?, updated_at = ?
            WHERE id = ? AND report_id = ? AND org_id = ?
            "#,
        )
        .bind(SectionStatus::Edited)
        .bind(markdown)
        .bind(html)
        .bind(editor)
        .bind(now)
        .bind(now)
        .bind(section_id)
        .bind(report_id)
        .bind(org_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        match self.get(org_id, report_id, section_id).await? {
            Some(section) => Ok(section),
            None => Err(StorageError::NotFound),
        }
    }

    /// Reorder all sections of a report in one transaction. `ordered_ids`
    /// must name every section exactly once; otherwise nothing changes.
    pub async fn reorder(
        &self,
        org_id: &str,
        report_id: &str,
        ordered_ids: &[String],
    ) -> Result<Vec<Section>, StorageError> {
        let existing = self.list_for_report(org_id, report_id).await?;

        if existing.len() != ordered_ids.len() {
            return Err(StorageError::InvalidValue(format!(
                "reorder must name all {} sections, got {}",
                existing.len(),
                ordered_ids.len()
            )));
        }
        for section in &existing {
            if !ordered_ids.contains(&section.id) {
                return Err(StorageError::InvalidValue(format!(
                    "reorder is missing section {}",
                    section.id
                )));
            }
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        for (position, section_id) in ordered_ids.iter().enumerate() {
            sqlx::query(
                "UPDATE report_sections SET position = ?, updated_at = ? \
                 WHERE id = ? AND report_id = ? AND org_id = ?",
            )
            .bind(position as i64)
            .bind(now)
            .bind(section_id)
            .bind(report_id)
            .bind(org_id)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Sqlx)?;
        }

        tx.commit().await.map_err(StorageError::Sqlx)?;

        self.list_for_report(org_id, report_id).await
    }

    fn row_to_section(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Section, StorageError> {
        Ok(Section {
            id: row.try_get("id").map_err(StorageError::Sqlx)?,
            report_id: row.try_get("report_id").map_err(StorageError::Sqlx)?,
            org_id: row.try_get("org_id").map_err(StorageError::Sqlx)?,
            kind: row.try_get("kind").map_err(StorageError::Sqlx)?,
            position: row.try_get("position").map_err(StorageError::Sqlx)?,
            status: row.try_get("status").map_err(StorageError::Sqlx)?,
            content_markdown: row
                .try_get("content_markdown")
                .map_err(StorageError::Sqlx)?,
            content_html: row.try_get("content_html").map_err(StorageError::Sqlx)?,
            regeneration_count: row
                .try_get("regeneration_count")
                .map_err(StorageError::Sqlx)?,
            edited_by: row.try_get("edited_by").map_err(StorageError::Sqlx)?,
            edited_at: row.try_get("edited_at").map_err(StorageError::Sqlx)?,
            tokens_input: row.try_get("tokens_input").map_err(StorageError::Sqlx)?,
            tokens_output: row.try_get("tokens_output").map_err(StorageError::Sqlx)?,
            generation_ms: row.try_get("generation_ms").map_err(StorageError::Sqlx)?,
            created_at: row.try_get("created_at").map_err(StorageError::Sqlx)?,
            updated_at: row.try_get("updated_at").map_err(StorageError::Sqlx)?,
        })
    }
}
