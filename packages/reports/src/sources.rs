// ABOUTME: Report source attachment storage
// ABOUTME: Which feed snapshots informed a report, and which sections consumed them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use vantage_core::generate_id;
use vantage_insights::{SourceCandidate, SourceSystem};
use vantage_storage::StorageError;

/// A feed item cited by a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    #[serde(rename = "reportId")]
    pub report_id: String,
    #[serde(rename = "orgId")]
    pub org_id: String,
    pub system: SourceSystem,
    #[serde(rename = "sourceRef")]
    pub source_ref: String,
    #[serde(rename = "relevanceScore")]
    pub relevance_score: f64,
    #[serde(rename = "qualityScore")]
    pub quality_score: f64,
    #[serde(rename = "isPrimary")]
    pub is_primary: bool,
    /// Section ids that used this source during generation.
    #[serde(rename = "consumedBy")]
    pub consumed_by: Vec<String>,
    #[serde(rename = "attachedAt")]
    pub attached_at: DateTime<Utc>,
}

pub struct SourceStorage {
    pool: SqlitePool,
}

impl SourceStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Attach aggregation candidates to a report. Re-attaching the same
    /// (system, source_ref) refreshes its scores instead of duplicating,
    /// so repeated insight refreshes stay idempotent.
    pub async fn attach(
        &self,
        org_id: &str,
        report_id: &str,
        candidates: &[SourceCandidate],
    ) -> Result<(), StorageError> {
        if candidates.is_empty() {
            return Ok(());
        }

        debug!(
            "Attaching {} sources to report: {}",
            candidates.len(),
            report_id
        );

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        for candidate in candidates {
            let source_id = generate_id("src");
            sqlx::query(
                r#"
                INSERT INTO report_sources (
                    id, report_id, org_id, system, source_ref,
                    relevance_score, quality_score, is_primary, consumed_by, attached_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, '[]', ?)
                ON CONFLICT(report_id, system, source_ref) DO UPDATE SET
                    relevance_score = excluded.relevance_score,
                    quality_score = excluded.quality_score,
                    is_primary = excluded.is_primary,
                    attached_at = excluded.attached_at
                "#,
            )
            .bind(&source_id)
            .bind(report_id)
            .bind(org_id)
            .bind(candidate.system)
            .bind(&candidate.source_ref)
            .bind(candidate.relevance_score)
            .bind(candidate.quality_score)
            .bind(candidate.is_primary)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Sqlx)?;
        }

        tx.commit().await.map_err(StorageError::Sqlx)
    }

    /// Sources of a report, primaries first, then by relevance.
    pub async fn list_for_report(
        &self,
        org_id: &str,
        report_id: &str,
    ) -> Result<Vec<Source>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM report_sources WHERE report_id = ? AND org_id = ? \
             ORDER BY is_primary DESC, relevance_score DESC",
        )
        .bind(report_id)
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(|row| self.row_to_source(row)).collect()
    }

    /// Record that `section_id` consumed every attached source from the
    /// given systems. Append-only per source; duplicates are skipped.
    pub async fn mark_consumed(
        &self,
        org_id: &str,
        report_id: &str,
        systems: &[SourceSystem],
        section_id: &str,
    ) -> Result<(), StorageError> {
        if systems.is_empty() {
            return Ok(());
        }

        let sources = self.list_for_report(org_id, report_id).await?;

        for source in sources {
            if !systems.contains(&source.system) || source.consumed_by.iter().any(|s| s == section_id)
            {
                continue;
            }

            let mut consumed = source.consumed_by.clone();
            consumed.push(section_id.to_string());
            let consumed_json = serde_json::to_string(&consumed).map_err(StorageError::Json)?;

            sqlx::query("UPDATE report_sources SET consumed_by = ? WHERE id = ? AND org_id = ?")
                .bind(consumed_json)
                .bind(&source.id)
                .bind(org_id)
                .execute(&self.pool)
                .await
                .map_err(StorageError::Sqlx)?;
        }

        Ok(())
    }

    fn row_to_source(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Source, StorageError> {
        let consumed_by: String = row.try_get("consumed_by").map_err(StorageError::Sqlx)?;

        Ok(Source {
            id: row.try_get("id").map_err(StorageError::Sqlx)?,
            report_id: row.try_get("report_id").map_err(StorageError::Sqlx)?,
            org_id: row.try_get("org_id").map_err(StorageError::Sqlx)?,
            system: row.try_get("system").map_err(StorageError::Sqlx)?,
            source_ref: row.try_get("source_ref").map_err(StorageError::Sqlx)?,
            relevance_score: row.try_get("relevance_score").map_err(StorageError::Sqlx)?,
            quality_score: row.try_get("quality_score").map_err(StorageError::Sqlx)?,
            is_primary: row.try_get("is_primary").map_err(StorageError::Sqlx)?,
            consumed_by: serde_json::from_str(&consumed_by).unwrap_or_default(),
            attached_at: row.try_get("attached_at").map_err(StorageError::Sqlx)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (SourceStorage, SqlitePool) {
        let pool = vantage_storage::connect_memory().await.unwrap();
        vantage_storage::run_migrations(&pool).await.unwrap();
        (SourceStorage::new(pool.clone()), pool)
    }

    async fn seed_report(pool: &SqlitePool, org_id: &str, report_id: &str) {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO reports (id, org_id, title, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(report_id)
        .bind(org_id)
        .bind("Seed report")
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
    }

    fn candidate(system: SourceSystem, source_ref: &str, relevance: f64, primary: bool) -> SourceCandidate {
        SourceCandidate {
            system,
            source_ref: source_ref.to_string(),
            relevance_score: relevance,
            quality_score: 0.8,
            is_primary: primary,
        }
    }

    #[tokio::test]
    async fn test_attach_orders_primaries_first() {
        let (storage, pool) = setup().await;
        seed_report(&pool, "org-1", "rpt-1").await;

        storage
            .attach(
                "org-1",
                "rpt-1",
                &[
                    candidate(SourceSystem::MediaMonitoring, "mm-2", 0.4, false),
                    candidate(SourceSystem::MediaMonitoring, "mm-1", 0.9, true),
                    candidate(SourceSystem::CrisisDetection, "cd-1", 0.7, true),
                ],
            )
            .await
            .unwrap();

        let sources = storage.list_for_report("org-1", "rpt-1").await.unwrap();
        assert_eq!(sources.len(), 3);
        assert!(sources[0].is_primary);
        assert!(sources[1].is_primary);
        assert!(!sources[2].is_primary);
        assert_eq!(sources[0].source_ref, "mm-1");
    }

    #[tokio::test]
    async fn test_reattach_updates_instead_of_duplicating() {
        let (storage, pool) = setup().await;
        seed_report(&pool, "org-1", "rpt-1").await;

        storage
            .attach(
                "org-1",
                "rpt-1",
                &[candidate(SourceSystem::BrandHealth, "bh-1", 0.5, false)],
            )
            .await
            .unwrap();
        storage
            .attach(
                "org-1",
                "rpt-1",
                &[candidate(SourceSystem::BrandHealth, "bh-1", 0.9, true)],
            )
            .await
            .unwrap();

        let sources = storage.list_for_report("org-1", "rpt-1").await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].relevance_score, 0.9);
        assert!(sources[0].is_primary);
    }

    #[tokio::test]
    async fn test_mark_consumed_appends_once() {
        let (storage, pool) = setup().await;
        seed_report(&pool, "org-1", "rpt-1").await;

        storage
            .attach(
                "org-1",
                "rpt-1",
                &[
                    candidate(SourceSystem::CompetitiveIntel, "ci-1", 0.8, true),
                    candidate(SourceSystem::BrandHealth, "bh-1", 0.6, true),
                ],
            )
            .await
            .unwrap();

        storage
            .mark_consumed("org-1", "rpt-1", &[SourceSystem::CompetitiveIntel], "sec-1")
            .await
            .unwrap();
        storage
            .mark_consumed("org-1", "rpt-1", &[SourceSystem::CompetitiveIntel], "sec-1")
            .await
            .unwrap();
        storage
            .mark_consumed("org-1", "rpt-1", &[SourceSystem::CompetitiveIntel], "sec-2")
            .await
            .unwrap();

        let sources = storage.list_for_report("org-1", "rpt-1").await.unwrap();
        let ci = sources
            .iter()
            .find(|s| s.system == SourceSystem::CompetitiveIntel)
            .unwrap();
        assert_eq!(ci.consumed_by, vec!["sec-1", "sec-2"]);

        let bh = sources
            .iter()
            .find(|s| s.system == SourceSystem::BrandHealth)
            .unwrap();
        assert!(bh.consumed_by.is_empty());
    }

    #[tokio::test]
    async fn test_sources_cascade_with_report() {
        let (storage, pool) = setup().await;
        seed_report(&pool, "org-1", "rpt-1").await;

        storage
            .attach(
                "org-1",
                "rpt-1",
                &[candidate(SourceSystem::Governance, "gov-1", 0.5, true)],
            )
            .await
            .unwrap();

        sqlx::query("DELETE FROM reports WHERE id = 'rpt-1'")
            .execute(&pool)
            .await
            .unwrap();

        let sources = storage.list_for_report("org-1", "rpt-1").await.unwrap();
        assert!(sources.is_empty());
    }
}
