// ABOUTME: Insight snapshot storage layer using SQLite
// ABOUTME: Ingest, risk radar listing, and windowed reads for aggregation

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use vantage_core::generate_id;
use vantage_storage::StorageError;

use crate::types::{InsightSnapshot, SnapshotCreateInput, SnapshotFilter, SourceSystem};

const DEFAULT_SCORE: f64 = 0.5;

pub struct SnapshotStorage {
    pool: SqlitePool,
}

impl SnapshotStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ingest one snapshot. `captured_at` defaults to now, scores to 0.5.
    pub async fn create(
        &self,
        org_id: &str,
        input: SnapshotCreateInput,
    ) -> Result<InsightSnapshot, StorageError> {
        let snapshot_id = generate_id("snap");
        let now = Utc::now();
        let captured_at = input.captured_at.unwrap_or(now);
        let metrics_json = match &input.metrics {
            Some(value) => Some(serde_json::to_string(value).map_err(StorageError::Json)?),
            None => None,
        };

        debug!(
            "Creating snapshot: {} from {} for org: {}",
            snapshot_id,
            input.system.as_str(),
            org_id
        );

        sqlx::query(
            r#"
            INSERT INTO insight_snapshots (
                id, org_id, system, source_ref, title, summary, risk_level,
                relevance_score, quality_score, metrics, captured_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot_id)
        .bind(org_id)
        .bind(input.system)
        .bind(&input.source_ref)
        .bind(&input.title)
        .bind(&input.summary)
        .bind(input.risk_level)
        .bind(input.relevance_score.unwrap_or(DEFAULT_SCORE))
        .bind(input.quality_score.unwrap_or(DEFAULT_SCORE))
        .bind(metrics_json)
        .bind(captured_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        match self.get(org_id, &snapshot_id).await? {
            Some(snapshot) => Ok(snapshot),
            None => Err(StorageError::NotFound),
        }
    }

    /// Get a single snapshot by ID, scoped to the org.
    pub async fn get(
        &self,
        org_id: &str,
        snapshot_id: &str,
    ) -> Result<Option<InsightSnapshot>, StorageError> {
        let row = sqlx::query("SELECT * FROM insight_snapshots WHERE id = ? AND org_id = ?")
            .bind(snapshot_id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        row.map(|r| self.row_to_snapshot(&r)).transpose()
    }

    /// Risk radar listing: filters AND-composed, newest capture first.
    pub async fn list(
        &self,
        org_id: &str,
        filter: &SnapshotFilter,
    ) -> Result<(Vec<InsightSnapshot>, i64), StorageError> {
        let mut conditions = vec!["org_id = ?".to_string()];

        if filter.system.is_some() {
            conditions.push("system = ?".to_string());
        }
        if filter.risk_level.is_some() {
            conditions.push("risk_level = ?".to_string());
        }
        if filter.captured_from.is_some() {
            conditions.push("captured_at >= ?".to_string());
        }
        if filter.captured_to.is_some() {
            conditions.push("captured_at <= ?".to_string());
        }
        if filter.search.is_some() {
            conditions.push("(title LIKE ? OR summary LIKE ?)".to_string());
        }

        let where_clause = conditions.join(" AND ");

        let count_sql = format!(
            "SELECT COUNT(*) as count FROM insight_snapshots WHERE {}",
            where_clause
        );
        let count_row = Self::bind_filter(sqlx::query(&count_sql), org_id, filter)
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;
        let total: i64 = count_row.try_get("count").map_err(StorageError::Sqlx)?;

        let mut list_sql = format!(
            "SELECT * FROM insight_snapshots WHERE {} ORDER BY captured_at DESC",
            where_clause
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

        let snapshots = rows
            .iter()
            .map(|row| self.row_to_snapshot(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((snapshots, total))
    }

    /// Bind listing filter values in the same order the WHERE clause
    /// names them.
    fn bind_filter<'q>(
        mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        org_id: &'q str,
        filter: &'q SnapshotFilter,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        query = query.bind(org_id);
        if let Some(system) = filter.system {
            query = query.bind(system);
        }
        if let Some(risk) = filter.risk_level {
            query = query.bind(risk);
        }
        if let Some(from) = filter.captured_from {
            query = query.bind(from);
        }
        if let Some(to) = filter.captured_to {
            query = query.bind(to);
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", search);
            query = query.bind(pattern.clone()).bind(pattern);
        }
        query
    }

    /// Snapshots for a set of systems inside a capture window, most
    /// relevant first. Used by the aggregator.
    pub async fn list_for_systems(
        &self,
        org_id: &str,
        systems: &[SourceSystem],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<InsightSnapshot>, StorageError> {
        if systems.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; systems.len()].join(", ");
        let sql = format!(
            "SELECT * FROM insight_snapshots \
             WHERE org_id = ? AND system IN ({}) AND captured_at >= ? AND captured_at <= ? \
             ORDER BY relevance_score DESC, captured_at DESC LIMIT {}",
            placeholders, limit
        );

        let mut query = sqlx::query(&sql).bind(org_id);
        for system in systems {
            query = query.bind(*system);
        }
        query = query.bind(from).bind(to);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        rows.iter().map(|row| self.row_to_snapshot(row)).collect()
    }

    /// Delete a snapshot. Returns false when it never existed (or
    /// belongs to another org).
    pub async fn delete(&self, org_id: &str, snapshot_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM insight_snapshots WHERE id = ? AND org_id = ?")
            .bind(snapshot_id)
            .bind(org_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    fn row_to_snapshot(
        &self,
        row: &sqlx::sqlite::SqliteRow,
    ) -> Result<InsightSnapshot, StorageError> {
        let metrics: Option<String> = row.try_get("metrics").map_err(StorageError::Sqlx)?;

        Ok(InsightSnapshot {
            id: row.try_get("id").map_err(StorageError::Sqlx)?,
            org_id: row.try_get("org_id").map_err(StorageError::Sqlx)?,
            system: row.try_get("system").map_err(StorageError::Sqlx)?,
            source_ref: row.try_get("source_ref").map_err(StorageError::Sqlx)?,
            title: row.try_get("title").map_err(StorageError::Sqlx)?,
            summary: row.try_get("summary").map_err(StorageError::Sqlx)?,
            risk_level: row.try_get("risk_level").map_err(StorageError::Sqlx)?,
            relevance_score: row.try_get("relevance_score").map_err(StorageError::Sqlx)?,
            quality_score: row.try_get("quality_score").map_err(StorageError::Sqlx)?,
            metrics: metrics.and_then(|s| serde_json::from_str(&s).ok()),
            captured_at: row.try_get("captured_at").map_err(StorageError::Sqlx)?,
            created_at: row.try_get("created_at").map_err(StorageError::Sqlx)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RiskLevel;
    use chrono::Duration;

    async fn setup_test_db() -> SnapshotStorage {
        let pool = vantage_storage::connect_memory().await.unwrap();
        vantage_storage::run_migrations(&pool).await.unwrap();
        SnapshotStorage::new(pool)
    }

    fn input(system: SourceSystem, source_ref: &str, title: &str) -> SnapshotCreateInput {
        SnapshotCreateInput {
            system,
            source_ref: source_ref.to_string(),
            title: title.to_string(),
            summary: None,
            risk_level: None,
            relevance_score: None,
            quality_score: None,
            metrics: None,
            captured_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let storage = setup_test_db().await;

        let snapshot = storage
            .create("org-1", input(SourceSystem::MediaMonitoring, "mm-1", "Coverage spike"))
            .await
            .unwrap();

        assert!(snapshot.id.starts_with("snap-"));
        assert_eq!(snapshot.relevance_score, 0.5);
        assert_eq!(snapshot.quality_score, 0.5);
        assert!(snapshot.risk_level.is_none());
        assert_eq!(snapshot.captured_at, snapshot.created_at);
    }

    #[tokio::test]
    async fn test_get_is_tenant_scoped() {
        let storage = setup_test_db().await;

        let snapshot = storage
            .create("org-1", input(SourceSystem::BrandHealth, "bh-1", "NPS dip"))
            .await
            .unwrap();

        assert!(storage.get("org-1", &snapshot.id).await.unwrap().is_some());
        assert!(storage.get("org-2", &snapshot.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_filters_compose() {
        let storage = setup_test_db().await;

        let mut crisis = input(SourceSystem::CrisisDetection, "cd-1", "Recall chatter");
        crisis.risk_level = Some(RiskLevel::Critical);
        storage.create("org-1", crisis).await.unwrap();

        let mut media = input(SourceSystem::MediaMonitoring, "mm-1", "Feature article");
        media.risk_level = Some(RiskLevel::Low);
        storage.create("org-1", media).await.unwrap();

        storage
            .create("org-2", input(SourceSystem::CrisisDetection, "cd-9", "Other org"))
            .await
            .unwrap();

        let (all, total) = storage.list("org-1", &SnapshotFilter::default()).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(all.len(), 2);

        let filter = SnapshotFilter {
            system: Some(SourceSystem::CrisisDetection),
            risk_level: Some(RiskLevel::Critical),
            ..Default::default()
        };
        let (filtered, total) = storage.list("org-1", &filter).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(filtered[0].source_ref, "cd-1");

        let filter = SnapshotFilter {
            search: Some("recall".to_string()),
            ..Default::default()
        };
        let (searched, _) = storage.list("org-1", &filter).await.unwrap();
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].title, "Recall chatter");
    }

    #[tokio::test]
    async fn test_list_window_and_pagination() {
        let storage = setup_test_db().await;
        let now = Utc::now();

        for day in 0..5 {
            let mut snap = input(
                SourceSystem::SocialListening,
                &format!("sl-{day}"),
                &format!("Mention wave {day}"),
            );
            snap.captured_at = Some(now - Duration::days(day));
            storage.create("org-1", snap).await.unwrap();
        }

        let filter = SnapshotFilter {
            captured_from: Some(now - Duration::days(2) - Duration::hours(1)),
            ..Default::default()
        };
        let (windowed, total) = storage.list("org-1", &filter).await.unwrap();
        assert_eq!(total, 3);
        // Newest first
        assert_eq!(windowed[0].source_ref, "sl-0");

        let filter = SnapshotFilter {
            limit: Some(2),
            offset: Some(2),
            ..Default::default()
        };
        let (page, total) = storage.list("org-1", &filter).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].source_ref, "sl-2");
    }

    #[tokio::test]
    async fn test_list_for_systems_orders_by_relevance() {
        let storage = setup_test_db().await;
        let now = Utc::now();

        for (source_ref, relevance) in [("a", 0.2), ("b", 0.9), ("c", 0.6)] {
            let mut snap = input(SourceSystem::CompetitiveIntel, source_ref, source_ref);
            snap.relevance_score = Some(relevance);
            storage.create("org-1", snap).await.unwrap();
        }

        let snapshots = storage
            .list_for_systems(
                "org-1",
                &[SourceSystem::CompetitiveIntel, SourceSystem::AnalystCoverage],
                now - Duration::days(7),
                now + Duration::minutes(1),
                10,
            )
            .await
            .unwrap();

        let refs: Vec<&str> = snapshots.iter().map(|s| s.source_ref.as_str()).collect();
        assert_eq!(refs, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = setup_test_db().await;

        let snapshot = storage
            .create("org-1", input(SourceSystem::Governance, "gov-1", "Policy update"))
            .await
            .unwrap();

        assert!(!storage.delete("org-2", &snapshot.id).await.unwrap());
        assert!(storage.delete("org-1", &snapshot.id).await.unwrap());
        assert!(!storage.delete("org-1", &snapshot.id).await.unwrap());
    }
}
