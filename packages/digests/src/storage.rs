// ABOUTME: Digest storage layer using SQLite
// ABOUTME: Shell CRUD, recipient roster upserts, due-for-delivery reads, delivery bookkeeping

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use vantage_core::generate_id;
use vantage_storage::StorageError;

use crate::types::{
    DeliveryOutcome, DeliveryRecord, Digest, DigestCreateInput, DigestFilter, DigestStats,
    DigestStatus, DigestUpdateInput, Recipient, RecipientInput,
};

pub struct DigestStorage {
    pool: SqlitePool,
}

impl DigestStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a digest shell. Schedule fields fall back to their defaults;
    /// the first delivery lands one period out, anchored at the schedule
    /// hour.
    pub async fn create(
        &self,
        org_id: &str,
        input: DigestCreateInput,
        created_by: Option<&str>,
    ) -> Result<Digest, StorageError> {
        let digest_id = generate_id("dig");
        let now = Utc::now();

        let delivery_period = input.delivery_period.unwrap_or_default();
        let time_window = input.time_window.unwrap_or_default();
        let schedule_hour = input.schedule_hour.unwrap_or(8);
        let include_recommendations = input.include_recommendations.unwrap_or(true);
        let next_delivery_at =
            delivery_period.next_after(now, schedule_hour.clamp(0, 23) as u8);

        debug!("Creating digest: {} for org: {}", digest_id, org_id);

        sqlx::query(
            r#"
            INSERT INTO digests (
                id, org_id, title, description, delivery_period, time_window,
                schedule_hour, include_recommendations, status, next_delivery_at,
                created_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&digest_id)
        .bind(org_id)
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(delivery_period)
        .bind(time_window)
        .bind(schedule_hour)
        .bind(include_recommendations)
        .bind(DigestStatus::Active)
        .bind(next_delivery_at)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        match self.get(org_id, &digest_id).await? {
            Some(digest) => Ok(digest),
            None => Err(StorageError::NotFound),
        }
    }

    pub async fn get(&self, org_id: &str, digest_id: &str) -> Result<Option<Digest>, StorageError> {
        let row = sqlx::query("SELECT * FROM digests WHERE id = ? AND org_id = ?")
            .bind(digest_id)
            .bind(org_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        row.map(|r| Self::row_to_digest(&r)).transpose()
    }

    /// List digests for an org, newest first.
    pub async fn list(
        &self,
        org_id: &str,
        filter: &DigestFilter,
    ) -> Result<(Vec<Digest>, i64), StorageError> {
        let mut conditions = vec!["org_id = ?".to_string()];

        if filter.status.is_some() {
            conditions.push("status = ?".to_string());
        }
        if filter.search.is_some() {
            conditions.push("(title LIKE ? OR description LIKE ?)".to_string());
        }

        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) as count FROM digests WHERE {}", where_clause);
        let count_row = Self::bind_filter(sqlx::query(&count_sql), org_id, filter)
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;
        let total: i64 = count_row.try_get("count").map_err(StorageError::Sqlx)?;

        let mut list_sql = format!(
            "SELECT * FROM digests WHERE {} ORDER BY created_at DESC",
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

        let digests = rows
            .iter()
            .map(Self::row_to_digest)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((digests, total))
    }

    fn bind_filter<'q>(
        mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        org_id: &'q str,
        filter: &'q DigestFilter,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        query = query.bind(org_id);
        if let Some(status) = filter.status {
            query = query.bind(status);
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", search);
            query = query.bind(pattern.clone()).bind(pattern);
        }
        query
    }

    /// Patch mutable fields. `Ok(None)` when the digest does not exist for
    /// this org.
    pub async fn update_fields(
        &self,
        org_id: &str,
        digest_id: &str,
        input: &DigestUpdateInput,
    ) -> Result<Option<Digest>, StorageError> {
        if input.is_empty() {
            return self.get(org_id, digest_id).await;
        }

        let now = Utc::now();
        let mut query_str = String::from("UPDATE digests SET updated_at = ?, ");
        let mut updates = Vec::new();

        if input.title.is_some() {
            updates.push("title = ?");
        }
        if input.description.is_some() {
            updates.push("description = ?");
        }
        if input.delivery_period.is_some() {
            updates.push("delivery_period = ?");
        }
        if input.time_window.is_some() {
            updates.push("time_window = ?");
        }
        if input.schedule_hour.is_some() {
            updates.push("schedule_hour = ?");
        }
        if input.include_recommendations.is_some() {
            updates.push("include_recommendations = ?");
        }
        if input.status.is_some() {
            updates.push("status = ?");
        }

        query_str.push_str(&updates.join(", "));
        query_str.push_str(" WHERE id = ? AND org_id = ?");

        let mut query = sqlx::query(&query_str).bind(now);

        if let Some(title) = &input.title {
            query = query.bind(title.trim());
        }
        if let Some(description) = &input.description {
            query = query.bind(description);
        }
        if let Some(period) = input.delivery_period {
            query = query.bind(period);
        }
        if let Some(window) = input.time_window {
            query = query.bind(window);
        }
        if let Some(hour) = input.schedule_hour {
            query = query.bind(hour);
        }
        if let Some(include) = input.include_recommendations {
            query = query.bind(include);
        }
        if let Some(status) = input.status {
            query = query.bind(status);
        }

        let result = query
            .bind(digest_id)
            .bind(org_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get(org_id, digest_id).await
    }

    /// Archive in place. Already-archived digests are left untouched so the
    /// call is idempotent; returns the digest either way.
    pub async fn archive(
        &self,
        org_id: &str,
        digest_id: &str,
    ) -> Result<Option<Digest>, StorageError> {
        sqlx::query(
            "UPDATE digests SET status = ?, updated_at = ? \
             WHERE id = ? AND org_id = ? AND status != ?",
        )
        .bind(DigestStatus::Archived)
        .bind(Utc::now())
        .bind(digest_id)
        .bind(org_id)
        .bind(DigestStatus::Archived)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        self.get(org_id, digest_id).await
    }

    /// Hard delete. Recipients and delivery records go with it (cascade).
    pub async fn delete(&self, org_id: &str, digest_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM digests WHERE id = ? AND org_id = ?")
            .bind(digest_id)
            .bind(org_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Active digests whose next delivery is due at or before `now`. Pure
    /// read; dispatch belongs to the external scheduler.
    pub async fn get_due(
        &self,
        org_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Digest>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM digests \
             WHERE org_id = ? AND status = ? AND next_delivery_at IS NOT NULL \
               AND next_delivery_at <= ? \
             ORDER BY next_delivery_at ASC",
        )
        .bind(org_id)
        .bind(DigestStatus::Active)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(Self::row_to_digest).collect()
    }

    /// Append a delivery record and roll the schedule forward. `Ok(None)`
    /// when the digest does not exist for this org.
    pub async fn record_delivery(
        &self,
        org_id: &str,
        digest_id: &str,
        outcome: &DeliveryOutcome,
    ) -> Result<Option<DeliveryRecord>, StorageError> {
        let Some(digest) = self.get(org_id, digest_id).await? else {
            return Ok(None);
        };

        let record_id = generate_id("dlv");
        let delivered_at = Utc::now();
        let next_delivery_at = digest
            .delivery_period
            .next_after(delivered_at, digest.schedule_hour.clamp(0, 23) as u8);

        let mut tx = self.pool.begin().await.map_err(StorageError::Sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO digest_deliveries (
                id, digest_id, org_id, status, recipient_count, error, delivered_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record_id)
        .bind(digest_id)
        .bind(org_id)
        .bind(outcome.status)
        .bind(outcome.recipient_count)
        .bind(&outcome.error)
        .bind(delivered_at)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::Sqlx)?;

        sqlx::query(
            "UPDATE digests SET last_delivery_at = ?, next_delivery_at = ?, updated_at = ? \
             WHERE id = ? AND org_id = ?",
        )
        .bind(delivered_at)
        .bind(next_delivery_at)
        .bind(delivered_at)
        .bind(digest_id)
        .bind(org_id)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::Sqlx)?;

        tx.commit().await.map_err(StorageError::Sqlx)?;

        Ok(Some(DeliveryRecord {
            id: record_id,
            digest_id: digest_id.to_string(),
            org_id: org_id.to_string(),
            status: outcome.status,
            recipient_count: outcome.recipient_count,
            error: outcome.error.clone(),
            delivered_at,
        }))
    }

    /// Add a recipient, or refresh an existing one. Email is trimmed and
    /// lowercased before storage so the same address never appears twice
    /// under different casings. `Ok(None)` when the digest is missing.
    pub async fn add_recipient(
        &self,
        org_id: &str,
        digest_id: &str,
        input: RecipientInput,
    ) -> Result<Option<Recipient>, StorageError> {
        if self.get(org_id, digest_id).await?.is_none() {
            return Ok(None);
        }

        let email = input.email.trim().to_lowercase();
        let recipient_id = generate_id("rcp");
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO digest_recipients (
                id, digest_id, org_id, email, name, role,
                include_pdf, include_inline_summary, status, added_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
            ON CONFLICT(digest_id, email) DO UPDATE SET
                name = excluded.name,
                role = excluded.role,
                include_pdf = excluded.include_pdf,
                include_inline_summary = excluded.include_inline_summary
            "#,
        )
        .bind(&recipient_id)
        .bind(digest_id)
        .bind(org_id)
        .bind(&email)
        .bind(&input.name)
        .bind(&input.role)
        .bind(input.include_pdf.unwrap_or(true))
        .bind(input.include_inline_summary.unwrap_or(true))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        let row = sqlx::query(
            "SELECT * FROM digest_recipients WHERE digest_id = ? AND email = ? AND org_id = ?",
        )
        .bind(digest_id)
        .bind(&email)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        row.map(|r| Self::row_to_recipient(&r)).transpose()
    }

    /// Roster for a digest, oldest first.
    pub async fn list_recipients(
        &self,
        org_id: &str,
        digest_id: &str,
    ) -> Result<Vec<Recipient>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM digest_recipients WHERE digest_id = ? AND org_id = ? \
             ORDER BY added_at ASC, email ASC",
        )
        .bind(digest_id)
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(Self::row_to_recipient).collect()
    }

    pub async fn remove_recipient(
        &self,
        org_id: &str,
        digest_id: &str,
        recipient_id: &str,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "DELETE FROM digest_recipients WHERE id = ? AND digest_id = ? AND org_id = ?",
        )
        .bind(recipient_id)
        .bind(digest_id)
        .bind(org_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    /// Aggregate counts in a single query, optionally narrowed to one
    /// digest. Recipients count as active until they bounce.
    pub async fn stats(
        &self,
        org_id: &str,
        digest_id: Option<&str>,
    ) -> Result<DigestStats, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM digests
                    WHERE org_id = ?1 AND (?2 IS NULL OR id = ?2)) AS total_digests,
                (SELECT COUNT(*) FROM digests
                    WHERE org_id = ?1 AND status = 'active'
                      AND (?2 IS NULL OR id = ?2)) AS active_digests,
                (SELECT COUNT(*) FROM digest_deliveries
                    WHERE org_id = ?1 AND (?2 IS NULL OR digest_id = ?2)) AS total_deliveries,
                (SELECT COUNT(*) FROM digest_deliveries
                    WHERE org_id = ?1 AND status = 'sent'
                      AND (?2 IS NULL OR digest_id = ?2)) AS successful_deliveries,
                (SELECT COUNT(*) FROM digest_recipients
                    WHERE org_id = ?1 AND (?2 IS NULL OR digest_id = ?2)) AS total_recipients,
                (SELECT COUNT(*) FROM digest_recipients
                    WHERE org_id = ?1 AND status != 'bounced'
                      AND (?2 IS NULL OR digest_id = ?2)) AS active_recipients
            "#,
        )
        .bind(org_id)
        .bind(digest_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(DigestStats {
            total_digests: row.try_get("total_digests").map_err(StorageError::Sqlx)?,
            active_digests: row.try_get("active_digests").map_err(StorageError::Sqlx)?,
            total_deliveries: row.try_get("total_deliveries").map_err(StorageError::Sqlx)?,
            successful_deliveries: row
                .try_get("successful_deliveries")
                .map_err(StorageError::Sqlx)?,
            total_recipients: row.try_get("total_recipients").map_err(StorageError::Sqlx)?,
            active_recipients: row
                .try_get("active_recipients")
                .map_err(StorageError::Sqlx)?,
        })
    }

    fn row_to_digest(row: &sqlx::sqlite::SqliteRow) -> Result<Digest, StorageError> {
        Ok(Digest {
            id: row.try_get("id").map_err(StorageError::Sqlx)?,
            org_id: row.try_get("org_id").map_err(StorageError::Sqlx)?,
            title: row.try_get("title").map_err(StorageError::Sqlx)?,
            description: row.try_get("description").map_err(StorageError::Sqlx)?,
            delivery_period: row.try_get("delivery_period").map_err(StorageError::Sqlx)?,
            time_window: row.try_get("time_window").map_err(StorageError::Sqlx)?,
            schedule_hour: row.try_get("schedule_hour").map_err(StorageError::Sqlx)?,
            include_recommendations: row
                .try_get("include_recommendations")
                .map_err(StorageError::Sqlx)?,
            status: row.try_get("status").map_err(StorageError::Sqlx)?,
            next_delivery_at: row.try_get("next_delivery_at").map_err(StorageError::Sqlx)?,
            last_delivery_at: row.try_get("last_delivery_at").map_err(StorageError::Sqlx)?,
            created_by: row.try_get("created_by").map_err(StorageError::Sqlx)?,
            created_at: row.try_get("created_at").map_err(StorageError::Sqlx)?,
            updated_at: row.try_get("updated_at").map_err(StorageError::Sqlx)?,
        })
    }

    fn row_to_recipient(row: &sqlx::sqlite::SqliteRow) -> Result<Recipient, StorageError> {
        Ok(Recipient {
            id: row.try_get("id").map_err(StorageError::Sqlx)?,
            digest_id: row.try_get("digest_id").map_err(StorageError::Sqlx)?,
            org_id: row.try_get("org_id").map_err(StorageError::Sqlx)?,
            email: row.try_get("email").map_err(StorageError::Sqlx)?,
            name: row.try_get("name").map_err(StorageError::Sqlx)?,
            role: row.try_get("role").map_err(StorageError::Sqlx)?,
            include_pdf: row.try_get("include_pdf").map_err(StorageError::Sqlx)?,
            include_inline_summary: row
                .try_get("include_inline_summary")
                .map_err(StorageError::Sqlx)?,
            status: row.try_get("status").map_err(StorageError::Sqlx)?,
            added_at: row.try_get("added_at").map_err(StorageError::Sqlx)?,
        })
    }
}
