// ABOUTME: Digest shell orchestration: validation, roster changes, scheduler reads
// ABOUTME: Stats degrade to zeros on query failure instead of erroring the caller

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use vantage_core::{require_email_shape, require_non_empty, RequestContext, ValidationError};
use vantage_storage::StorageError;

use crate::storage::DigestStorage;
use crate::types::{
    DeliveryOutcome, DeliveryRecord, Digest, DigestCreateInput, DigestFilter, DigestStats,
    DigestUpdateInput, Recipient, RecipientInput,
};

#[derive(Error, Debug)]
pub enum DigestError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

pub type DigestResult<T> = Result<T, DigestError>;

pub struct DigestManager {
    storage: DigestStorage,
}

impl DigestManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            storage: DigestStorage::new(pool),
        }
    }

    pub async fn create(
        &self,
        ctx: &RequestContext,
        input: DigestCreateInput,
    ) -> DigestResult<Digest> {
        require_non_empty("title", &input.title)?;
        if let Some(hour) = input.schedule_hour {
            require_schedule_hour(hour)?;
        }

        let digest = self
            .storage
            .create(&ctx.org_id, input, ctx.actor_email())
            .await?;

        info!("Created digest '{}' ({})", digest.title, digest.id);
        Ok(digest)
    }

    pub async fn get(&self, ctx: &RequestContext, digest_id: &str) -> DigestResult<Option<Digest>> {
        Ok(self.storage.get(&ctx.org_id, digest_id).await?)
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        filter: &DigestFilter,
    ) -> DigestResult<(Vec<Digest>, i64)> {
        Ok(self.storage.list(&ctx.org_id, filter).await?)
    }

    /// Patch mutable fields. `Ok(None)` when the digest does not exist for
    /// this org.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        digest_id: &str,
        input: DigestUpdateInput,
    ) -> DigestResult<Option<Digest>> {
        if let Some(title) = &input.title {
            require_non_empty("title", title)?;
        }
        if let Some(hour) = input.schedule_hour {
            require_schedule_hour(hour)?;
        }

        Ok(self
            .storage
            .update_fields(&ctx.org_id, digest_id, &input)
            .await?)
    }

    /// Archive the digest. Idempotent: archiving an archived digest is a
    /// no-op that still returns it.
    pub async fn archive(
        &self,
        ctx: &RequestContext,
        digest_id: &str,
    ) -> DigestResult<Option<Digest>> {
        let digest = self.storage.archive(&ctx.org_id, digest_id).await?;
        if let Some(digest) = &digest {
            info!("Archived digest {}", digest.id);
        }
        Ok(digest)
    }

    /// Hard delete, cascading the roster and delivery history.
    pub async fn delete(&self, ctx: &RequestContext, digest_id: &str) -> DigestResult<bool> {
        let deleted = self.storage.delete(&ctx.org_id, digest_id).await?;
        if deleted {
            info!("Deleted digest {}", digest_id);
        }
        Ok(deleted)
    }

    /// Add (or refresh) a roster entry. `Ok(None)` when the digest is
    /// missing for this org.
    pub async fn add_recipient(
        &self,
        ctx: &RequestContext,
        digest_id: &str,
        input: RecipientInput,
    ) -> DigestResult<Option<Recipient>> {
        require_email_shape("email", &input.email)?;

        Ok(self
            .storage
            .add_recipient(&ctx.org_id, digest_id, input)
            .await?)
    }

    pub async fn list_recipients(
        &self,
        ctx: &RequestContext,
        digest_id: &str,
    ) -> DigestResult<Vec<Recipient>> {
        Ok(self.storage.list_recipients(&ctx.org_id, digest_id).await?)
    }

    pub async fn remove_recipient(
        &self,
        ctx: &RequestContext,
        digest_id: &str,
        recipient_id: &str,
    ) -> DigestResult<bool> {
        Ok(self
            .storage
            .remove_recipient(&ctx.org_id, digest_id, recipient_id)
            .await?)
    }

    /// Scheduler read: active digests due at or before `at`.
    pub async fn get_due(
        &self,
        ctx: &RequestContext,
        at: chrono::DateTime<chrono::Utc>,
    ) -> DigestResult<Vec<Digest>> {
        Ok(self.storage.get_due(&ctx.org_id, at).await?)
    }

    /// Scheduler callback after a dispatch attempt. Appends the delivery
    /// record and rolls `next_delivery_at` forward. `Ok(None)` when the
    /// digest is missing for this org.
    pub async fn record_delivery(
        &self,
        ctx: &RequestContext,
        digest_id: &str,
        outcome: DeliveryOutcome,
    ) -> DigestResult<Option<DeliveryRecord>> {
        let record = self
            .storage
            .record_delivery(&ctx.org_id, digest_id, &outcome)
            .await?;

        if let Some(record) = &record {
            info!(
                "Recorded {} delivery for digest {} ({} recipients)",
                record.status.as_str(),
                digest_id,
                record.recipient_count
            );
        }
        Ok(record)
    }

    /// Aggregate counts for the org, optionally narrowed to one digest.
    /// A failed aggregate query degrades to the zeroed struct and a
    /// warning; dashboards render zeros instead of an error banner.
    pub async fn get_stats(&self, ctx: &RequestContext, digest_id: Option<&str>) -> DigestStats {
        match self.storage.stats(&ctx.org_id, digest_id).await {
            Ok(stats) => stats,
            Err(err) => {
                warn!("Digest stats query failed, returning zeroed counts: {}", err);
                DigestStats::default()
            }
        }
    }
}

fn require_schedule_hour(hour: i64) -> Result<(), ValidationError> {
    if !(0..=23).contains(&hour) {
        return Err(ValidationError::new(
            "scheduleHour",
            "must be an hour between 0 and 23",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeliveryPeriod, DeliveryStatus, DigestStatus, TimeWindow};
    use vantage_core::Actor;

    async fn setup() -> (DigestManager, SqlitePool) {
        let pool = vantage_storage::connect_memory().await.unwrap();
        vantage_storage::run_migrations(&pool).await.unwrap();
        (DigestManager::new(pool.clone()), pool)
    }

    fn ctx(org: &str) -> RequestContext {
        RequestContext::new(org, Actor::user("ana@acme.test"))
    }

    #[tokio::test]
    async fn test_create_with_title_only_fills_defaults() {
        let (manager, _pool) = setup().await;

        let digest = manager
            .create(
                &ctx("org-a"),
                DigestCreateInput {
                    title: "Basic Digest".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(digest.delivery_period, DeliveryPeriod::Weekly);
        assert_eq!(digest.time_window, TimeWindow::Week);
        assert!(digest.include_recommendations);
        assert_eq!(digest.created_by.as_deref(), Some("ana@acme.test"));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let (manager, _pool) = setup().await;

        let err = manager
            .create(
                &ctx("org-a"),
                DigestCreateInput {
                    title: "   ".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::Validation(_)));

        let err = manager
            .create(
                &ctx("org-a"),
                DigestCreateInput {
                    title: "Late night".to_string(),
                    schedule_hour: Some(24),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::Validation(_)));
    }

    #[tokio::test]
    async fn test_archive_is_idempotent() {
        let (manager, _pool) = setup().await;
        let context = ctx("org-a");

        let digest = manager
            .create(
                &context,
                DigestCreateInput {
                    title: "To archive".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let once = manager.archive(&context, &digest.id).await.unwrap().unwrap();
        assert_eq!(once.status, DigestStatus::Archived);
        let first_updated = once.updated_at;

        let twice = manager.archive(&context, &digest.id).await.unwrap().unwrap();
        assert_eq!(twice.status, DigestStatus::Archived);
        // No-op: the second call did not touch the row.
        assert_eq!(twice.updated_at, first_updated);
    }

    #[tokio::test]
    async fn test_add_recipient_validates_email() {
        let (manager, _pool) = setup().await;
        let context = ctx("org-a");

        let digest = manager
            .create(
                &context,
                DigestCreateInput {
                    title: "Roster".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = manager
            .add_recipient(
                &context,
                &digest.id,
                RecipientInput {
                    email: "not-an-email".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::Validation(_)));

        let missing = manager
            .add_recipient(
                &context,
                "dig-missing",
                RecipientInput {
                    email: "ok@acme.test".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_record_delivery_and_due_cycle() {
        let (manager, _pool) = setup().await;
        let context = ctx("org-a");

        let digest = manager
            .create(
                &context,
                DigestCreateInput {
                    title: "Cycle".to_string(),
                    delivery_period: Some(DeliveryPeriod::Daily),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let probe = chrono::Utc::now() + chrono::Duration::days(2);
        let due = manager.get_due(&context, probe).await.unwrap();
        assert_eq!(due.len(), 1);

        let record = manager
            .record_delivery(
                &context,
                &digest.id,
                DeliveryOutcome {
                    status: DeliveryStatus::Sent,
                    recipient_count: 3,
                    error: None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        let after = manager.get(&context, &digest.id).await.unwrap().unwrap();
        assert_eq!(after.last_delivery_at, Some(record.delivered_at));
        assert!(after.next_delivery_at.unwrap() > record.delivered_at);
    }

    #[tokio::test]
    async fn test_stats_degrade_to_zeros_on_failure() {
        let (manager, pool) = setup().await;
        let context = ctx("org-a");

        manager
            .create(
                &context,
                DigestCreateInput {
                    title: "Counted".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stats = manager.get_stats(&context, None).await;
        assert_eq!(stats.total_digests, 1);

        // Break the aggregate query out from under the manager: the
        // degraded path must return zeros, not an error.
        sqlx::query("DROP TABLE digest_deliveries")
            .execute(&pool)
            .await
            .unwrap();

        let degraded = manager.get_stats(&context, None).await;
        assert_eq!(degraded, DigestStats::default());
    }
}
