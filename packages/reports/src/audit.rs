// ABOUTME: Append-only report audit log storage
// ABOUTME: Every lifecycle event is recorded; entries survive report hard deletes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::fmt;
use tracing::debug;

use vantage_core::{generate_id, Actor, ActorKind};
use vantage_storage::StorageError;

use crate::types::ReportStatus;

/// What happened. The log is the source of truth for "who did what
/// when"; statuses on the report row are just the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum AuditEvent {
    Created,
    Updated,
    Generated,
    Regenerated,
    Approved,
    Published,
    Archived,
    Deleted,
    Exported,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::Created => "created",
            AuditEvent::Updated => "updated",
            AuditEvent::Generated => "generated",
            AuditEvent::Regenerated => "regenerated",
            AuditEvent::Approved => "approved",
            AuditEvent::Published => "published",
            AuditEvent::Archived => "archived",
            AuditEvent::Deleted => "deleted",
            AuditEvent::Exported => "exported",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    #[serde(rename = "reportId")]
    pub report_id: String,
    #[serde(rename = "orgId")]
    pub org_id: String,
    pub event: AuditEvent,
    #[serde(rename = "previousStatus")]
    pub previous_status: Option<ReportStatus>,
    #[serde(rename = "newStatus")]
    pub new_status: Option<ReportStatus>,
    #[serde(rename = "actorKind")]
    pub actor_kind: ActorKind,
    #[serde(rename = "actorEmail")]
    pub actor_email: Option<String>,
    #[serde(rename = "tokensInput")]
    pub tokens_input: i64,
    #[serde(rename = "tokensOutput")]
    pub tokens_output: i64,
    #[serde(rename = "durationMs")]
    pub duration_ms: Option<i64>,
    pub detail: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Entry under construction. Built by the manager, persisted by
/// [`AuditStorage::append`].
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub event: AuditEvent,
    pub previous_status: Option<ReportStatus>,
    pub new_status: Option<ReportStatus>,
    pub actor: Actor,
    pub tokens_input: i64,
    pub tokens_output: i64,
    pub duration_ms: Option<i64>,
    pub detail: Option<String>,
}

impl NewAuditEntry {
    pub fn new(event: AuditEvent, actor: &Actor) -> Self {
        NewAuditEntry {
            event,
            previous_status: None,
            new_status: None,
            actor: actor.clone(),
            tokens_input: 0,
            tokens_output: 0,
            duration_ms: None,
            detail: None,
        }
    }

    pub fn transition(mut self, from: ReportStatus, to: ReportStatus) -> Self {
        self.previous_status = Some(from);
        self.new_status = Some(to);
        self
    }

    /// First state of a fresh row; there is no previous status.
    pub fn entering(mut self, to: ReportStatus) -> Self {
        self.new_status = Some(to);
        self
    }

    /// Last state of a deleted row; there is no next status.
    pub fn leaving(mut self, from: ReportStatus) -> Self {
        self.previous_status = Some(from);
        self
    }

    pub fn tokens(mut self, input: i64, output: i64) -> Self {
        self.tokens_input = input;
        self.tokens_output = output;
        self
    }

    pub fn duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

pub struct AuditStorage {
    pool: SqlitePool,
}

impl AuditStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one entry. There is no update or delete on this table.
    pub async fn append(
        &self,
        org_id: &str,
        report_id: &str,
        entry: NewAuditEntry,
    ) -> Result<AuditEntry, StorageError> {
        insert_entry(&self.pool, org_id, report_id, entry).await
    }

    /// Full trail for a report, oldest first (replay order).
    pub async fn list_for_report(
        &self,
        org_id: &str,
        report_id: &str,
    ) -> Result<Vec<AuditEntry>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM report_audit_log WHERE report_id = ? AND org_id = ? \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(report_id)
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(|row| self.row_to_entry(row)).collect()
    }

    /// Token totals across a report's generation events.
    pub async fn token_totals(
        &self,
        org_id: &str,
        report_id: &str,
    ) -> Result<(i64, i64), StorageError> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(tokens_input), 0) as total_input,
                COALESCE(SUM(tokens_output), 0) as total_output
            FROM report_audit_log
            WHERE report_id = ? AND org_id = ?
            "#,
        )
        .bind(report_id)
        .bind(org_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok((
            row.try_get("total_input").map_err(StorageError::Sqlx)?,
            row.try_get("total_output").map_err(StorageError::Sqlx)?,
        ))
    }

    fn row_to_entry(&self, row: &sqlx::sqlite::SqliteRow) -> Result<AuditEntry, StorageError> {
        let actor_kind: String = row.try_get("actor_kind").map_err(StorageError::Sqlx)?;

        Ok(AuditEntry {
            id: row.try_get("id").map_err(StorageError::Sqlx)?,
            report_id: row.try_get("report_id").map_err(StorageError::Sqlx)?,
            org_id: row.try_get("org_id").map_err(StorageError::Sqlx)?,
            event: row.try_get("event").map_err(StorageError::Sqlx)?,
            previous_status: row.try_get("previous_status").map_err(StorageError::Sqlx)?,
            new_status: row.try_get("new_status").map_err(StorageError::Sqlx)?,
            actor_kind: ActorKind::parse(&actor_kind)
                .ok_or_else(|| StorageError::InvalidValue(format!("actor_kind: {actor_kind}")))?,
            actor_email: row.try_get("actor_email").map_err(StorageError::Sqlx)?,
            tokens_input: row.try_get("tokens_input").map_err(StorageError::Sqlx)?,
            tokens_output: row.try_get("tokens_output").map_err(StorageError::Sqlx)?,
            duration_ms: row.try_get("duration_ms").map_err(StorageError::Sqlx)?,
            detail: row.try_get("detail").map_err(StorageError::Sqlx)?,
            created_at: row.try_get("created_at").map_err(StorageError::Sqlx)?,
        })
    }
}

/// Insert an entry through any executor so callers can append inside
/// their own transaction (hard delete records its final entry this way).
pub(crate) async fn insert_entry<'e, E>(
    executor: E,
    org_id: &str,
    report_id: &str,
    entry: NewAuditEntry,
) -> Result<AuditEntry, StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let entry_id = generate_id("aud");
    let now = Utc::now();

    debug!(
        "Audit {} on report {} by {}",
        entry.event, report_id, entry.actor.kind
    );

    sqlx::query(
        r#"
        INSERT INTO report_audit_log (
            id, report_id, org_id, event, previous_status, new_status,
            actor_kind, actor_email, tokens_input, tokens_output,
            duration_ms, detail, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry_id)
    .bind(report_id)
    .bind(org_id)
    .bind(entry.event)
    .bind(entry.previous_status)
    .bind(entry.new_status)
    .bind(entry.actor.kind.as_str())
    .bind(&entry.actor.email)
    .bind(entry.tokens_input)
    .bind(entry.tokens_output)
    .bind(entry.duration_ms)
    .bind(&entry.detail)
    .bind(now)
    .execute(executor)
    .await
    .map_err(StorageError::Sqlx)?;

    Ok(AuditEntry {
        id: entry_id,
        report_id: report_id.to_string(),
        org_id: org_id.to_string(),
        event: entry.event,
        previous_status: entry.previous_status,
        new_status: entry.new_status,
        actor_kind: entry.actor.kind,
        actor_email: entry.actor.email,
        tokens_input: entry.tokens_input,
        tokens_output: entry.tokens_output,
        duration_ms: entry.duration_ms,
        detail: entry.detail,
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> AuditStorage {
        let pool = vantage_storage::connect_memory().await.unwrap();
        vantage_storage::run_migrations(&pool).await.unwrap();
        AuditStorage::new(pool)
    }

    #[tokio::test]
    async fn test_append_and_replay_order() {
        let storage = setup().await;
        let actor = Actor::user("maya@example.com");

        storage
            .append("org-1", "rpt-1", NewAuditEntry::new(AuditEvent::Created, &actor))
            .await
            .unwrap();
        storage
            .append(
                "org-1",
                "rpt-1",
                NewAuditEntry::new(AuditEvent::Generated, &Actor::ai())
                    .transition(ReportStatus::Generating, ReportStatus::Review)
                    .tokens(900, 350)
                    .duration_ms(4200),
            )
            .await
            .unwrap();
        storage
            .append(
                "org-1",
                "rpt-1",
                NewAuditEntry::new(AuditEvent::Approved, &actor)
                    .transition(ReportStatus::Review, ReportStatus::Approved),
            )
            .await
            .unwrap();

        let entries = storage.list_for_report("org-1", "rpt-1").await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].event, AuditEvent::Created);
        assert_eq!(entries[1].event, AuditEvent::Generated);
        assert_eq!(entries[1].actor_kind, ActorKind::Ai);
        assert_eq!(entries[1].new_status, Some(ReportStatus::Review));
        assert_eq!(entries[2].event, AuditEvent::Approved);
        assert_eq!(entries[2].actor_email.as_deref(), Some("maya@example.com"));
    }

    #[tokio::test]
    async fn test_token_totals() {
        let storage = setup().await;

        storage
            .append(
                "org-1",
                "rpt-1",
                NewAuditEntry::new(AuditEvent::Generated, &Actor::ai()).tokens(1000, 400),
            )
            .await
            .unwrap();
        storage
            .append(
                "org-1",
                "rpt-1",
                NewAuditEntry::new(AuditEvent::Regenerated, &Actor::ai()).tokens(500, 250),
            )
            .await
            .unwrap();

        let (input, output) = storage.token_totals("org-1", "rpt-1").await.unwrap();
        assert_eq!(input, 1500);
        assert_eq!(output, 650);

        let (input, output) = storage.token_totals("org-1", "rpt-none").await.unwrap();
        assert_eq!(input, 0);
        assert_eq!(output, 0);
    }

    #[tokio::test]
    async fn test_trail_is_tenant_scoped() {
        let storage = setup().await;

        storage
            .append("org-1", "rpt-1", NewAuditEntry::new(AuditEvent::Created, &Actor::system()))
            .await
            .unwrap();

        let entries = storage.list_for_report("org-2", "rpt-1").await.unwrap();
        assert!(entries.is_empty());
    }
}
