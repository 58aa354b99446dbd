use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, Row};

use helpdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome};

use super::codec::{parse_enum, parse_timestamp};
use super::{AuditRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditRepository {
    pool: DbPool,
}

impl SqlAuditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditRepository for SqlAuditRepository {
    async fn append(&self, events: &[AuditEvent]) -> Result<(), RepositoryError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for event in events {
            let metadata = serde_json::to_string(&event.metadata).map_err(|error| {
                RepositoryError::Decode(format!("failed to encode audit metadata: {error}"))
            })?;
            sqlx::query(
                "INSERT INTO audit_event
                   (id, subject_id, correlation_id, event_type, category, actor, outcome, metadata_json, occurred_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&event.event_id)
            .bind(event.subject_id.as_deref())
            .bind(&event.correlation_id)
            .bind(&event.event_type)
            .bind(event.category.as_str())
            .bind(&event.actor)
            .bind(event.outcome.as_str())
            .bind(metadata)
            .bind(event.occurred_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, subject_id, correlation_id, event_type, category, actor, outcome,
                    metadata_json, occurred_at
             FROM audit_event WHERE subject_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }
}

fn event_from_row(row: &SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let category: String = row.try_get("category")?;
    let outcome: String = row.try_get("outcome")?;
    let metadata_raw: String = row.try_get("metadata_json")?;
    let metadata: BTreeMap<String, String> =
        serde_json::from_str(&metadata_raw).map_err(|error| {
            RepositoryError::Decode(format!("invalid metadata_json `{metadata_raw}`: {error}"))
        })?;

    Ok(AuditEvent {
        event_id: row.try_get("id")?,
        subject_id: row.try_get("subject_id")?,
        correlation_id: row.try_get("correlation_id")?,
        event_type: row.try_get("event_type")?,
        category: parse_enum("audit category", &category, AuditCategory::parse)?,
        actor: row.try_get("actor")?,
        outcome: parse_enum("audit outcome", &outcome, AuditOutcome::parse)?,
        metadata,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use helpdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome};

    use super::SqlAuditRepository;
    use crate::repositories::test_support::{parse_ts, setup_pool};
    use crate::repositories::AuditRepository;

    #[tokio::test]
    async fn appended_events_are_listed_per_subject_in_order() {
        let pool = setup_pool().await;
        let repo = SqlAuditRepository::new(pool.clone());
        let at = parse_ts("2026-03-02T09:00:00Z");

        let mut created = AuditEvent::new(
            Some("TKT-1".to_string()),
            "req-1",
            "ticket.created",
            AuditCategory::Flow,
            "USR-cust",
            AuditOutcome::Success,
        )
        .with_metadata("priority", "high");
        created.occurred_at = at;
        let mut assigned = AuditEvent::new(
            Some("TKT-1".to_string()),
            "req-2",
            "ticket.assigned",
            AuditCategory::Assignment,
            "system",
            AuditOutcome::Success,
        );
        assigned.occurred_at = at + Duration::seconds(1);
        let mut unrelated = AuditEvent::new(
            None,
            "req-3",
            "auth.login_failed",
            AuditCategory::Auth,
            "anonymous",
            AuditOutcome::Rejected,
        );
        unrelated.occurred_at = at;

        repo.append(&[assigned.clone(), created.clone(), unrelated]).await.expect("append");
        repo.append(&[]).await.expect("empty append");

        let events = repo.list_for_subject("TKT-1").await.expect("list");
        assert_eq!(events, vec![created, assigned]);

        pool.close().await;
    }
}
