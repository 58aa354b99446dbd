use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use helpdesk_core::domain::notification::{Notification, NotificationId, NotificationKind};
use helpdesk_core::domain::ticket::TicketId;
use helpdesk_core::domain::user::UserId;

use super::codec::{parse_enum, parse_timestamp};
use super::{NotificationRepository, RepositoryError, SlaAlertKind};
use crate::DbPool;

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl NotificationRepository for SqlNotificationRepository {
    async fn insert_many(&self, notifications: &[Notification]) -> Result<(), RepositoryError> {
        if notifications.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        insert_rows(&mut tx, notifications).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn list_for_recipient(
        &self,
        recipient: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let sql = if unread_only {
            "SELECT id, recipient_id, kind, subject_id, message, read, created_at
             FROM notification WHERE recipient_id = ? AND read = 0
             ORDER BY created_at DESC, id DESC"
        } else {
            "SELECT id, recipient_id, kind, subject_id, message, read, created_at
             FROM notification WHERE recipient_id = ?
             ORDER BY created_at DESC, id DESC"
        };

        let rows = sqlx::query(sql).bind(&recipient.0).fetch_all(&self.pool).await?;
        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_read(
        &self,
        id: &NotificationId,
        recipient: &UserId,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE notification SET read = 1 WHERE id = ? AND recipient_id = ?")
                .bind(&id.0)
                .bind(&recipient.0)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn raise_sla_alert(
        &self,
        ticket_id: &TicketId,
        kind: SlaAlertKind,
        raised_at: DateTime<Utc>,
        notifications: &[Notification],
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO sla_alert (ticket_id, kind, raised_at) VALUES (?, ?, ?)",
        )
        .bind(&ticket_id.0)
        .bind(kind.as_str())
        .bind(raised_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_rows(&mut tx, notifications).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn clear_sla_alerts(&self, ticket_id: &TicketId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM sla_alert WHERE ticket_id = ?")
            .bind(&ticket_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn insert_rows(
    tx: &mut Transaction<'_, Sqlite>,
    notifications: &[Notification],
) -> Result<(), RepositoryError> {
    for notification in notifications {
        sqlx::query(
            "INSERT INTO notification (id, recipient_id, kind, subject_id, message, read, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&notification.id.0)
        .bind(&notification.recipient_id.0)
        .bind(notification.kind.as_str())
        .bind(&notification.subject_id)
        .bind(&notification.message)
        .bind(notification.read)
        .bind(notification.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification, RepositoryError> {
    let kind: String = row.try_get("kind")?;
    Ok(Notification {
        id: NotificationId(row.try_get("id")?),
        recipient_id: UserId(row.try_get("recipient_id")?),
        kind: parse_enum("notification kind", &kind, NotificationKind::parse)?,
        subject_id: row.try_get("subject_id")?,
        message: row.try_get("message")?,
        read: row.try_get("read")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
