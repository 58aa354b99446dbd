use sqlx::{sqlite::SqliteRow, Row};

use helpdesk_core::domain::ticket::{
    Ticket, TicketComment, TicketCommentId, TicketId, TicketPriority, TicketStatus,
};
use helpdesk_core::domain::user::UserId;

use super::codec::{parse_enum, parse_optional_timestamp, parse_timestamp, parse_u32};
use super::{RepositoryError, TicketFilter, TicketRepository};
use crate::DbPool;

pub struct SqlTicketRepository {
    pool: DbPool,
}

impl SqlTicketRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const TICKET_COLUMNS: &str = "id, title, description, category, priority, status, requester_id,
    technician_id, response_due_at, resolution_due_at, first_response_at, resolved_at, closed_at,
    response_sla_met, resolution_sla_met, resolution_note, reopen_count, created_at, updated_at";

#[async_trait::async_trait]
impl TicketRepository for SqlTicketRepository {
    async fn insert(&self, ticket: &Ticket) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO ticket ({TICKET_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&ticket.id.0)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(&ticket.category)
        .bind(ticket.priority.as_str())
        .bind(ticket.status.as_str())
        .bind(&ticket.requester_id.0)
        .bind(ticket.technician_id.as_ref().map(|id| id.0.as_str()))
        .bind(ticket.response_due_at.to_rfc3339())
        .bind(ticket.resolution_due_at.to_rfc3339())
        .bind(ticket.first_response_at.map(|at| at.to_rfc3339()))
        .bind(ticket.resolved_at.map(|at| at.to_rfc3339()))
        .bind(ticket.closed_at.map(|at| at.to_rfc3339()))
        .bind(ticket.response_sla_met)
        .bind(ticket.resolution_sla_met)
        .bind(ticket.resolution_note.as_deref())
        .bind(i64::from(ticket.reopen_count))
        .bind(ticket.created_at.to_rfc3339())
        .bind(ticket.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            RepositoryError::on_unique(error, format!("ticket `{}` already exists", ticket.id.0))
        })?;

        Ok(())
    }

    async fn update(&self, ticket: &Ticket) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE ticket SET
               title = ?, description = ?, category = ?, priority = ?, status = ?,
               technician_id = ?, response_due_at = ?, resolution_due_at = ?,
               first_response_at = ?, resolved_at = ?, closed_at = ?,
               response_sla_met = ?, resolution_sla_met = ?, resolution_note = ?,
               reopen_count = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(&ticket.category)
        .bind(ticket.priority.as_str())
        .bind(ticket.status.as_str())
        .bind(ticket.technician_id.as_ref().map(|id| id.0.as_str()))
        .bind(ticket.response_due_at.to_rfc3339())
        .bind(ticket.resolution_due_at.to_rfc3339())
        .bind(ticket.first_response_at.map(|at| at.to_rfc3339()))
        .bind(ticket.resolved_at.map(|at| at.to_rfc3339()))
        .bind(ticket.closed_at.map(|at| at.to_rfc3339()))
        .bind(ticket.response_sla_met)
        .bind(ticket.resolution_sla_met)
        .bind(ticket.resolution_note.as_deref())
        .bind(i64::from(ticket.reopen_count))
        .bind(ticket.updated_at.to_rfc3339())
        .bind(&ticket.id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("ticket `{}`", ticket.id.0)));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| ticket_from_row(&row)).transpose()
    }

    async fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, RepositoryError> {
        let mut sql = format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE 1 = 1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.requester_id.is_some() {
            sql.push_str(" AND requester_id = ?");
        }
        if filter.technician_id.is_some() {
            sql.push_str(" AND technician_id = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(requester) = &filter.requester_id {
            query = query.bind(requester.0.as_str());
        }
        if let Some(technician) = &filter.technician_id {
            query = query.bind(technician.0.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(ticket_from_row).collect()
    }

    async fn list_unresolved(&self) -> Result<Vec<Ticket>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket
             WHERE status IN ('open', 'assigned', 'in_progress')
             ORDER BY resolution_due_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ticket_from_row).collect()
    }

    async fn add_comment(&self, comment: &TicketComment) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ticket_comment (id, ticket_id, author_id, body, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&comment.id.0)
        .bind(&comment.ticket_id.0)
        .bind(&comment.author_id.0)
        .bind(&comment.body)
        .bind(comment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_comments(&self, id: &TicketId) -> Result<Vec<TicketComment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, ticket_id, author_id, body, created_at
             FROM ticket_comment WHERE ticket_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TicketComment {
                    id: TicketCommentId(row.try_get("id")?),
                    ticket_id: TicketId(row.try_get("ticket_id")?),
                    author_id: UserId(row.try_get("author_id")?),
                    body: row.try_get("body")?,
                    created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
                })
            })
            .collect()
    }
}

fn ticket_from_row(row: &SqliteRow) -> Result<Ticket, RepositoryError> {
    let priority: String = row.try_get("priority")?;
    let status: String = row.try_get("status")?;
    let technician_id: Option<String> = row.try_get("technician_id")?;

    Ok(Ticket {
        id: TicketId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        priority: parse_enum("priority", &priority, TicketPriority::parse)?,
        status: parse_enum("status", &status, TicketStatus::parse)?,
        requester_id: UserId(row.try_get("requester_id")?),
        technician_id: technician_id.map(UserId),
        response_due_at: parse_timestamp("response_due_at", row.try_get("response_due_at")?)?,
        resolution_due_at: parse_timestamp("resolution_due_at", row.try_get("resolution_due_at")?)?,
        first_response_at: parse_optional_timestamp(
            "first_response_at",
            row.try_get("first_response_at")?,
        )?,
        resolved_at: parse_optional_timestamp("resolved_at", row.try_get("resolved_at")?)?,
        closed_at: parse_optional_timestamp("closed_at", row.try_get("closed_at")?)?,
        response_sla_met: row.try_get("response_sla_met")?,
        resolution_sla_met: row.try_get("resolution_sla_met")?,
        resolution_note: row.try_get("resolution_note")?,
        reopen_count: parse_u32("reopen_count", row.try_get("reopen_count")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use helpdesk_core::domain::ticket::{
        Ticket, TicketComment, TicketCommentId, TicketId, TicketPriority, TicketStatus,
    };
    use helpdesk_core::domain::user::{Role, UserId};

    use super::SqlTicketRepository;
    use crate::repositories::test_support::{parse_ts, seed_user, setup_pool};
    use crate::repositories::{RepositoryError, TicketFilter, TicketRepository};

    #[tokio::test]
    async fn insert_update_and_find_round_trip() {
        let pool = setup_pool().await;
        seed_user(&pool, "USR-req", Role::Customer).await;
        seed_user(&pool, "USR-tech", Role::Technician).await;
        let repo = SqlTicketRepository::new(pool.clone());
        let mut ticket = sample_ticket("TKT-1", "2026-03-02T09:00:00Z");

        repo.insert(&ticket).await.expect("insert ticket");
        assert_eq!(repo.find_by_id(&ticket.id).await.expect("find"), Some(ticket.clone()));

        ticket.status = TicketStatus::Resolved;
        ticket.technician_id = Some(UserId("USR-tech".to_string()));
        ticket.record_first_response(ticket.created_at + Duration::minutes(30));
        ticket.resolved_at = Some(ticket.created_at + Duration::hours(2));
        ticket.resolution_sla_met = Some(true);
        ticket.resolution_note = Some("replaced cable".to_string());
        ticket.reopen_count = 1;
        repo.update(&ticket).await.expect("update ticket");

        assert_eq!(repo.find_by_id(&ticket.id).await.expect("find"), Some(ticket));

        pool.close().await;
    }

    #[tokio::test]
    async fn update_of_missing_ticket_is_not_found() {
        let pool = setup_pool().await;
        let repo = SqlTicketRepository::new(pool.clone());

        let error = repo
            .update(&sample_ticket("TKT-missing", "2026-03-02T09:00:00Z"))
            .await
            .expect_err("missing ticket");
        assert!(matches!(error, RepositoryError::NotFound(_)));

        pool.close().await;
    }

    #[tokio::test]
    async fn list_filters_and_unresolved_ordering() {
        let pool = setup_pool().await;
        seed_user(&pool, "USR-req", Role::Customer).await;
        seed_user(&pool, "USR-other", Role::Customer).await;
        seed_user(&pool, "USR-tech", Role::Technician).await;
        let repo = SqlTicketRepository::new(pool.clone());

        let first = sample_ticket("TKT-1", "2026-03-02T09:00:00Z");
        let mut second = sample_ticket("TKT-2", "2026-03-02T10:00:00Z");
        second.status = TicketStatus::Assigned;
        second.technician_id = Some(UserId("USR-tech".to_string()));
        second.resolution_due_at = first.resolution_due_at - Duration::hours(1);
        let mut third = sample_ticket("TKT-3", "2026-03-02T11:00:00Z");
        third.requester_id = UserId("USR-other".to_string());
        third.status = TicketStatus::Closed;
        for ticket in [&first, &second, &third] {
            repo.insert(ticket).await.expect("insert");
        }

        let all = repo.list(&TicketFilter::default()).await.expect("list all");
        let ids: Vec<&str> = all.iter().map(|ticket| ticket.id.0.as_str()).collect();
        assert_eq!(ids, vec!["TKT-3", "TKT-2", "TKT-1"]);

        let mine = repo
            .list(&TicketFilter {
                requester_id: Some(UserId("USR-req".to_string())),
                status: Some(TicketStatus::Open),
                ..TicketFilter::default()
            })
            .await
            .expect("list filtered");
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, first.id);

        let assigned = repo
            .list(&TicketFilter {
                technician_id: Some(UserId("USR-tech".to_string())),
                ..TicketFilter::default()
            })
            .await
            .expect("list by technician");
        assert_eq!(assigned.len(), 1);

        let unresolved = repo.list_unresolved().await.expect("unresolved");
        let ids: Vec<&str> = unresolved.iter().map(|ticket| ticket.id.0.as_str()).collect();
        assert_eq!(ids, vec!["TKT-2", "TKT-1"]);

        pool.close().await;
    }

    #[tokio::test]
    async fn comments_are_listed_oldest_first() {
        let pool = setup_pool().await;
        seed_user(&pool, "USR-req", Role::Customer).await;
        let repo = SqlTicketRepository::new(pool.clone());
        let ticket = sample_ticket("TKT-1", "2026-03-02T09:00:00Z");
        repo.insert(&ticket).await.expect("insert");

        for (id, at) in [("CMT-2", "2026-03-02T09:30:00Z"), ("CMT-1", "2026-03-02T09:10:00Z")] {
            repo.add_comment(&TicketComment {
                id: TicketCommentId(id.to_string()),
                ticket_id: ticket.id.clone(),
                author_id: UserId("USR-req".to_string()),
                body: format!("comment {id}"),
                created_at: parse_ts(at),
            })
            .await
            .expect("add comment");
        }

        let comments = repo.list_comments(&ticket.id).await.expect("list comments");
        let ids: Vec<&str> = comments.iter().map(|comment| comment.id.0.as_str()).collect();
        assert_eq!(ids, vec!["CMT-1", "CMT-2"]);

        pool.close().await;
    }

    fn sample_ticket(id: &str, created_at: &str) -> Ticket {
        let created_at = parse_ts(created_at);
        Ticket {
            id: TicketId(id.to_string()),
            title: "Printer offline".to_string(),
            description: "Third floor printer is not reachable".to_string(),
            category: "hardware".to_string(),
            priority: TicketPriority::Medium,
            status: TicketStatus::Open,
            requester_id: UserId("USR-req".to_string()),
            technician_id: None,
            response_due_at: created_at + Duration::hours(8),
            resolution_due_at: created_at + Duration::hours(48),
            first_response_at: None,
            resolved_at: None,
            closed_at: None,
            response_sla_met: None,
            resolution_sla_met: None,
            resolution_note: None,
            reopen_count: 0,
            created_at,
            updated_at: created_at,
        }
    }
}
