use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use helpdesk_core::assignment::TechnicianCandidate;
use helpdesk_core::domain::user::{TechnicianProfile, UserId};

use super::codec::parse_u32;
use super::{RepositoryError, TechnicianRepository};
use crate::DbPool;

pub struct SqlTechnicianRepository {
    pool: DbPool,
}

impl SqlTechnicianRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Workload counts only tickets a technician is actively holding.
const CANDIDATE_SELECT: &str = "SELECT u.id, u.name, p.specialties_json, p.max_active_tickets,
        (p.available AND u.active) AS available,
        (SELECT COUNT(*) FROM ticket t
          WHERE t.technician_id = u.id AND t.status IN ('assigned', 'in_progress')) AS active_tickets
     FROM app_user u
     JOIN technician_profile p ON p.user_id = u.id
     WHERE u.role = 'technician'";

#[async_trait::async_trait]
impl TechnicianRepository for SqlTechnicianRepository {
    async fn save_profile(
        &self,
        profile: &TechnicianProfile,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let specialties = serde_json::to_string(&profile.specialties).map_err(|error| {
            RepositoryError::Decode(format!("failed to encode specialties: {error}"))
        })?;

        sqlx::query(
            "INSERT INTO technician_profile (user_id, specialties_json, max_active_tickets, available, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
               specialties_json = excluded.specialties_json,
               max_active_tickets = excluded.max_active_tickets,
               available = excluded.available,
               updated_at = excluded.updated_at",
        )
        .bind(&profile.user_id.0)
        .bind(specialties)
        .bind(i64::from(profile.max_active_tickets))
        .bind(profile.available)
        .bind(updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_profile(
        &self,
        id: &UserId,
    ) -> Result<Option<TechnicianProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, specialties_json, max_active_tickets, available
             FROM technician_profile WHERE user_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(TechnicianProfile {
                user_id: UserId(row.try_get("user_id")?),
                specialties: decode_specialties(row.try_get("specialties_json")?)?,
                max_active_tickets: parse_u32(
                    "max_active_tickets",
                    row.try_get("max_active_tickets")?,
                )?,
                available: row.try_get("available")?,
            })
        })
        .transpose()
    }

    async fn list_candidates(&self) -> Result<Vec<TechnicianCandidate>, RepositoryError> {
        let rows = sqlx::query(&format!("{CANDIDATE_SELECT} AND u.active = 1 ORDER BY u.id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(candidate_from_row).collect()
    }

    async fn find_candidate(
        &self,
        id: &UserId,
    ) -> Result<Option<TechnicianCandidate>, RepositoryError> {
        let row = sqlx::query(&format!("{CANDIDATE_SELECT} AND u.id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| candidate_from_row(&row)).transpose()
    }
}

fn candidate_from_row(row: &SqliteRow) -> Result<TechnicianCandidate, RepositoryError> {
    Ok(TechnicianCandidate {
        user_id: UserId(row.try_get("id")?),
        name: row.try_get("name")?,
        specialties: decode_specialties(row.try_get("specialties_json")?)?,
        active_tickets: parse_u32("active_tickets", row.try_get("active_tickets")?)?,
        max_active_tickets: parse_u32("max_active_tickets", row.try_get("max_active_tickets")?)?,
        available: row.try_get("available")?,
    })
}

fn decode_specialties(raw: String) -> Result<Vec<String>, RepositoryError> {
    serde_json::from_str(&raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid specialties_json `{raw}`: {error}"))
    })
}
