use sqlx::{sqlite::SqliteRow, Row};

use helpdesk_core::domain::user::{Role, User, UserId};

use super::codec::{parse_enum, parse_timestamp};
use super::{RepositoryError, UserCredentials, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, active, created_at";

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn insert(&self, user: &User, password_hash: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (id, name, email, password_hash, role, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(password_hash)
        .bind(user.role.as_str())
        .bind(user.active)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            RepositoryError::on_unique(
                error,
                format!("email `{}` is already registered", user.email),
            )
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM app_user WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| user_from_row(&row)).transpose()
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM app_user WHERE email = ? COLLATE NOCASE"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(UserCredentials {
                user: user_from_row(&row)?,
                password_hash: row.try_get("password_hash")?,
            })
        })
        .transpose()
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM app_user WHERE role = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(user_from_row).collect()
    }

    async fn set_active(&self, id: &UserId, active: bool) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE app_user SET active = ? WHERE id = ?")
            .bind(active)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

pub(crate) fn user_from_row(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role_raw: String = row.try_get("role")?;
    Ok(User {
        id: UserId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: parse_enum("role", &role_raw, Role::parse)?,
        active: row.try_get("active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use helpdesk_core::domain::user::{Role, User, UserId};

    use super::SqlUserRepository;
    use crate::migrations;
    use crate::repositories::{RepositoryError, UserRepository};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn insert_and_find_by_id_and_email() {
        let pool = setup_pool().await;
        let repo = SqlUserRepository::new(pool.clone());
        let user = sample_user("USR-1", "ada@example.test", Role::Technician);

        repo.insert(&user, "v1$00$11").await.expect("insert user");

        assert_eq!(repo.find_by_id(&user.id).await.expect("find"), Some(user.clone()));

        let credentials = repo
            .find_credentials_by_email("ADA@example.test")
            .await
            .expect("find by email")
            .expect("credentials exist");
        assert_eq!(credentials.user, user);
        assert_eq!(credentials.password_hash, "v1$00$11");

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let pool = setup_pool().await;
        let repo = SqlUserRepository::new(pool.clone());

        repo.insert(&sample_user("USR-1", "dup@example.test", Role::Customer), "h")
            .await
            .expect("first insert");
        let error = repo
            .insert(&sample_user("USR-2", "dup@example.test", Role::Customer), "h")
            .await
            .expect_err("duplicate email");
        assert!(matches!(error, RepositoryError::Conflict(_)));

        pool.close().await;
    }

    #[tokio::test]
    async fn list_by_role_and_deactivate() {
        let pool = setup_pool().await;
        let repo = SqlUserRepository::new(pool.clone());
        repo.insert(&sample_user("USR-a", "a@example.test", Role::Admin), "h").await.expect("a");
        repo.insert(&sample_user("USR-t", "t@example.test", Role::Technician), "h")
            .await
            .expect("t");

        let admins = repo.list_by_role(Role::Admin).await.expect("list admins");
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].id, UserId("USR-a".to_string()));

        assert!(repo.set_active(&UserId("USR-t".to_string()), false).await.expect("deactivate"));
        let technician =
            repo.find_by_id(&UserId("USR-t".to_string())).await.expect("find").expect("exists");
        assert!(!technician.active);
        assert!(!repo.set_active(&UserId("USR-none".to_string()), false).await.expect("missing"));

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_user(id: &str, email: &str, role: Role) -> User {
        User {
            id: UserId(id.to_string()),
            name: format!("User {id}"),
            email: email.to_string(),
            role,
            active: true,
            created_at: parse_ts("2026-02-23T12:00:00Z"),
        }
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
