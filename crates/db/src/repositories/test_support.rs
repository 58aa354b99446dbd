use chrono::{DateTime, Utc};

use helpdesk_core::domain::user::{Role, User, UserId};

use super::{SqlUserRepository, UserRepository};
use crate::{connect_with_settings, migrations, DbPool};

pub(crate) async fn setup_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
    migrations::run_pending(&pool).await.expect("run migrations");
    pool
}

pub(crate) async fn seed_user(pool: &DbPool, id: &str, role: Role) -> User {
    let user = User {
        id: UserId(id.to_string()),
        name: format!("User {id}"),
        email: format!("{}@example.test", id.to_ascii_lowercase()),
        role,
        active: true,
        created_at: parse_ts("2026-02-23T12:00:00Z"),
    };
    SqlUserRepository::new(pool.clone()).insert(&user, "v1$00$00").await.expect("seed user");
    user
}

pub(crate) fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
}
