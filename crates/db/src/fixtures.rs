use chrono::Utc;
use sqlx::Executor;

use helpdesk_core::auth::hash_password;
use helpdesk_core::domain::user::{Role, TechnicianProfile, User, UserId};

use crate::connection::DbPool;
use crate::repositories::{
    RepositoryError, SqlTechnicianRepository, SqlUserRepository, TechnicianRepository,
    UserRepository,
};

const SEED_USERS: &[SeedUser] = &[
    SeedUser {
        id: "USR-demo-admin",
        name: "Avery Admin",
        email: "admin@helpdesk.local",
        role: Role::Admin,
        specialties: &[],
        max_active_tickets: 0,
    },
    SeedUser {
        id: "USR-demo-tech-network",
        name: "Nadia Network",
        email: "nadia@helpdesk.local",
        role: Role::Technician,
        specialties: &["network", "hardware"],
        max_active_tickets: 5,
    },
    SeedUser {
        id: "USR-demo-tech-software",
        name: "Samir Software",
        email: "samir@helpdesk.local",
        role: Role::Technician,
        specialties: &["software", "general"],
        max_active_tickets: 4,
    },
    SeedUser {
        id: "USR-demo-customer",
        name: "Casey Customer",
        email: "casey@example.com",
        role: Role::Customer,
        specialties: &[],
        max_active_tickets: 0,
    },
];

const SEED_CATEGORY_IDS: &[&str] = &["CAT-mains", "CAT-drinks"];

const SEED_ITEMS: &[(&str, usize)] =
    &[("ITM-burger", 2), ("ITM-salad", 1), ("ITM-lemonade", 1), ("ITM-espresso", 0)];

const SEED_OPTION_COUNT: i64 = 9;

/// Demo accounts and a small menu for local runs and end-to-end tests.
///
/// Accounts are created through the user repository so passwords are hashed the
/// same way registration hashes them; the menu comes from a SQL fixture.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loads the dataset; existing rows are left untouched so repeated runs are safe.
    pub async fn load(pool: &DbPool, password: &str) -> Result<SeedResult, RepositoryError> {
        let password_hash = hash_password(password)
            .map_err(|error| RepositoryError::Decode(format!("seed password rejected: {error}")))?;
        let users = SqlUserRepository::new(pool.clone());
        let technicians = SqlTechnicianRepository::new(pool.clone());
        let now = Utc::now();

        let mut users_created = Vec::new();
        for seed in SEED_USERS {
            let id = UserId(seed.id.to_string());
            if users.find_by_id(&id).await?.is_some() {
                continue;
            }
            let user = User {
                id: id.clone(),
                name: seed.name.to_string(),
                email: seed.email.to_string(),
                role: seed.role,
                active: true,
                created_at: now,
            };
            users.insert(&user, &password_hash).await?;
            if seed.role == Role::Technician {
                let profile =
                    TechnicianProfile::new(id, seed.specialties.iter(), seed.max_active_tickets);
                technicians.save_profile(&profile, now).await?;
            }
            users_created.push(seed.email);
        }

        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult { users_created, menu_items: SEED_ITEMS.len() })
    }

    /// Checks that every seeded record exists with the expected shape.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for seed in SEED_USERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM app_user WHERE id = ?1 AND email = ?2 AND role = ?3)",
            )
            .bind(seed.id)
            .bind(seed.email)
            .bind(seed.role.as_str())
            .fetch_one(pool)
            .await?;
            checks.push((seed.id, present == 1));

            if seed.role == Role::Technician {
                let profile = SqlTechnicianRepository::new(pool.clone())
                    .find_profile(&UserId(seed.id.to_string()))
                    .await?;
                let matches = profile.is_some_and(|profile| {
                    profile.max_active_tickets == seed.max_active_tickets
                        && profile
                            .specialties
                            .iter()
                            .map(String::as_str)
                            .eq(seed.specialties.iter().copied())
                });
                checks.push(("technician-profile", matches));
            }
        }

        let categories: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM menu_category WHERE id IN {}",
            sql_array_from_ids(SEED_CATEGORY_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("menu-categories", categories == SEED_CATEGORY_IDS.len() as i64));

        for (item_id, group_count) in SEED_ITEMS {
            let groups: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM variant_group WHERE item_id = ?1")
                    .bind(item_id)
                    .fetch_one(pool)
                    .await?;
            let exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM menu_item WHERE id = ?1)")
                    .bind(item_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((item_id, exists == 1 && groups == *group_count as i64));
        }

        let options: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM variant_option o JOIN variant_group g ON g.id = o.group_id
             WHERE g.item_id IN {}",
            sql_array_from_ids(&SEED_ITEMS.iter().map(|(id, _)| *id).collect::<Vec<_>>())
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("menu-options", options == SEED_OPTION_COUNT));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedUser {
    id: &'static str,
    name: &'static str,
    email: &'static str,
    role: Role,
    specialties: &'static [&'static str],
    max_active_tickets: u32,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub users_created: Vec<&'static str>,
    pub menu_items: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use helpdesk_core::auth::verify_password;

    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_idempotent_text() {
        assert!(!DemoSeedDataset::SQL.is_empty());
        for statement in DemoSeedDataset::SQL.split(';').filter(|s| s.contains("INSERT")) {
            assert!(
                statement.contains("INSERT OR IGNORE"),
                "non-idempotent statement: {statement}"
            );
        }
    }

    #[tokio::test]
    async fn load_verify_and_reload() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoSeedDataset::load(&pool, "demo-password").await.expect("load seed");
        assert_eq!(first.users_created.len(), SEED_USERS.len());
        let verification = DemoSeedDataset::verify(&pool).await.expect("verify seed");
        assert!(verification.all_present, "{:?}", verification.checks);

        let second = DemoSeedDataset::load(&pool, "another-password").await.expect("reload seed");
        assert!(second.users_created.is_empty());
        let again = DemoSeedDataset::verify(&pool).await.expect("re-verify seed");
        assert_eq!(verification.checks, again.checks);

        let credentials = SqlUserRepository::new(pool.clone())
            .find_credentials_by_email("admin@helpdesk.local")
            .await
            .expect("lookup admin")
            .expect("admin exists");
        assert!(verify_password("demo-password", &credentials.password_hash).expect("hash"));

        pool.close().await;
    }

    #[tokio::test]
    async fn weak_seed_password_is_rejected() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        let error = DemoSeedDataset::load(&pool, "short").await.expect_err("weak password");
        assert!(matches!(error, RepositoryError::Decode(_)));

        pool.close().await;
    }

    #[test]
    fn seed_contract_json_matches_rust_seed_constants() {
        let contract: serde_json::Value =
            serde_json::from_str(include_str!("../../../config/fixtures/demo_seed_contract.json"))
                .expect("demo seed contract JSON must parse");

        let users = contract["users"].as_array().expect("users should be an array");
        assert_eq!(users.len(), SEED_USERS.len());
        for seed in SEED_USERS {
            let user = users
                .iter()
                .find(|candidate| candidate["id"].as_str() == Some(seed.id))
                .expect("contract lists every seeded user");
            assert_eq!(user["email"].as_str(), Some(seed.email));
            assert_eq!(user["role"].as_str(), Some(seed.role.as_str()));
        }

        let items = contract["menu"]["items"].as_array().expect("items should be an array");
        assert_eq!(items.len(), SEED_ITEMS.len());
        assert_eq!(contract["menu"]["option_count"].as_i64(), Some(SEED_OPTION_COUNT));
    }
}
