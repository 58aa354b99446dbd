use helpdesk_core::config::AppConfig;
use helpdesk_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::app::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Connects and migrates using an already loaded config.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_config(&config.database)
        .await
        .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        schema_version = migrations::latest_known_version().unwrap_or_default(),
        "database migrations applied"
    );

    let state = AppState::from_config(db_pool.clone(), &config);
    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use helpdesk_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    const SECRET: &str = "bootstrap-test-secret-with-enough-bytes";

    fn config(database_url: &str) -> AppConfig {
        AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                token_secret: Some(SECRET.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("valid test config")
    }

    #[tokio::test]
    async fn bootstrap_reports_unreachable_database() {
        let config = config("sqlite:///missing-helpdesk-dir/nested/helpdesk.db");
        let result = bootstrap_with_config(config).await;

        let error = result.err().expect("database in a missing directory must fail");
        assert!(matches!(error, BootstrapError::DatabaseConnect(_)));
    }

    #[tokio::test]
    async fn bootstrap_migrates_schema_and_builds_state() {
        let app = bootstrap_with_config(config("sqlite::memory:"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' \
             AND name IN ('ticket', 'customer_order', 'sla_alert', 'audit_event')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables should be available after bootstrap");
        assert_eq!(table_count, 4);
        assert_eq!(app.state.settings.currency, app.config.orders.currency);

        app.db_pool.close().await;
    }
}
