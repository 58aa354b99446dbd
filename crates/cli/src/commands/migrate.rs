use crate::commands::{prepare, CommandResult, EXIT_DATABASE, EXIT_MIGRATION};
use helpdesk_db::{connect_with_config, migrations};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("migrate") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        let version = migrations::applied_version(&pool)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        pool.close().await;
        Ok::<Option<i64>, (&'static str, String, u8)>(version)
    });

    match result {
        Ok(version) => CommandResult::success(
            "migrate",
            format!(
                "applied pending migrations; schema at version {}",
                version.unwrap_or_default()
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
