use crate::commands::{
    prepare, CommandResult, EXIT_DATABASE, EXIT_MIGRATION, EXIT_SEED_VERIFICATION,
};
use helpdesk_db::{connect_with_config, migrations, DemoSeedDataset, SeedResult};

pub fn run(password: &str) -> CommandResult {
    let (config, runtime) = match prepare("seed") {
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

        let seeded = DemoSeedDataset::load(&pool, password)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED_VERIFICATION))?;

        let run_result = if verification.all_present {
            Ok(seeded)
        } else {
            Err((
                "seed_verification",
                failed_checks_message(&verification.checks),
                EXIT_SEED_VERIFICATION,
            ))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(seeded: &SeedResult) -> String {
    let users = if seeded.users_created.is_empty() {
        "demo accounts already present".to_string()
    } else {
        format!("created accounts: {}", seeded.users_created.join(", "))
    };
    format!("demo dataset ready; {users}; {} menu items available", seeded.menu_items)
}

fn failed_checks_message(checks: &[(&'static str, bool)]) -> String {
    let failed = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed.join(", "))
    }
}
