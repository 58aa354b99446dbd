use std::env;
use std::sync::{Mutex, OnceLock};

use helpdesk_cli::commands::{config, doctor, migrate, seed, sla_report};
use serde_json::Value;

const SECRET: &str = "integration-test-signing-secret-0123456789";
const PASSWORD: &str = "demo-password";

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("HELPDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_token_secret() {
    with_env_raw(&[("HELPDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("auth.token_secret"));
    });
}

#[test]
fn seed_loads_demo_dataset() {
    with_env(&[("HELPDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run(PASSWORD);
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().unwrap_or_default().contains("menu items available"));
    });
}

#[test]
fn seed_is_idempotent_against_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("helpdesk.db").display());

    with_env(&[("HELPDESK_DATABASE_URL", url.as_str())], || {
        let first = seed::run(PASSWORD);
        assert_eq!(first.exit_code, 0, "expected first seed success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert!(first_payload["message"]
            .as_str()
            .unwrap_or_default()
            .contains("created accounts"));

        let second = seed::run(PASSWORD);
        assert_eq!(second.exit_code, 0, "expected second seed success: {}", second.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["status"], "ok");
        assert!(second_payload["message"]
            .as_str()
            .unwrap_or_default()
            .contains("already present"));
    });
}

#[test]
fn sla_report_summarizes_migrated_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("helpdesk.db").display());

    with_env(&[("HELPDESK_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = sla_report::run();
        assert_eq!(result.exit_code, 0, "expected sla report success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sla-report");
        assert_eq!(payload["data"]["total_tickets"], 0);
        assert!(payload["message"].as_str().unwrap_or_default().starts_with("0 tickets"));
    });
}

#[test]
fn doctor_flags_unmigrated_schema() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("helpdesk.db").display());

    with_env(&[("HELPDESK_DATABASE_URL", url.as_str())], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 5, "expected schema failure: {}", before.output);
        let report = parse_payload(&before.output);
        assert_eq!(report["overall_status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0, "expected all checks to pass: {}", after.output);
        assert_eq!(parse_payload(&after.output)["overall_status"], "pass");
    });
}

#[test]
fn config_reports_env_sources_and_redacts_secret() {
    with_env(
        &[("HELPDESK_DATABASE_URL", "sqlite::memory:"), ("HELPDESK_ORDERS_TAX_RATE_PCT", "8.5")],
        || {
            let output = config::run();
            assert!(output.contains(
                "- orders.tax_rate_pct = 8.5 (source: env (HELPDESK_ORDERS_TAX_RATE_PCT))"
            ));
            assert!(output.contains(
                "- auth.token_secret = <redacted> (source: env (HELPDESK_AUTH_TOKEN_SECRET))"
            ));
            assert!(output.contains("- sla.critical.response_hours = 1 (source: default)"));
            assert!(!output.contains(SECRET));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

/// Runs with a valid signing secret in addition to `vars`.
fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    let mut all = vec![("HELPDESK_AUTH_TOKEN_SECRET", SECRET)];
    all.extend_from_slice(vars);
    with_env_raw(&all, test_fn);
}

fn with_env_raw(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "HELPDESK_DATABASE_URL",
        "HELPDESK_DATABASE_MAX_CONNECTIONS",
        "HELPDESK_DATABASE_TIMEOUT_SECS",
        "HELPDESK_AUTH_TOKEN_SECRET",
        "HELPDESK_AUTH_TOKEN_TTL_MINUTES",
        "HELPDESK_SERVER_BIND_ADDRESS",
        "HELPDESK_SERVER_PORT",
        "HELPDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "HELPDESK_SLA_AT_RISK_RATIO",
        "HELPDESK_SLA_CRITICAL_RESPONSE_HOURS",
        "HELPDESK_ORDERS_CURRENCY",
        "HELPDESK_ORDERS_TAX_RATE_PCT",
        "HELPDESK_ASSIGNMENT_AUTO_ASSIGN",
        "HELPDESK_LOGGING_LEVEL",
        "HELPDESK_LOGGING_FORMAT",
        "HELPDESK_LOG_LEVEL",
        "HELPDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
