use helpdesk_core::config::{AppConfig, LoadOptions};
use helpdesk_db::{connect_with_config, migrations};
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_DATABASE, EXIT_MIGRATION};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn exit_code(&self) -> u8 {
        let failed = |name: &str| {
            self.checks.iter().any(|check| check.name == name && check.status == CheckStatus::Fail)
        };
        if failed("config_validation") {
            EXIT_CONFIG
        } else if failed("database_connectivity") {
            EXIT_DATABASE
        } else if failed("schema_version") {
            EXIT_MIGRATION
        } else {
            0
        }
    }
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = report.exit_code();

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["database_connectivity", "schema_version"] {
                checks.push(skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str, reason: &str) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                skipped("schema_version", "the database was not reachable"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    skipped("schema_version", "the database was not reachable"),
                ];
            }
        };

        let connectivity = DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        };
        let schema = match migrations::applied_version(&pool).await {
            Ok(applied) => schema_check(applied, migrations::latest_known_version()),
            Err(error) => DoctorCheck {
                name: "schema_version",
                status: CheckStatus::Fail,
                details: format!("could not read applied migrations: {error}"),
            },
        };
        pool.close().await;
        vec![connectivity, schema]
    })
}

fn schema_check(applied: Option<i64>, latest: Option<i64>) -> DoctorCheck {
    let describe = |version: Option<i64>| {
        version.map(|version| version.to_string()).unwrap_or_else(|| "none".to_string())
    };
    if applied == latest {
        DoctorCheck {
            name: "schema_version",
            status: CheckStatus::Pass,
            details: format!("schema at version {}", describe(applied)),
        }
    } else {
        DoctorCheck {
            name: "schema_version",
            status: CheckStatus::Fail,
            details: format!(
                "schema at version {} but {} is available; run `helpdesk migrate`",
                describe(applied),
                describe(latest)
            ),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
