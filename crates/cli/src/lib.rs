pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "helpdesk",
    about = "Helpdesk operator CLI",
    long_about = "Operate the helpdesk backend: migrations, demo data, config inspection, readiness checks and SLA reporting.",
    after_help = "Examples:\n  helpdesk migrate\n  helpdesk seed --password 'demo-password'\n  helpdesk doctor --json\n  helpdesk sla-report"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo accounts and menu; safe to run repeatedly")]
    Seed {
        #[arg(
            long,
            default_value = "helpdesk-demo",
            help = "Password given to every demo account (at least 8 characters)"
        )]
        password: String,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity and schema version")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print SLA compliance across all stored tickets")]
    SlaReport,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { password } => commands::seed::run(&password),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::SlaReport => commands::sla_report::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
