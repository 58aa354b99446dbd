use std::process::ExitCode;

fn main() -> ExitCode {
    helpdesk_cli::run()
}
