use chrono::Utc;
use helpdesk_core::sla::{SlaClock, SlaComplianceReport};
use helpdesk_db::connect_with_config;
use helpdesk_db::repositories::{SqlTicketRepository, TicketFilter, TicketRepository};

use crate::commands::{prepare, CommandResult, EXIT_DATABASE};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("sla-report") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };
    let clock = SlaClock::from_policy(&config.sla.policy());

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string()))?;
        let tickets = SqlTicketRepository::new(pool.clone())
            .list(&TicketFilter::default())
            .await
            .map_err(|error| ("db_query", error.to_string()))?;
        pool.close().await;
        Ok::<_, (&'static str, String)>(SlaComplianceReport::build(&tickets, &clock, Utc::now()))
    });

    match result {
        Ok(report) => {
            let message = summary(&report);
            let data = serde_json::to_value(&report).ok();
            CommandResult::success_with_data("sla-report", message, data)
        }
        Err((error_class, message)) => {
            CommandResult::failure("sla-report", error_class, message, EXIT_DATABASE)
        }
    }
}

fn summary(report: &SlaComplianceReport) -> String {
    let rate = |value: Option<f64>| match value {
        Some(rate) => format!("{:.1}%", rate * 100.0),
        None => "n/a".to_string(),
    };
    format!(
        "{} tickets; response compliance {}; resolution compliance {}; {} at risk; {} breached and open",
        report.total_tickets,
        rate(report.response_rate),
        rate(report.resolution_rate),
        report.at_risk.len(),
        report.breached_open.len()
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use helpdesk_core::sla::{SlaClock, SlaComplianceReport};

    use super::summary;

    #[test]
    fn empty_report_prints_na_rates() {
        let report = SlaComplianceReport::build(&[], &SlaClock::new(0.25), Utc::now());
        assert_eq!(
            summary(&report),
            "0 tickets; response compliance n/a; resolution compliance n/a; 0 at risk; 0 breached and open"
        );
    }
}
