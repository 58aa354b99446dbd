//! Background scan that raises at-risk and breach notifications for unresolved tickets.
//!
//! Each alert kind fires once per ticket; the `sla_alert` marker table makes the scan
//! safe to repeat. A marker is only written together with its notifications, so an alert
//! nobody could receive is retried on the next scan. A priority change clears the markers
//! so the new deadlines alert again.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use helpdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use helpdesk_core::domain::notification::{Notification, NotificationKind};
use helpdesk_core::domain::ticket::Ticket;
use helpdesk_core::domain::user::UserId;
use helpdesk_core::sla::SlaSnapshot;
use helpdesk_db::repositories::{
    NotificationRepository, RepositoryError, SlaAlertKind, TicketRepository,
};

use crate::app::AppState;
use crate::audit;
use crate::notifications::active_admins;

const MONITOR_ACTOR: &str = "system:sla-monitor";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub scanned: usize,
    pub at_risk_alerts: usize,
    pub breach_alerts: usize,
}

/// Runs [`scan_once`] every `interval` until `shutdown` flips to `true`.
pub fn spawn(
    state: AppState,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            event_name = "sla.monitor.started",
            interval_secs = interval.as_secs(),
            "SLA monitor started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let correlation_id = format!("sla-scan-{}", Utc::now().timestamp());
                    match scan_once(&state, Utc::now(), &correlation_id).await {
                        Ok(summary) if summary.at_risk_alerts + summary.breach_alerts > 0 => info!(
                            event_name = "sla.monitor.alerts_raised",
                            correlation_id = %correlation_id,
                            scanned = summary.scanned,
                            at_risk = summary.at_risk_alerts,
                            breached = summary.breach_alerts,
                            "SLA alerts raised"
                        ),
                        Ok(_) => {}
                        Err(error) => warn!(
                            event_name = "sla.monitor.scan_failed",
                            correlation_id = %correlation_id,
                            error = %error,
                            "SLA scan failed; retrying on next tick"
                        ),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(event_name = "sla.monitor.stopped", "SLA monitor stopped");
    })
}

pub async fn scan_once(
    state: &AppState,
    now: DateTime<Utc>,
    correlation_id: &str,
) -> Result<ScanSummary, RepositoryError> {
    let tickets = state.tickets().list_unresolved().await?;
    let mut summary = ScanSummary { scanned: tickets.len(), ..ScanSummary::default() };
    let sink = state.audit_sink();

    for ticket in &tickets {
        let snapshot = state.settings.sla_clock.evaluate(ticket, now);
        let kind = if snapshot.is_breached() {
            SlaAlertKind::Breached
        } else if snapshot.is_at_risk() {
            SlaAlertKind::AtRisk
        } else {
            continue;
        };

        let recipients = alert_recipients(state, ticket).await?;
        if recipients.is_empty() {
            warn!(
                event_name = "sla.alert.no_recipient",
                correlation_id = %correlation_id,
                ticket_id = %ticket.id.0,
                kind = kind.as_str(),
                "no one can receive this SLA alert yet; retrying on next scan"
            );
            continue;
        }
        let notifications = recipients
            .into_iter()
            .map(|recipient| alert_notification(recipient, ticket, kind, &snapshot))
            .collect::<Vec<_>>();
        if !state.notifications().raise_sla_alert(&ticket.id, kind, now, &notifications).await? {
            continue;
        }

        match kind {
            SlaAlertKind::Breached => summary.breach_alerts += 1,
            SlaAlertKind::AtRisk => summary.at_risk_alerts += 1,
        }
        sink.emit(
            AuditEvent::new(
                Some(ticket.id.0.clone()),
                correlation_id,
                format!("sla.{}", kind.as_str()),
                AuditCategory::Sla,
                MONITOR_ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("priority", ticket.priority.as_str())
            .with_metadata("urgency", format!("{:.4}", snapshot.urgency))
            .with_metadata("recipients", notifications.len().to_string()),
        );
    }

    audit::flush(state, &sink).await;
    Ok(summary)
}

async fn alert_recipients(
    state: &AppState,
    ticket: &Ticket,
) -> Result<Vec<UserId>, RepositoryError> {
    match &ticket.technician_id {
        Some(technician) => Ok(vec![technician.clone()]),
        None => active_admins(state).await,
    }
}

fn alert_notification(
    recipient: UserId,
    ticket: &Ticket,
    kind: SlaAlertKind,
    snapshot: &SlaSnapshot,
) -> Notification {
    let (kind, message) = match kind {
        SlaAlertKind::Breached => (
            NotificationKind::SlaBreached,
            format!("SLA breached for {} ticket: {}", ticket.priority.as_str(), ticket.title),
        ),
        SlaAlertKind::AtRisk => {
            let minutes = snapshot
                .resolution
                .remaining_minutes
                .or(snapshot.response.remaining_minutes)
                .unwrap_or_default();
            (
                NotificationKind::SlaAtRisk,
                format!("SLA at risk ({minutes} min left) for ticket: {}", ticket.title),
            )
        }
    };
    Notification::new(recipient, kind, ticket.id.0.clone(), message)
}
