//! SLA deadlines, per-ticket clock evaluation and compliance reporting.
//!
//! Deadlines are fixed at ticket creation from the priority's response and
//! resolution windows; they move only when the priority changes, and are then
//! recomputed from the original creation time. Time is wall-clock.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ticket::{Ticket, TicketId, TicketPriority};

pub const DEFAULT_AT_RISK_RATIO: f64 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaTarget {
    pub response_minutes: i64,
    pub resolution_minutes: i64,
}

impl SlaTarget {
    pub const fn hours(response: i64, resolution: i64) -> Self {
        Self { response_minutes: response * 60, resolution_minutes: resolution * 60 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlaPolicy {
    pub low: SlaTarget,
    pub medium: SlaTarget,
    pub high: SlaTarget,
    pub critical: SlaTarget,
    pub at_risk_ratio: f64,
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self {
            low: SlaTarget::hours(24, 72),
            medium: SlaTarget::hours(8, 48),
            high: SlaTarget::hours(4, 24),
            critical: SlaTarget::hours(1, 4),
            at_risk_ratio: DEFAULT_AT_RISK_RATIO,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaDeadlines {
    pub response_due_at: DateTime<Utc>,
    pub resolution_due_at: DateTime<Utc>,
}

impl SlaPolicy {
    pub fn target(&self, priority: TicketPriority) -> SlaTarget {
        match priority {
            TicketPriority::Low => self.low,
            TicketPriority::Medium => self.medium,
            TicketPriority::High => self.high,
            TicketPriority::Critical => self.critical,
        }
    }

    pub fn deadlines(&self, priority: TicketPriority, opened_at: DateTime<Utc>) -> SlaDeadlines {
        let target = self.target(priority);
        SlaDeadlines {
            response_due_at: opened_at + Duration::minutes(target.response_minutes),
            resolution_due_at: opened_at + Duration::minutes(target.resolution_minutes),
        }
    }

    /// Re-targets a ticket after a priority change. Recorded verdicts are recomputed
    /// against the new deadlines so reports stay consistent with what is displayed.
    pub fn reprioritize(&self, ticket: &mut Ticket, priority: TicketPriority, now: DateTime<Utc>) {
        let deadlines = self.deadlines(priority, ticket.created_at);
        ticket.priority = priority;
        ticket.response_due_at = deadlines.response_due_at;
        ticket.resolution_due_at = deadlines.resolution_due_at;
        ticket.response_sla_met =
            ticket.first_response_at.map(|at| at <= deadlines.response_due_at);
        ticket.resolution_sla_met = ticket.resolved_at.map(|at| at <= deadlines.resolution_due_at);
        ticket.updated_at = now;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaState {
    OnTrack,
    AtRisk,
    Breached,
    Met,
}

impl SlaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTrack => "on_track",
            Self::AtRisk => "at_risk",
            Self::Breached => "breached",
            Self::Met => "met",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlaTargetStatus {
    pub state: SlaState,
    pub due_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Signed minutes until the deadline; negative once overdue. `None` once completed.
    pub remaining_minutes: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlaSnapshot {
    pub ticket_id: TicketId,
    pub response: SlaTargetStatus,
    pub resolution: SlaTargetStatus,
    pub urgency: f64,
    pub evaluated_at: DateTime<Utc>,
}

impl SlaSnapshot {
    pub fn is_breached(&self) -> bool {
        self.response.state == SlaState::Breached || self.resolution.state == SlaState::Breached
    }

    pub fn is_at_risk(&self) -> bool {
        let at_risk = |state: SlaState| state == SlaState::AtRisk;
        !self.is_breached() && (at_risk(self.response.state) || at_risk(self.resolution.state))
    }
}

#[derive(Clone, Debug)]
pub struct SlaClock {
    at_risk_ratio: f64,
}

impl Default for SlaClock {
    fn default() -> Self {
        Self { at_risk_ratio: DEFAULT_AT_RISK_RATIO }
    }
}

impl SlaClock {
    pub fn new(at_risk_ratio: f64) -> Self {
        Self { at_risk_ratio: at_risk_ratio.clamp(0.0, 1.0) }
    }

    pub fn from_policy(policy: &SlaPolicy) -> Self {
        Self::new(policy.at_risk_ratio)
    }

    pub fn evaluate(&self, ticket: &Ticket, now: DateTime<Utc>) -> SlaSnapshot {
        SlaSnapshot {
            ticket_id: ticket.id.clone(),
            response: self.target_status(
                ticket.created_at,
                ticket.response_due_at,
                ticket.first_response_at,
                now,
            ),
            resolution: self.target_status(
                ticket.created_at,
                ticket.resolution_due_at,
                ticket.resolved_at,
                now,
            ),
            urgency: urgency(ticket, now),
            evaluated_at: now,
        }
    }

    fn target_status(
        &self,
        opened_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> SlaTargetStatus {
        if let Some(completed) = completed_at {
            let state = if completed <= due_at { SlaState::Met } else { SlaState::Breached };
            return SlaTargetStatus { state, due_at, completed_at, remaining_minutes: None };
        }

        let remaining = due_at - now;
        let window = (due_at - opened_at).num_seconds().max(1) as f64;
        let state = if now > due_at {
            SlaState::Breached
        } else if (remaining.num_seconds() as f64) <= self.at_risk_ratio * window {
            SlaState::AtRisk
        } else {
            SlaState::OnTrack
        };

        SlaTargetStatus {
            state,
            due_at,
            completed_at: None,
            remaining_minutes: Some(remaining.num_minutes()),
        }
    }
}

/// How pressing the ticket is right now, in `[0, 1]`.
///
/// The larger of the priority's baseline weight and the elapsed share of the
/// resolution window; resolved tickets keep their baseline.
pub fn urgency(ticket: &Ticket, now: DateTime<Utc>) -> f64 {
    let baseline = ticket.priority.urgency_weight();
    if ticket.resolved_at.is_some() {
        return baseline;
    }
    if now >= ticket.resolution_due_at {
        return 1.0;
    }
    let window = (ticket.resolution_due_at - ticket.created_at).num_seconds().max(1) as f64;
    let elapsed = (now - ticket.created_at).num_seconds().max(0) as f64;
    baseline.max(elapsed / window).clamp(0.0, 1.0)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceCounts {
    pub met: u32,
    pub breached: u32,
}

impl ComplianceCounts {
    fn record(&mut self, verdict: Option<bool>) {
        match verdict {
            Some(true) => self.met += 1,
            Some(false) => self.breached += 1,
            None => {}
        }
    }

    /// Share of decided targets that were met; `None` until something is decided.
    pub fn rate(&self) -> Option<f64> {
        let decided = self.met + self.breached;
        (decided > 0).then(|| f64::from(self.met) / f64::from(decided))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityCompliance {
    pub tickets: u32,
    pub response: ComplianceCounts,
    pub resolution: ComplianceCounts,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlaComplianceReport {
    pub generated_at: DateTime<Utc>,
    pub total_tickets: u32,
    pub response: ComplianceCounts,
    pub resolution: ComplianceCounts,
    pub response_rate: Option<f64>,
    pub resolution_rate: Option<f64>,
    pub by_priority: BTreeMap<String, PriorityCompliance>,
    pub at_risk: Vec<TicketId>,
    pub breached_open: Vec<TicketId>,
}

impl SlaComplianceReport {
    pub fn build(tickets: &[Ticket], clock: &SlaClock, now: DateTime<Utc>) -> Self {
        let mut response = ComplianceCounts::default();
        let mut resolution = ComplianceCounts::default();
        let mut by_priority: BTreeMap<String, PriorityCompliance> = BTreeMap::new();
        let mut at_risk = Vec::new();
        let mut breached_open = Vec::new();

        for ticket in tickets {
            response.record(ticket.response_sla_met);
            resolution.record(ticket.resolution_sla_met);

            let bucket = by_priority.entry(ticket.priority.as_str().to_string()).or_default();
            bucket.tickets += 1;
            bucket.response.record(ticket.response_sla_met);
            bucket.resolution.record(ticket.resolution_sla_met);

            if ticket.status.is_unresolved() {
                let snapshot = clock.evaluate(ticket, now);
                if snapshot.is_breached() {
                    breached_open.push(ticket.id.clone());
                } else if snapshot.is_at_risk() {
                    at_risk.push(ticket.id.clone());
                }
            }
        }

        Self {
            generated_at: now,
            total_tickets: u32::try_from(tickets.len()).unwrap_or(u32::MAX),
            response_rate: response.rate(),
            resolution_rate: resolution.rate(),
            response,
            resolution,
            by_priority,
            at_risk,
            breached_open,
        }
    }
}
