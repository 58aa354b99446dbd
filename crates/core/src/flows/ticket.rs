//! Ticket lifecycle: five states, a lookup table of forward and backward moves,
//! and the bookkeeping each accepted move applies to the ticket record.

use chrono::{DateTime, Utc};

use crate::domain::ticket::{Ticket, TicketStatus};
use crate::domain::user::{Role, UserId};
use crate::flows::engine::{
    find_rule, FlowDefinition, FlowState, FlowTransitionError, TransitionRule,
};
use crate::flows::states::{Actor, TicketAction, TransitionDirection, TransitionOutcome};

const FLOW_NAME: &str = "ticket";

impl FlowState for TicketStatus {
    fn name(&self) -> &'static str {
        self.as_str()
    }
}

/// Which participants may drive a ticket transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TicketPermit {
    Admin,
    Assignee,
    Requester,
}

use TicketPermit::{Admin, Assignee, Requester};
use TicketStatus::{Assigned, Closed, InProgress, Open, Resolved};
use TransitionDirection::{Backward, Forward};

#[rustfmt::skip]
pub const TICKET_TRANSITIONS: &[TransitionRule<TicketStatus, TicketPermit>] = &[
    TransitionRule { from: Open, to: Assigned, direction: Forward, permits: &[Admin] },
    TransitionRule { from: Assigned, to: InProgress, direction: Forward, permits: &[Assignee, Admin] },
    TransitionRule { from: InProgress, to: Resolved, direction: Forward, permits: &[Assignee, Admin] },
    TransitionRule { from: Resolved, to: Closed, direction: Forward, permits: &[Requester, Admin] },
    TransitionRule { from: Assigned, to: Open, direction: Backward, permits: &[Admin, Assignee] },
    TransitionRule { from: InProgress, to: Assigned, direction: Backward, permits: &[Assignee, Admin] },
    TransitionRule { from: Resolved, to: InProgress, direction: Backward, permits: &[Requester, Admin] },
];

/// Facts about the ticket and caller that guards and permits are checked against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketContext {
    pub actor: Actor,
    pub requester_id: UserId,
    pub technician_id: Option<UserId>,
    pub resolution_note: Option<String>,
}

impl TicketContext {
    pub fn for_ticket(ticket: &Ticket, actor: Actor) -> Self {
        Self {
            actor,
            requester_id: ticket.requester_id.clone(),
            technician_id: ticket.technician_id.clone(),
            resolution_note: None,
        }
    }

    pub fn with_resolution_note(mut self, note: Option<String>) -> Self {
        self.resolution_note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self
    }

    fn holds(&self, permit: TicketPermit) -> bool {
        match permit {
            Admin => self.actor.role == Role::Admin,
            Assignee => {
                self.actor.role == Role::Technician
                    && self.technician_id.as_ref() == Some(&self.actor.user_id)
            }
            Requester => self.requester_id == self.actor.user_id,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TicketLifecycle;

impl FlowDefinition for TicketLifecycle {
    type State = TicketStatus;
    type Action = TicketAction;
    type Context = TicketContext;

    fn flow_name(&self) -> &'static str {
        FLOW_NAME
    }

    fn initial_state(&self) -> TicketStatus {
        Open
    }

    fn transition(
        &self,
        current: TicketStatus,
        target: TicketStatus,
        context: &TicketContext,
    ) -> Result<TransitionOutcome<TicketStatus, TicketAction>, FlowTransitionError> {
        let rule = find_rule(TICKET_TRANSITIONS, current, target).ok_or(
            FlowTransitionError::InvalidTransition {
                flow: FLOW_NAME,
                from: current.as_str(),
                to: target.as_str(),
            },
        )?;

        if !rule.permits.iter().any(|permit| context.holds(*permit)) {
            return Err(FlowTransitionError::NotPermitted {
                flow: FLOW_NAME,
                role: context.actor.role.as_str(),
                from: current.as_str(),
                to: target.as_str(),
            });
        }

        let guard = |reason: &str| FlowTransitionError::GuardFailed {
            flow: FLOW_NAME,
            from: current.as_str(),
            to: target.as_str(),
            reason: reason.to_string(),
        };

        use TicketAction::*;
        let actions = match (current, target) {
            (Open, Assigned) => {
                if context.technician_id.is_none() {
                    return Err(guard("a technician must be selected"));
                }
                vec![NotifyTechnician, NotifyRequester]
            }
            (Assigned, InProgress) => {
                if context.technician_id.is_none() {
                    return Err(guard("ticket has no assigned technician"));
                }
                vec![RecordFirstResponse, NotifyRequester]
            }
            (InProgress, Resolved) => {
                if context.resolution_note.is_none() {
                    return Err(guard("a resolution note is required"));
                }
                vec![EvaluateResolutionSla, NotifyRequester]
            }
            (Resolved, Closed) => vec![StampClosure, NotifyTechnician],
            (Assigned, Open) => vec![ClearAssignment, NotifyRequester],
            (InProgress, Assigned) => vec![NotifyRequester],
            (Resolved, InProgress) => vec![ReopenResolution, NotifyTechnician],
            _ => Vec::new(),
        };

        Ok(TransitionOutcome { from: current, to: target, direction: rule.direction, actions })
    }
}

/// Applies an accepted outcome to the ticket record.
///
/// `resolution_note` is only read when the outcome resolves the ticket.
pub fn apply_ticket_outcome(
    ticket: &mut Ticket,
    outcome: &TransitionOutcome<TicketStatus, TicketAction>,
    resolution_note: Option<&str>,
    now: DateTime<Utc>,
) {
    for action in &outcome.actions {
        match action {
            TicketAction::RecordFirstResponse => {
                ticket.record_first_response(now);
            }
            TicketAction::EvaluateResolutionSla => {
                ticket.resolved_at = Some(now);
                ticket.resolution_sla_met = Some(now <= ticket.resolution_due_at);
                ticket.resolution_note = resolution_note.map(str::to_string);
            }
            TicketAction::StampClosure => ticket.closed_at = Some(now),
            TicketAction::ClearAssignment => ticket.technician_id = None,
            TicketAction::ReopenResolution => {
                ticket.resolved_at = None;
                ticket.resolution_sla_met = None;
                ticket.resolution_note = None;
                ticket.reopen_count = ticket.reopen_count.saturating_add(1);
            }
            TicketAction::NotifyRequester | TicketAction::NotifyTechnician => {}
        }
    }
    ticket.status = outcome.to;
    ticket.updated_at = now;
}
