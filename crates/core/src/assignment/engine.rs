//! Candidate ranking and selection

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::scoring::{AssignmentWeights, ComponentScores, ScoreCalculator};
use crate::domain::ticket::{Ticket, TicketId, TicketStatus};
use crate::domain::user::{TechnicianProfile, UserId};
use crate::sla;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TechnicianCandidate {
    pub user_id: UserId,
    pub name: String,
    pub specialties: Vec<String>,
    pub active_tickets: u32,
    pub max_active_tickets: u32,
    pub available: bool,
}

impl TechnicianCandidate {
    pub fn from_profile(name: impl Into<String>, profile: &TechnicianProfile, active: u32) -> Self {
        Self {
            user_id: profile.user_id.clone(),
            name: name.into(),
            specialties: profile.specialties.clone(),
            active_tickets: active,
            max_active_tickets: profile.max_active_tickets,
            available: profile.available,
        }
    }

    pub fn ineligible_reason(&self) -> Option<String> {
        if !self.available {
            Some("technician is unavailable".to_string())
        } else if self.active_tickets >= self.max_active_tickets {
            Some(format!(
                "technician is at capacity ({}/{})",
                self.active_tickets, self.max_active_tickets
            ))
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    pub user_id: UserId,
    pub name: String,
    pub active_tickets: u32,
    pub max_active_tickets: u32,
    pub eligible: bool,
    pub ineligible_reason: Option<String>,
    pub scores: ComponentScores,
    pub total: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignmentDecision {
    pub ticket_id: TicketId,
    pub technician_id: UserId,
    pub technician_name: String,
    pub score: f64,
    pub urgency: f64,
    pub weights: AssignmentWeights,
    /// Every candidate considered, best first; ineligible ones trail.
    pub evaluations: Vec<CandidateEvaluation>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AssignmentError {
    #[error("no eligible technician for ticket {ticket_id} ({evaluated} evaluated)")]
    NoEligibleTechnician { ticket_id: String, evaluated: usize },
    #[error("ticket {ticket_id} cannot be assigned while {status}")]
    TicketNotAssignable { ticket_id: String, status: &'static str },
    #[error("technician {user_id} is not eligible: {reason}")]
    TechnicianNotEligible { user_id: String, reason: String },
}

#[derive(Clone, Debug, Default)]
pub struct AssignmentEngine {
    calculator: ScoreCalculator,
}

impl AssignmentEngine {
    pub fn new(weights: AssignmentWeights) -> Self {
        Self { calculator: ScoreCalculator::with_weights(weights) }
    }

    pub fn weights(&self) -> AssignmentWeights {
        self.calculator.weights()
    }

    /// Scores every candidate. Eligible candidates come first in selection order.
    pub fn rank(
        &self,
        ticket: &Ticket,
        candidates: &[TechnicianCandidate],
        now: DateTime<Utc>,
    ) -> Vec<CandidateEvaluation> {
        let urgency = sla::urgency(ticket, now);
        let mut evaluations: Vec<CandidateEvaluation> =
            candidates.iter().map(|candidate| self.evaluate(ticket, candidate, urgency)).collect();
        evaluations.sort_by(compare_evaluations);
        evaluations
    }

    pub fn assign(
        &self,
        ticket: &Ticket,
        candidates: &[TechnicianCandidate],
        now: DateTime<Utc>,
    ) -> Result<AssignmentDecision, AssignmentError> {
        ensure_assignable(ticket)?;

        let evaluations = self.rank(ticket, candidates, now);
        let Some(best) = evaluations.first().filter(|evaluation| evaluation.eligible) else {
            return Err(AssignmentError::NoEligibleTechnician {
                ticket_id: ticket.id.0.clone(),
                evaluated: evaluations.len(),
            });
        };

        Ok(AssignmentDecision {
            ticket_id: ticket.id.clone(),
            technician_id: best.user_id.clone(),
            technician_name: best.name.clone(),
            score: best.total,
            urgency: sla::urgency(ticket, now),
            weights: self.weights(),
            decided_at: now,
            evaluations,
        })
    }

    /// Admin-chosen technician; only eligibility is checked, not rank.
    pub fn assign_manual(
        &self,
        ticket: &Ticket,
        candidate: &TechnicianCandidate,
        now: DateTime<Utc>,
    ) -> Result<AssignmentDecision, AssignmentError> {
        ensure_assignable(ticket)?;
        if let Some(reason) = candidate.ineligible_reason() {
            return Err(AssignmentError::TechnicianNotEligible {
                user_id: candidate.user_id.0.clone(),
                reason,
            });
        }

        let urgency = sla::urgency(ticket, now);
        let evaluation = self.evaluate(ticket, candidate, urgency);
        Ok(AssignmentDecision {
            ticket_id: ticket.id.clone(),
            technician_id: candidate.user_id.clone(),
            technician_name: candidate.name.clone(),
            score: evaluation.total,
            urgency,
            weights: self.weights(),
            decided_at: now,
            evaluations: vec![evaluation],
        })
    }

    fn evaluate(
        &self,
        ticket: &Ticket,
        candidate: &TechnicianCandidate,
        urgency: f64,
    ) -> CandidateEvaluation {
        let load = self
            .calculator
            .load_score(candidate.active_tickets, candidate.max_active_tickets);
        let scores = ComponentScores {
            specialty: self.calculator.specialty_score(&ticket.category, &candidate.specialties),
            load,
            urgency: self.calculator.urgency_score(urgency, load),
        };
        let ineligible_reason = candidate.ineligible_reason();

        CandidateEvaluation {
            user_id: candidate.user_id.clone(),
            name: candidate.name.clone(),
            active_tickets: candidate.active_tickets,
            max_active_tickets: candidate.max_active_tickets,
            eligible: ineligible_reason.is_none(),
            ineligible_reason,
            total: self.calculator.calculate_total_score(&scores),
            scores,
        }
    }
}

fn ensure_assignable(ticket: &Ticket) -> Result<(), AssignmentError> {
    if ticket.status != TicketStatus::Open {
        return Err(AssignmentError::TicketNotAssignable {
            ticket_id: ticket.id.0.clone(),
            status: ticket.status.as_str(),
        });
    }
    Ok(())
}

fn compare_evaluations(a: &CandidateEvaluation, b: &CandidateEvaluation) -> Ordering {
    b.eligible
        .cmp(&a.eligible)
        .then_with(|| b.total.partial_cmp(&a.total).unwrap_or(Ordering::Equal))
        .then_with(|| a.active_tickets.cmp(&b.active_tickets))
        .then_with(|| a.user_id.cmp(&b.user_id))
}
