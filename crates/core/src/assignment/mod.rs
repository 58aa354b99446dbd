//! Automatic technician assignment.
//!
//! Candidates are scored on specialty match, remaining capacity and how much
//! the ticket's SLA urgency favours an idle technician.

mod engine;
mod scoring;

pub use engine::{
    AssignmentDecision, AssignmentEngine, AssignmentError, CandidateEvaluation, TechnicianCandidate,
};
pub use scoring::{AssignmentWeights, ComponentScores, ScoreCalculator};

/// Specialty that matches any category at reduced strength.
pub const GENERAL_SPECIALTY: &str = "general";

pub const DEFAULT_WEIGHTS: AssignmentWeights =
    AssignmentWeights { specialty: 0.5, load: 0.3, urgency: 0.2 };
