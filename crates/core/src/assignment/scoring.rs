//! Scoring components for technician assignment

use serde::{Deserialize, Serialize};

use super::GENERAL_SPECIALTY;

/// Weights for scoring components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssignmentWeights {
    /// Weight for category/specialty match (default: 0.5)
    pub specialty: f64,
    /// Weight for remaining capacity (default: 0.3)
    pub load: f64,
    /// Weight for SLA urgency (default: 0.2)
    pub urgency: f64,
}

impl Default for AssignmentWeights {
    fn default() -> Self {
        super::DEFAULT_WEIGHTS
    }
}

impl AssignmentWeights {
    pub fn sum(&self) -> f64 {
        self.specialty + self.load + self.urgency
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub specialty: f64,
    pub load: f64,
    pub urgency: f64,
}

#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    weights: AssignmentWeights,
}

impl Default for ScoreCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreCalculator {
    pub fn new() -> Self {
        Self { weights: AssignmentWeights::default() }
    }

    pub fn with_weights(weights: AssignmentWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> AssignmentWeights {
        self.weights
    }

    /// Normalised weighted sum; zero when every weight is zero.
    pub fn calculate_total_score(&self, scores: &ComponentScores) -> f64 {
        let sum = self.weights.sum();
        if sum <= 0.0 {
            return 0.0;
        }
        let weighted = scores.specialty * self.weights.specialty
            + scores.load * self.weights.load
            + scores.urgency * self.weights.urgency;
        (weighted / sum).clamp(0.0, 1.0)
    }

    pub fn specialty_score(&self, category: &str, specialties: &[String]) -> f64 {
        let category = category.trim().to_ascii_lowercase();
        if specialties.iter().any(|s| s.eq_ignore_ascii_case(&category)) {
            1.0
        } else if specialties.iter().any(|s| s.eq_ignore_ascii_case(GENERAL_SPECIALTY)) {
            0.5
        } else {
            0.0
        }
    }

    pub fn load_score(&self, active_tickets: u32, max_active_tickets: u32) -> f64 {
        if max_active_tickets == 0 {
            return 0.0;
        }
        (1.0 - f64::from(active_tickets) / f64::from(max_active_tickets)).clamp(0.0, 1.0)
    }

    /// Urgent tickets favour technicians with the most spare capacity.
    pub fn urgency_score(&self, urgency: f64, load_score: f64) -> f64 {
        (urgency.clamp(0.0, 1.0) * load_score).clamp(0.0, 1.0)
    }
}
