use serde::{Deserialize, Serialize};

use crate::domain::user::{Role, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionDirection {
    Forward,
    Backward,
}

/// The authenticated principal requesting a transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketAction {
    RecordFirstResponse,
    EvaluateResolutionSla,
    StampClosure,
    ClearAssignment,
    ReopenResolution,
    NotifyRequester,
    NotifyTechnician,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    NotifyCustomer,
    RefundPayment,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome<S, A> {
    pub from: S,
    pub to: S,
    pub direction: TransitionDirection,
    pub actions: Vec<A>,
}
