use std::fmt;

use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{TransitionDirection, TransitionOutcome};

/// A lifecycle state with a stable storage name.
pub trait FlowState: Copy + PartialEq + fmt::Debug {
    fn name(&self) -> &'static str;
}

pub trait FlowDefinition {
    type State: FlowState;
    type Action: Clone + fmt::Debug;
    type Context;

    fn flow_name(&self) -> &'static str;
    fn initial_state(&self) -> Self::State;
    fn transition(
        &self,
        current: Self::State,
        target: Self::State,
        context: &Self::Context,
    ) -> Result<TransitionOutcome<Self::State, Self::Action>, FlowTransitionError>;
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_name(&self) -> &'static str {
        self.flow.flow_name()
    }

    pub fn initial_state(&self) -> F::State {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: F::State,
        target: F::State,
        context: &F::Context,
    ) -> Result<TransitionOutcome<F::State, F::Action>, FlowTransitionError> {
        self.flow.transition(current, target, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: F::State,
        target: F::State,
        context: &F::Context,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome<F::State, F::Action>, FlowTransitionError>
    where
        S: AuditSink,
    {
        let result = self.apply(current, target, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("flow", self.flow_name())
                    .with_metadata("from", outcome.from.name())
                    .with_metadata("to", outcome.to.name())
                    .with_metadata("direction", direction_name(outcome.direction)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("flow", self.flow_name())
                    .with_metadata("from", current.name())
                    .with_metadata("to", target.name())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn direction_name(direction: TransitionDirection) -> &'static str {
    match direction {
        TransitionDirection::Forward => "forward",
        TransitionDirection::Backward => "backward",
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("{flow}: no transition from `{from}` to `{to}`")]
    InvalidTransition { flow: &'static str, from: &'static str, to: &'static str },
    #[error("{flow}: role `{role}` may not move from `{from}` to `{to}`")]
    NotPermitted { flow: &'static str, role: &'static str, from: &'static str, to: &'static str },
    #[error("{flow}: transition from `{from}` to `{to}` blocked: {reason}")]
    GuardFailed { flow: &'static str, from: &'static str, to: &'static str, reason: String },
}

/// Row of a lookup-table lifecycle: who may move a record between two states.
#[derive(Clone, Copy, Debug)]
pub struct TransitionRule<S, P: 'static> {
    pub from: S,
    pub to: S,
    pub direction: TransitionDirection,
    pub permits: &'static [P],
}

pub fn find_rule<S, P>(
    table: &'static [TransitionRule<S, P>],
    from: S,
    to: S,
) -> Option<&'static TransitionRule<S, P>>
where
    S: PartialEq + 'static,
    P: 'static,
{
    table.iter().find(|rule| rule.from == from && rule.to == to)
}
