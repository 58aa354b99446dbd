use chrono::{DateTime, Utc};

use crate::domain::order::{Order, OrderStatus, PaymentStatus};
use crate::domain::user::{Role, UserId};
use crate::flows::engine::{
    find_rule, FlowDefinition, FlowState, FlowTransitionError, TransitionRule,
};
use crate::flows::states::{Actor, OrderAction, TransitionDirection, TransitionOutcome};

const FLOW_NAME: &str = "order";

impl FlowState for OrderStatus {
    fn name(&self) -> &'static str {
        self.as_str()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderPermit {
    Admin,
    Owner,
}

use OrderPermit::{Admin, Owner};
use OrderStatus::{Cancelled, Confirmed, Delivered, Pending, Preparing, Ready};
use TransitionDirection::Forward;

pub const ORDER_TRANSITIONS: &[TransitionRule<OrderStatus, OrderPermit>] = &[
    TransitionRule { from: Pending, to: Confirmed, direction: Forward, permits: &[Admin] },
    TransitionRule { from: Confirmed, to: Preparing, direction: Forward, permits: &[Admin] },
    TransitionRule { from: Preparing, to: Ready, direction: Forward, permits: &[Admin] },
    TransitionRule { from: Ready, to: Delivered, direction: Forward, permits: &[Admin] },
    TransitionRule { from: Pending, to: Cancelled, direction: Forward, permits: &[Owner, Admin] },
    TransitionRule { from: Confirmed, to: Cancelled, direction: Forward, permits: &[Owner, Admin] },
    TransitionRule { from: Preparing, to: Cancelled, direction: Forward, permits: &[Admin] },
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderContext {
    pub actor: Actor,
    pub customer_id: UserId,
    pub payment_status: PaymentStatus,
}

impl OrderContext {
    fn holds(&self, permit: OrderPermit) -> bool {
        match permit {
            Admin => self.actor.role == Role::Admin,
            Owner => self.actor.user_id == self.customer_id,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct OrderLifecycle;

impl FlowDefinition for OrderLifecycle {
    type State = OrderStatus;
    type Action = OrderAction;
    type Context = OrderContext;

    fn flow_name(&self) -> &'static str {
        FLOW_NAME
    }

    fn initial_state(&self) -> OrderStatus {
        Pending
    }

    fn transition(
        &self,
        current: OrderStatus,
        target: OrderStatus,
        context: &OrderContext,
    ) -> Result<TransitionOutcome<OrderStatus, OrderAction>, FlowTransitionError> {
        let rule = find_rule(ORDER_TRANSITIONS, current, target).ok_or(
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

        if target == Delivered && context.payment_status != PaymentStatus::Captured {
            return Err(FlowTransitionError::GuardFailed {
                flow: FLOW_NAME,
                from: current.as_str(),
                to: target.as_str(),
                reason: "payment must be captured before delivery".to_string(),
            });
        }

        let mut actions = vec![OrderAction::NotifyCustomer];
        if target == Cancelled && context.payment_status == PaymentStatus::Captured {
            actions.push(OrderAction::RefundPayment);
        }

        Ok(TransitionOutcome { from: current, to: target, direction: rule.direction, actions })
    }
}

/// Applies an accepted outcome to the order record, refunding a captured payment on cancel.
pub fn apply_order_outcome(
    order: &mut Order,
    outcome: &TransitionOutcome<OrderStatus, OrderAction>,
    now: DateTime<Utc>,
) {
    if outcome.actions.contains(&OrderAction::RefundPayment) {
        order.payment_status = PaymentStatus::Refunded;
    }
    order.status = outcome.to;
    order.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::{OrderContext, OrderLifecycle};
    use crate::domain::order::{OrderStatus, PaymentStatus};
    use crate::domain::user::{Role, UserId};
    use crate::flows::engine::{FlowEngine, FlowTransitionError};
    use crate::flows::states::{Actor, OrderAction};

    fn context(role: Role, user: &str, payment_status: PaymentStatus) -> OrderContext {
        OrderContext {
            actor: Actor::new(UserId(user.to_string()), role),
            customer_id: UserId("U-diner".to_string()),
            payment_status,
        }
    }

    #[test]
    fn kitchen_path_reaches_delivery_once_paid() {
        let engine = FlowEngine::new(OrderLifecycle);
        let admin = context(Role::Admin, "U-admin", PaymentStatus::Captured);
        let mut state = engine.initial_state();
        let path = [
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Delivered,
        ];
        for target in path {
            state = engine.apply(state, target, &admin).expect("forward step").to;
        }
        assert_eq!(state, OrderStatus::Delivered);
    }

    #[test]
    fn delivery_requires_captured_payment() {
        let engine = FlowEngine::new(OrderLifecycle);
        let error = engine
            .apply(
                OrderStatus::Ready,
                OrderStatus::Delivered,
                &context(Role::Admin, "U-admin", PaymentStatus::Unpaid),
            )
            .expect_err("unpaid order cannot be delivered");
        assert!(matches!(error, FlowTransitionError::GuardFailed { .. }));
    }

    #[test]
    fn owner_may_cancel_before_preparation_only() {
        let engine = FlowEngine::new(OrderLifecycle);
        let owner = context(Role::Customer, "U-diner", PaymentStatus::Unpaid);

        let cancelled = engine
            .apply(OrderStatus::Confirmed, OrderStatus::Cancelled, &owner)
            .expect("owner cancels confirmed order");
        assert_eq!(cancelled.actions, vec![OrderAction::NotifyCustomer]);

        let error = engine
            .apply(OrderStatus::Preparing, OrderStatus::Cancelled, &owner)
            .expect_err("kitchen already started");
        assert!(matches!(error, FlowTransitionError::NotPermitted { .. }));
    }

    #[test]
    fn cancelling_a_paid_order_refunds() {
        let engine = FlowEngine::new(OrderLifecycle);
        let outcome = engine
            .apply(
                OrderStatus::Preparing,
                OrderStatus::Cancelled,
                &context(Role::Admin, "U-admin", PaymentStatus::Captured),
            )
            .expect("admin cancels");
        assert!(outcome.actions.contains(&OrderAction::RefundPayment));
    }

    #[test]
    fn other_customers_cannot_touch_the_order() {
        let engine = FlowEngine::new(OrderLifecycle);
        let error = engine
            .apply(
                OrderStatus::Pending,
                OrderStatus::Cancelled,
                &context(Role::Customer, "U-stranger", PaymentStatus::Unpaid),
            )
            .expect_err("not the owner");
        assert!(matches!(error, FlowTransitionError::NotPermitted { .. }));
    }

    #[test]
    fn terminal_states_do_not_move() {
        let engine = FlowEngine::new(OrderLifecycle);
        let admin = context(Role::Admin, "U-admin", PaymentStatus::Captured);
        assert!(engine.apply(OrderStatus::Delivered, OrderStatus::Cancelled, &admin).is_err());
        assert!(engine.apply(OrderStatus::Cancelled, OrderStatus::Pending, &admin).is_err());
    }
}
