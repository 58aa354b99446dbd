pub mod engine;
pub mod order;
pub mod states;
pub mod ticket;

pub use engine::{FlowDefinition, FlowEngine, FlowState, FlowTransitionError};
pub use order::{apply_order_outcome, OrderContext, OrderLifecycle};
pub use states::{Actor, OrderAction, TicketAction, TransitionDirection, TransitionOutcome};
pub use ticket::{apply_ticket_outcome, TicketContext, TicketLifecycle};
