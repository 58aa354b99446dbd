pub mod assignment;
pub mod audit;
pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod orders;
pub mod sla;

pub use assignment::{
    AssignmentDecision, AssignmentEngine, AssignmentError, AssignmentWeights, TechnicianCandidate,
};
pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
};
pub use auth::{AuthError, Claims, IssuedToken, TokenSigner};
pub use domain::menu::{MenuItem, MenuItemDetail, MenuItemId, VariantGroup, VariantOption};
pub use domain::notification::{Notification, NotificationKind};
pub use domain::order::{Order, OrderId, OrderStatus, Payment, PaymentStatus};
pub use domain::ticket::{Ticket, TicketId, TicketPriority, TicketStatus};
pub use domain::user::{Role, TechnicianProfile, User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use orders::{price_order, OrderLineRequest, OrderValidationError, PricedOrder};
pub use sla::{SlaClock, SlaComplianceReport, SlaPolicy, SlaSnapshot, SlaState};
