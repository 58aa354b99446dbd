use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use helpdesk_core::assignment::TechnicianCandidate;
use helpdesk_core::audit::AuditEvent;
use helpdesk_core::domain::menu::{
    MenuCategory, MenuItem, MenuItemDetail, MenuItemId, MenuSection, VariantGroup, VariantGroupId,
    VariantOption,
};
use helpdesk_core::domain::notification::{Notification, NotificationId};
use helpdesk_core::domain::order::{Order, OrderId, Payment};
use helpdesk_core::domain::ticket::{Ticket, TicketComment, TicketId, TicketStatus};
use helpdesk_core::domain::user::{Role, TechnicianProfile, User, UserId};

mod codec;
#[cfg(test)]
pub(crate) mod test_support;

pub mod audit;
pub mod menu;
pub mod notification;
pub mod order;
pub mod technician;
pub mod ticket;
pub mod user;

pub use audit::SqlAuditRepository;
pub use menu::SqlMenuRepository;
pub use notification::SqlNotificationRepository;
pub use order::SqlOrderRepository;
pub use technician::SqlTechnicianRepository;
pub use ticket::SqlTicketRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
}

impl RepositoryError {
    /// Maps a unique-constraint violation to `Conflict`, leaving other errors untouched.
    pub(crate) fn on_unique(error: sqlx::Error, message: impl Into<String>) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Conflict(message.into()),
            _ => Self::Database(error),
        }
    }
}

/// A user together with the stored password hash; never serialised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User, password_hash: &str) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, RepositoryError>;
    async fn list_by_role(&self, role: Role) -> Result<Vec<User>, RepositoryError>;
    async fn set_active(&self, id: &UserId, active: bool) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait TechnicianRepository: Send + Sync {
    async fn save_profile(
        &self,
        profile: &TechnicianProfile,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    async fn find_profile(&self, id: &UserId)
        -> Result<Option<TechnicianProfile>, RepositoryError>;
    /// Active technician accounts with their current open workload.
    async fn list_candidates(&self) -> Result<Vec<TechnicianCandidate>, RepositoryError>;
    async fn find_candidate(
        &self,
        id: &UserId,
    ) -> Result<Option<TechnicianCandidate>, RepositoryError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub requester_id: Option<UserId>,
    pub technician_id: Option<UserId>,
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn insert(&self, ticket: &Ticket) -> Result<(), RepositoryError>;
    async fn update(&self, ticket: &Ticket) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError>;
    async fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, RepositoryError>;
    async fn list_unresolved(&self) -> Result<Vec<Ticket>, RepositoryError>;
    async fn add_comment(&self, comment: &TicketComment) -> Result<(), RepositoryError>;
    async fn list_comments(&self, id: &TicketId) -> Result<Vec<TicketComment>, RepositoryError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlaAlertKind {
    AtRisk,
    Breached,
}

impl SlaAlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AtRisk => "at_risk",
            Self::Breached => "breached",
        }
    }
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_many(&self, notifications: &[Notification]) -> Result<(), RepositoryError>;
    async fn list_for_recipient(
        &self,
        recipient: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError>;
    async fn mark_read(
        &self,
        id: &NotificationId,
        recipient: &UserId,
    ) -> Result<bool, RepositoryError>;
    /// Records the alert marker and its notifications atomically. Returns `false`, writing
    /// nothing, when an alert of this kind was already raised for the ticket.
    async fn raise_sla_alert(
        &self,
        ticket_id: &TicketId,
        kind: SlaAlertKind,
        raised_at: DateTime<Utc>,
        notifications: &[Notification],
    ) -> Result<bool, RepositoryError>;
    async fn clear_sla_alerts(&self, ticket_id: &TicketId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MenuRepository: Send + Sync {
    async fn insert_category(&self, category: &MenuCategory) -> Result<(), RepositoryError>;
    async fn list_categories(&self) -> Result<Vec<MenuCategory>, RepositoryError>;
    async fn insert_item(&self, item: &MenuItem) -> Result<(), RepositoryError>;
    async fn find_item(&self, id: &MenuItemId) -> Result<Option<MenuItem>, RepositoryError>;
    async fn set_item_availability(
        &self,
        id: &MenuItemId,
        available: bool,
    ) -> Result<bool, RepositoryError>;
    async fn insert_group(&self, group: &VariantGroup) -> Result<(), RepositoryError>;
    async fn find_group(&self, id: &VariantGroupId)
        -> Result<Option<VariantGroup>, RepositoryError>;
    async fn insert_option(&self, option: &VariantOption) -> Result<(), RepositoryError>;
    async fn load_details(
        &self,
        ids: &[MenuItemId],
    ) -> Result<HashMap<MenuItemId, MenuItemDetail>, RepositoryError>;
    async fn list_sections(
        &self,
        include_unavailable: bool,
    ) -> Result<Vec<MenuSection>, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;
    async fn list(&self, customer: Option<&UserId>) -> Result<Vec<Order>, RepositoryError>;
    /// Persists status changes; a refunded order also flips its payment record.
    async fn save_status(&self, order: &Order) -> Result<(), RepositoryError>;
    async fn record_payment(&self, order: &Order, payment: &Payment)
        -> Result<(), RepositoryError>;
    async fn find_payment(&self, order_id: &OrderId) -> Result<Option<Payment>, RepositoryError>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, events: &[AuditEvent]) -> Result<(), RepositoryError>;
    async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<AuditEvent>, RepositoryError>;
}
