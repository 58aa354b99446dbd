use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TicketCreated,
    TicketAssigned,
    TicketStatusChanged,
    TicketCommented,
    SlaAtRisk,
    SlaBreached,
    OrderStatusChanged,
    PaymentCaptured,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TicketCreated => "ticket_created",
            Self::TicketAssigned => "ticket_assigned",
            Self::TicketStatusChanged => "ticket_status_changed",
            Self::TicketCommented => "ticket_commented",
            Self::SlaAtRisk => "sla_at_risk",
            Self::SlaBreached => "sla_breached",
            Self::OrderStatusChanged => "order_status_changed",
            Self::PaymentCaptured => "payment_captured",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ticket_created" => Some(Self::TicketCreated),
            "ticket_assigned" => Some(Self::TicketAssigned),
            "ticket_status_changed" => Some(Self::TicketStatusChanged),
            "ticket_commented" => Some(Self::TicketCommented),
            "sla_at_risk" => Some(Self::SlaAtRisk),
            "sla_breached" => Some(Self::SlaBreached),
            "order_status_changed" => Some(Self::OrderStatusChanged),
            "payment_captured" => Some(Self::PaymentCaptured),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub subject_id: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient_id: UserId,
        kind: NotificationKind,
        subject_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: NotificationId(format!("NTF-{}", Uuid::new_v4())),
            recipient_id,
            kind,
            subject_id: subject_id.into(),
            message: message.into(),
            read: false,
            created_at: Utc::now(),
        }
    }
}
