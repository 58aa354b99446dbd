//! Ticket endpoints: creation with optional auto-assignment, lifecycle
//! transitions, assignment, priority changes, comments and SLA views.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use helpdesk_core::assignment::{
    AssignmentDecision, AssignmentWeights, CandidateEvaluation, GENERAL_SPECIALTY,
};
use helpdesk_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
};
use helpdesk_core::domain::notification::{Notification, NotificationKind};
use helpdesk_core::domain::ticket::{
    normalize_category, Ticket, TicketComment, TicketCommentId, TicketId, TicketPriority,
    TicketStatus,
};
use helpdesk_core::domain::user::{Role, UserId};
use helpdesk_core::errors::ApplicationError;
use helpdesk_core::flows::{
    apply_ticket_outcome, Actor, FlowEngine, TicketAction, TicketContext, TicketLifecycle,
    TransitionOutcome,
};
use helpdesk_core::sla::{SlaComplianceReport, SlaSnapshot};
use helpdesk_db::repositories::{
    NotificationRepository, TechnicianRepository, TicketFilter, TicketRepository,
};

use crate::app::AppState;
use crate::audit;
use crate::auth::{ensure_role, AuthUser};
use crate::error::{bad_request, storage, ApiError, ApiResult};
use crate::notifications::{admin_recipients, deliver};

const MAX_TITLE_LEN: usize = 200;
const MAX_COMMENT_LEN: usize = 5_000;
const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<TicketPriority>,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub ticket: Ticket,
    pub sla: SlaSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<AssignmentDecision>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TicketList {
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub to: TicketStatus,
    #[serde(default)]
    pub resolution_note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub technician_id: String,
}

#[derive(Debug, Serialize)]
pub struct AssignmentPreview {
    pub ticket_id: TicketId,
    pub urgency: f64,
    pub weights: AssignmentWeights,
    pub evaluations: Vec<CandidateEvaluation>,
}

#[derive(Debug, Deserialize)]
pub struct PriorityRequest {
    pub priority: TicketPriority,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct CommentList {
    pub comments: Vec<TicketComment>,
}

impl AppState {
    fn ticket_response(
        &self,
        ticket: Ticket,
        assignment: Option<AssignmentDecision>,
    ) -> TicketResponse {
        let sla = self.settings.sla_clock.evaluate(&ticket, Utc::now());
        TicketResponse { ticket, sla, assignment }
    }
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateTicketRequest>,
) -> ApiResult<TicketResponse> {
    let title = body.title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(user.fail(bad_request(format!(
            "title is required and must be at most {MAX_TITLE_LEN} characters"
        ))));
    }
    let category = body
        .category
        .as_deref()
        .map(normalize_category)
        .filter(|category| !category.is_empty())
        .unwrap_or_else(|| GENERAL_SPECIALTY.to_string());
    let priority = body.priority.unwrap_or(TicketPriority::Medium);

    let now = Utc::now();
    let deadlines = state.settings.sla_policy.deadlines(priority, now);
    let mut ticket = Ticket {
        id: TicketId(format!("TKT-{}", Uuid::new_v4())),
        title: title.to_string(),
        description: body.description.trim().to_string(),
        category,
        priority,
        status: TicketStatus::Open,
        requester_id: user.id().clone(),
        technician_id: None,
        response_due_at: deadlines.response_due_at,
        resolution_due_at: deadlines.resolution_due_at,
        first_response_at: None,
        resolved_at: None,
        closed_at: None,
        response_sla_met: None,
        resolution_sla_met: None,
        resolution_note: None,
        reopen_count: 0,
        created_at: now,
        updated_at: now,
    };
    state.tickets().insert(&ticket).await.map_err(|error| user.fail(storage(error)))?;

    let sink = state.audit_sink();
    let audit_context = audit_context(&ticket, &user);
    sink.emit(
        AuditEvent::from_context(
            &audit_context,
            "ticket.created",
            AuditCategory::Flow,
            AuditOutcome::Success,
        )
        .with_metadata("priority", priority.as_str())
        .with_metadata("category", ticket.category.clone()),
    );

    let mut notifications: Vec<Notification> = admin_recipients(&state)
        .await
        .into_iter()
        .filter(|admin| admin != user.id())
        .map(|admin| {
            Notification::new(
                admin,
                NotificationKind::TicketCreated,
                ticket.id.0.clone(),
                format!("New {} ticket: {}", priority.as_str(), ticket.title),
            )
        })
        .collect();

    let mut assignment = None;
    if state.settings.auto_assign {
        let system = Actor::new(UserId(SYSTEM_ACTOR.to_string()), Role::Admin);
        match auto_assign_ticket(&state, &mut ticket, system, &user.correlation_id, &sink).await {
            Ok((decision, assigned)) => {
                notifications.extend(assigned);
                assignment = Some(decision);
            }
            Err(error) => warn!(
                event_name = "ticket.auto_assign.skipped",
                correlation_id = %user.correlation_id,
                ticket_id = %ticket.id.0,
                error = %error,
                "ticket left open without an assignee"
            ),
        }
    }

    deliver(&state, notifications, &user.correlation_id).await;
    audit::flush(&state, &sink).await;

    info!(
        event_name = "ticket.created",
        correlation_id = %user.correlation_id,
        ticket_id = %ticket.id.0,
        priority = priority.as_str(),
        assigned = assignment.is_some(),
        "ticket created"
    );
    Ok(Json(state.ticket_response(ticket, assignment)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TicketListQuery>,
) -> ApiResult<TicketList> {
    let status = match query.status.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            TicketStatus::parse(raw)
                .ok_or_else(|| user.fail(bad_request(format!("unknown ticket status `{raw}`"))))?,
        ),
        None => None,
    };

    let mut filter = TicketFilter { status, ..TicketFilter::default() };
    match user.role() {
        Role::Admin => {}
        Role::Technician => filter.technician_id = Some(user.id().clone()),
        Role::Customer => filter.requester_id = Some(user.id().clone()),
    }

    let tickets = state.tickets().list(&filter).await.map_err(|error| user.fail(storage(error)))?;
    Ok(Json(TicketList { tickets }))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<TicketResponse> {
    let ticket = load_visible_ticket(&state, &user, &id).await?;
    Ok(Json(state.ticket_response(ticket, None)))
}

pub async fn transition(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<TransitionRequest>,
) -> ApiResult<TicketResponse> {
    let mut ticket = load_ticket(&state, &user, &id).await?;
    let previous_technician = ticket.technician_id.clone();
    let actor = Actor::new(user.id().clone(), user.role());
    let context =
        TicketContext::for_ticket(&ticket, actor).with_resolution_note(body.resolution_note);

    let sink = state.audit_sink();
    let engine = FlowEngine::new(TicketLifecycle);
    let outcome = engine.apply_with_audit(
        ticket.status,
        body.to,
        &context,
        &sink,
        &audit_context(&ticket, &user),
    );
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(error) => {
            audit::flush(&state, &sink).await;
            return Err(user.fail(error));
        }
    };

    let now = Utc::now();
    apply_ticket_outcome(&mut ticket, &outcome, context.resolution_note.as_deref(), now);
    state.tickets().update(&ticket).await.map_err(|error| user.fail(storage(error)))?;

    let notifications =
        transition_notifications(&ticket, &outcome, user.id(), previous_technician.as_ref());
    deliver(&state, notifications, &user.correlation_id).await;
    audit::flush(&state, &sink).await;

    info!(
        event_name = "ticket.transitioned",
        correlation_id = %user.correlation_id,
        ticket_id = %ticket.id.0,
        from = outcome.from.as_str(),
        to = outcome.to.as_str(),
        "ticket transition applied"
    );
    Ok(Json(state.ticket_response(ticket, None)))
}

pub async fn assign(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<AssignRequest>,
) -> ApiResult<TicketResponse> {
    ensure_role(&user, &[Role::Admin])?;
    let mut ticket = load_ticket(&state, &user, &id).await?;
    let technician_id = UserId(body.technician_id.trim().to_string());
    let candidate = state
        .technicians()
        .find_candidate(&technician_id)
        .await
        .map_err(|error| user.fail(storage(error)))?
        .ok_or_else(|| {
            user.fail(ApplicationError::NotFound(format!("technician `{}`", technician_id.0)))
        })?;

    let decision = state
        .settings
        .assignment
        .assign_manual(&ticket, &candidate, Utc::now())
        .map_err(|error| user.fail(error))?;

    let sink = state.audit_sink();
    let actor = Actor::new(user.id().clone(), user.role());
    let notifications =
        apply_assignment(&state, &mut ticket, &decision, actor, &user.correlation_id, &sink)
            .await
            .map_err(|error| user.fail(error))?;
    deliver(&state, notifications, &user.correlation_id).await;
    audit::flush(&state, &sink).await;

    Ok(Json(state.ticket_response(ticket, Some(decision))))
}

pub async fn auto_assign(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<TicketResponse> {
    ensure_role(&user, &[Role::Admin])?;
    let mut ticket = load_ticket(&state, &user, &id).await?;

    let sink = state.audit_sink();
    let actor = Actor::new(user.id().clone(), user.role());
    let result = auto_assign_ticket(&state, &mut ticket, actor, &user.correlation_id, &sink).await;
    audit::flush(&state, &sink).await;
    let (decision, notifications) = result.map_err(|error| user.fail(error))?;
    deliver(&state, notifications, &user.correlation_id).await;

    Ok(Json(state.ticket_response(ticket, Some(decision))))
}

pub async fn assignment_preview(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<AssignmentPreview> {
    ensure_role(&user, &[Role::Admin])?;
    let ticket = load_ticket(&state, &user, &id).await?;
    let candidates =
        state.technicians().list_candidates().await.map_err(|error| user.fail(storage(error)))?;

    let now = Utc::now();
    let engine = &state.settings.assignment;
    Ok(Json(AssignmentPreview {
        ticket_id: ticket.id.clone(),
        urgency: helpdesk_core::sla::urgency(&ticket, now),
        weights: engine.weights(),
        evaluations: engine.rank(&ticket, &candidates, now),
    }))
}

pub async fn set_priority(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<PriorityRequest>,
) -> ApiResult<TicketResponse> {
    ensure_role(&user, &[Role::Admin])?;
    let mut ticket = load_ticket(&state, &user, &id).await?;
    let previous = ticket.priority;
    if previous == body.priority {
        return Ok(Json(state.ticket_response(ticket, None)));
    }

    state.settings.sla_policy.reprioritize(&mut ticket, body.priority, Utc::now());
    state.tickets().update(&ticket).await.map_err(|error| user.fail(storage(error)))?;
    state
        .notifications()
        .clear_sla_alerts(&ticket.id)
        .await
        .map_err(|error| user.fail(storage(error)))?;

    let sink = state.audit_sink();
    sink.emit(
        AuditEvent::from_context(
            &audit_context(&ticket, &user),
            "ticket.reprioritized",
            AuditCategory::Sla,
            AuditOutcome::Success,
        )
        .with_metadata("from", previous.as_str())
        .with_metadata("to", body.priority.as_str()),
    );
    audit::flush(&state, &sink).await;

    info!(
        event_name = "ticket.reprioritized",
        correlation_id = %user.correlation_id,
        ticket_id = %ticket.id.0,
        from = previous.as_str(),
        to = body.priority.as_str(),
        "ticket priority changed and SLA deadlines recomputed"
    );
    Ok(Json(state.ticket_response(ticket, None)))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<CommentRequest>,
) -> ApiResult<TicketComment> {
    let mut ticket = load_visible_ticket(&state, &user, &id).await?;
    let text = body.body.trim();
    if text.is_empty() || text.chars().count() > MAX_COMMENT_LEN {
        return Err(user.fail(bad_request(format!(
            "comment must be between 1 and {MAX_COMMENT_LEN} characters"
        ))));
    }

    let now = Utc::now();
    let comment = TicketComment {
        id: TicketCommentId(format!("CMT-{}", Uuid::new_v4())),
        ticket_id: ticket.id.clone(),
        author_id: user.id().clone(),
        body: text.to_string(),
        created_at: now,
    };
    state.tickets().add_comment(&comment).await.map_err(|error| user.fail(storage(error)))?;

    let responder = user.is_admin() || ticket.is_assigned_to(user.id());
    if responder && ticket.record_first_response(now) {
        state.tickets().update(&ticket).await.map_err(|error| user.fail(storage(error)))?;
    }

    let mut recipients = vec![ticket.requester_id.clone()];
    recipients.extend(ticket.technician_id.clone());
    let notifications = recipients
        .into_iter()
        .filter(|recipient| recipient != user.id())
        .map(|recipient| {
            Notification::new(
                recipient,
                NotificationKind::TicketCommented,
                ticket.id.0.clone(),
                format!("New comment on {}", ticket.title),
            )
        })
        .collect();
    deliver(&state, notifications, &user.correlation_id).await;

    Ok(Json(comment))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<CommentList> {
    let ticket = load_visible_ticket(&state, &user, &id).await?;
    let comments =
        state.tickets().list_comments(&ticket.id).await.map_err(|error| user.fail(storage(error)))?;
    Ok(Json(CommentList { comments }))
}

pub async fn sla_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<SlaSnapshot> {
    let ticket = load_visible_ticket(&state, &user, &id).await?;
    Ok(Json(state.settings.sla_clock.evaluate(&ticket, Utc::now())))
}

pub async fn sla_report(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<SlaComplianceReport> {
    ensure_role(&user, &[Role::Admin])?;
    let tickets = state
        .tickets()
        .list(&TicketFilter::default())
        .await
        .map_err(|error| user.fail(storage(error)))?;
    Ok(Json(SlaComplianceReport::build(&tickets, &state.settings.sla_clock, Utc::now())))
}

async fn load_ticket(state: &AppState, user: &AuthUser, id: &str) -> Result<Ticket, ApiError> {
    let id = TicketId(id.to_string());
    state
        .tickets()
        .find_by_id(&id)
        .await
        .map_err(|error| user.fail(storage(error)))?
        .ok_or_else(|| user.fail(ApplicationError::NotFound(format!("ticket `{}`", id.0))))
}

/// Requester, assignee and admins may read a ticket.
async fn load_visible_ticket(
    state: &AppState,
    user: &AuthUser,
    id: &str,
) -> Result<Ticket, ApiError> {
    let ticket = load_ticket(state, user, id).await?;
    if user.is_admin() || &ticket.requester_id == user.id() || ticket.is_assigned_to(user.id()) {
        return Ok(ticket);
    }
    Err(user.fail(ApplicationError::Forbidden(format!(
        "ticket `{}` belongs to another user",
        ticket.id.0
    ))))
}

fn audit_context(ticket: &Ticket, user: &AuthUser) -> AuditContext {
    AuditContext::new(Some(ticket.id.0.clone()), user.correlation_id.clone(), user.id().0.clone())
}

/// Ranks current candidates and assigns the best one, recording a rejected
/// audit event when nobody is eligible.
async fn auto_assign_ticket(
    state: &AppState,
    ticket: &mut Ticket,
    actor: Actor,
    correlation_id: &str,
    sink: &InMemoryAuditSink,
) -> Result<(AssignmentDecision, Vec<Notification>), ApplicationError> {
    let candidates = state.technicians().list_candidates().await.map_err(storage)?;
    let decision = match state.settings.assignment.assign(ticket, &candidates, Utc::now()) {
        Ok(decision) => decision,
        Err(error) => {
            sink.emit(
                AuditEvent::new(
                    Some(ticket.id.0.clone()),
                    correlation_id,
                    "ticket.assignment_failed",
                    AuditCategory::Assignment,
                    actor.user_id.0.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("reason", error.to_string()),
            );
            return Err(error.into());
        }
    };
    let notifications =
        apply_assignment(state, ticket, &decision, actor, correlation_id, sink).await?;
    Ok((decision, notifications))
}

/// Moves the ticket Open -> Assigned for the decided technician and persists it.
async fn apply_assignment(
    state: &AppState,
    ticket: &mut Ticket,
    decision: &AssignmentDecision,
    actor: Actor,
    correlation_id: &str,
    sink: &InMemoryAuditSink,
) -> Result<Vec<Notification>, ApplicationError> {
    let audit_context =
        AuditContext::new(Some(ticket.id.0.clone()), correlation_id, actor.user_id.0.clone());
    let mut context = TicketContext::for_ticket(ticket, actor.clone());
    context.technician_id = Some(decision.technician_id.clone());

    let outcome = FlowEngine::new(TicketLifecycle).apply_with_audit(
        ticket.status,
        TicketStatus::Assigned,
        &context,
        sink,
        &audit_context,
    )?;

    let mut assigned = ticket.clone();
    assigned.technician_id = Some(decision.technician_id.clone());
    apply_ticket_outcome(&mut assigned, &outcome, None, Utc::now());
    state.tickets().update(&assigned).await.map_err(storage)?;
    *ticket = assigned;

    sink.emit(
        AuditEvent::from_context(
            &audit_context,
            "ticket.assigned",
            AuditCategory::Assignment,
            AuditOutcome::Success,
        )
        .with_metadata("technician_id", decision.technician_id.0.clone())
        .with_metadata("score", format!("{:.4}", decision.score))
        .with_metadata("urgency", format!("{:.4}", decision.urgency))
        .with_metadata("candidates", decision.evaluations.len().to_string()),
    );
    info!(
        event_name = "ticket.assigned",
        correlation_id = %correlation_id,
        ticket_id = %ticket.id.0,
        technician_id = %decision.technician_id.0,
        score = decision.score,
        "ticket assigned"
    );

    Ok(transition_notifications(ticket, &outcome, &actor.user_id, None))
}

/// Notification records for an applied transition; the acting user is never notified.
fn transition_notifications(
    ticket: &Ticket,
    outcome: &TransitionOutcome<TicketStatus, TicketAction>,
    actor: &UserId,
    previous_technician: Option<&UserId>,
) -> Vec<Notification> {
    let newly_assigned = outcome.from == TicketStatus::Open && outcome.to == TicketStatus::Assigned;
    let kind = if newly_assigned {
        NotificationKind::TicketAssigned
    } else {
        NotificationKind::TicketStatusChanged
    };

    let mut notifications = Vec::new();
    for action in &outcome.actions {
        let recipient = match action {
            TicketAction::NotifyRequester => Some(ticket.requester_id.clone()),
            TicketAction::NotifyTechnician => {
                ticket.technician_id.clone().or_else(|| previous_technician.cloned())
            }
            _ => None,
        };
        let Some(recipient) = recipient.filter(|recipient| recipient != actor) else {
            continue;
        };
        if notifications.iter().any(|existing: &Notification| existing.recipient_id == recipient) {
            continue;
        }
        let message = match (action, newly_assigned) {
            (TicketAction::NotifyTechnician, true) => {
                format!("You have been assigned ticket: {}", ticket.title)
            }
            _ => format!("Ticket \"{}\" is now {}", ticket.title, ticket.status.as_str()),
        };
        notifications.push(Notification::new(recipient, kind, ticket.id.0.clone(), message));
    }
    notifications
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        Extension, Json,
    };
    use chrono::Duration;

    use helpdesk_core::domain::notification::NotificationKind;
    use helpdesk_core::domain::ticket::{TicketPriority, TicketStatus};
    use helpdesk_core::domain::user::Role;
    use helpdesk_db::repositories::{AuditRepository, NotificationRepository, TicketRepository};

    use super::*;
    use crate::app::test_support::{seed_technician, seed_user, test_state};
    use crate::app::AppState;

    fn with_auto_assign(mut state: AppState) -> AppState {
        let mut settings = (*state.settings).clone();
        settings.auto_assign = true;
        state.settings = Arc::new(settings);
        state
    }

    async fn open_ticket(state: &AppState, requester: &AuthUser, category: &str) -> Ticket {
        let Json(created) = create(
            State(state.clone()),
            Extension(requester.clone()),
            Json(CreateTicketRequest {
                title: "VPN keeps dropping".to_string(),
                description: "Disconnects every ten minutes".to_string(),
                category: Some(category.to_string()),
                priority: Some(TicketPriority::High),
            }),
        )
        .await
        .expect("create ticket");
        created.ticket
    }

    #[tokio::test]
    async fn create_computes_deadlines_and_auto_assigns_specialist() {
        let state = with_auto_assign(test_state().await);
        let customer = seed_user(&state, "USR-cust", Role::Customer).await;
        seed_user(&state, "USR-admin", Role::Admin).await;
        seed_technician(&state, "USR-generalist", &["general"], 5).await;
        let specialist = seed_technician(&state, "USR-netops", &["network"], 5).await;

        let Json(created) = create(
            State(state.clone()),
            Extension(customer.clone()),
            Json(CreateTicketRequest {
                title: "  VPN keeps dropping ".to_string(),
                description: String::new(),
                category: Some(" Network ".to_string()),
                priority: Some(TicketPriority::High),
            }),
        )
        .await
        .expect("create ticket");

        let ticket = &created.ticket;
        assert_eq!(ticket.title, "VPN keeps dropping");
        assert_eq!(ticket.category, "network");
        assert_eq!(ticket.status, TicketStatus::Assigned);
        assert_eq!(ticket.technician_id.as_ref(), Some(specialist.id()));
        assert_eq!(ticket.response_due_at - ticket.created_at, Duration::hours(4));
        assert_eq!(ticket.resolution_due_at - ticket.created_at, Duration::hours(24));
        let decision = created.assignment.as_ref().expect("assignment decision");
        assert_eq!(decision.evaluations.len(), 2);

        let technician_inbox =
            state.notifications().list_for_recipient(specialist.id(), false).await.expect("inbox");
        assert_eq!(technician_inbox.len(), 1);
        assert_eq!(technician_inbox[0].kind, NotificationKind::TicketAssigned);
        let customer_inbox =
            state.notifications().list_for_recipient(customer.id(), false).await.expect("inbox");
        assert_eq!(customer_inbox.len(), 1);

        let events = state.audit().list_for_subject(&ticket.id.0).await.expect("audit");
        let types: Vec<&str> = events.iter().map(|event| event.event_type.as_str()).collect();
        assert!(types.contains(&"ticket.created"));
        assert!(types.contains(&"flow.transition_applied"));
        assert!(types.contains(&"ticket.assigned"));

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn create_leaves_ticket_open_when_nobody_is_eligible() {
        let state = with_auto_assign(test_state().await);
        let customer = seed_user(&state, "USR-cust", Role::Customer).await;
        let busy = seed_technician(&state, "USR-busy", &["network"], 1).await;
        let other = open_ticket(&state, &customer, "network").await;
        assert_eq!(other.technician_id.as_ref(), Some(busy.id()));

        let ticket = open_ticket(&state, &customer, "network").await;
        assert_eq!(ticket.status, TicketStatus::Open);
        assert!(ticket.technician_id.is_none());

        let events = state.audit().list_for_subject(&ticket.id.0).await.expect("audit");
        assert!(events.iter().any(|event| event.event_type == "ticket.assignment_failed"));

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn create_returns_stored_ticket_when_assignment_write_fails() {
        let state = with_auto_assign(test_state().await);
        let customer = seed_user(&state, "USR-cust", Role::Customer).await;
        let technician = seed_technician(&state, "USR-netops", &["network"], 5).await;
        sqlx::query(
            "CREATE TRIGGER block_assignment BEFORE UPDATE OF status ON ticket
             WHEN NEW.status = 'assigned'
             BEGIN SELECT RAISE(ABORT, 'assignment writes disabled'); END",
        )
        .execute(&state.db_pool)
        .await
        .expect("install trigger");

        let ticket = open_ticket(&state, &customer, "network").await;
        assert_eq!(ticket.status, TicketStatus::Open);
        assert!(ticket.technician_id.is_none());

        let stored = state.tickets().find_by_id(&ticket.id).await.expect("load").expect("stored");
        assert_eq!(stored.status, ticket.status);
        assert_eq!(stored.technician_id, ticket.technician_id);

        let inbox =
            state.notifications().list_for_recipient(technician.id(), false).await.expect("inbox");
        assert!(inbox.is_empty());

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn create_rejects_blank_title() {
        let state = test_state().await;
        let customer = seed_user(&state, "USR-cust", Role::Customer).await;

        let error = create(
            State(state.clone()),
            Extension(customer),
            Json(CreateTicketRequest {
                title: "   ".to_string(),
                description: String::new(),
                category: None,
                priority: None,
            }),
        )
        .await
        .expect_err("blank title");
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn full_lifecycle_with_reopen() {
        let state = test_state().await;
        let admin = seed_user(&state, "USR-admin", Role::Admin).await;
        let customer = seed_user(&state, "USR-cust", Role::Customer).await;
        let technician = seed_technician(&state, "USR-tech", &["network"], 3).await;
        let ticket = open_ticket(&state, &customer, "network").await;
        assert_eq!(ticket.status, TicketStatus::Open);

        let Json(assigned) = assign(
            State(state.clone()),
            Extension(admin.clone()),
            Path(ticket.id.0.clone()),
            Json(AssignRequest { technician_id: technician.id().0.clone() }),
        )
        .await
        .expect("assign");
        assert_eq!(assigned.ticket.status, TicketStatus::Assigned);

        let move_to = |to: TicketStatus, actor: &AuthUser, note: Option<&str>| {
            transition(
                State(state.clone()),
                Extension(actor.clone()),
                Path(ticket.id.0.clone()),
                Json(TransitionRequest { to, resolution_note: note.map(str::to_string) }),
            )
        };

        let Json(started) =
            move_to(TicketStatus::InProgress, &technician, None).await.expect("start work");
        assert!(started.ticket.first_response_at.is_some());
        assert_eq!(started.ticket.response_sla_met, Some(true));

        let missing_note =
            move_to(TicketStatus::Resolved, &technician, None).await.expect_err("note required");
        assert_eq!(missing_note.status(), StatusCode::CONFLICT);

        let Json(resolved) = move_to(TicketStatus::Resolved, &technician, Some("Replaced router"))
            .await
            .expect("resolve");
        assert_eq!(resolved.ticket.resolution_sla_met, Some(true));
        assert_eq!(resolved.ticket.resolution_note.as_deref(), Some("Replaced router"));

        let Json(reopened) =
            move_to(TicketStatus::InProgress, &customer, None).await.expect("reopen");
        assert_eq!(reopened.ticket.reopen_count, 1);
        assert!(reopened.ticket.resolved_at.is_none());
        assert!(reopened.ticket.resolution_sla_met.is_none());

        move_to(TicketStatus::Resolved, &technician, Some("Firmware updated"))
            .await
            .expect("resolve again");
        let Json(closed) = move_to(TicketStatus::Closed, &customer, None).await.expect("close");
        assert!(closed.ticket.closed_at.is_some());

        let terminal =
            move_to(TicketStatus::InProgress, &admin, None).await.expect_err("closed is terminal");
        assert_eq!(terminal.status(), StatusCode::CONFLICT);

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn transitions_outside_permits_are_forbidden() {
        let state = test_state().await;
        let admin = seed_user(&state, "USR-admin", Role::Admin).await;
        let customer = seed_user(&state, "USR-cust", Role::Customer).await;
        let technician = seed_technician(&state, "USR-tech", &["network"], 3).await;
        let outsider = seed_technician(&state, "USR-other", &["network"], 3).await;
        let ticket = open_ticket(&state, &customer, "network").await;
        assign(
            State(state.clone()),
            Extension(admin),
            Path(ticket.id.0.clone()),
            Json(AssignRequest { technician_id: technician.id().0.clone() }),
        )
        .await
        .expect("assign");

        let error = transition(
            State(state.clone()),
            Extension(outsider),
            Path(ticket.id.0.clone()),
            Json(TransitionRequest { to: TicketStatus::InProgress, resolution_note: None }),
        )
        .await
        .expect_err("not the assignee");
        assert_eq!(error.status(), StatusCode::FORBIDDEN);

        let events = state.audit().list_for_subject(&ticket.id.0).await.expect("audit");
        assert!(events.iter().any(|event| event.event_type == "flow.transition_rejected"));

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn unassign_returns_ticket_to_open_and_frees_capacity() {
        let state = test_state().await;
        let admin = seed_user(&state, "USR-admin", Role::Admin).await;
        let customer = seed_user(&state, "USR-cust", Role::Customer).await;
        let technician = seed_technician(&state, "USR-tech", &["network"], 1).await;
        let ticket = open_ticket(&state, &customer, "network").await;

        auto_assign(State(state.clone()), Extension(admin.clone()), Path(ticket.id.0.clone()))
            .await
            .expect("auto assign");
        let Json(released) = transition(
            State(state.clone()),
            Extension(technician.clone()),
            Path(ticket.id.0.clone()),
            Json(TransitionRequest { to: TicketStatus::Open, resolution_note: None }),
        )
        .await
        .expect("release");
        assert_eq!(released.ticket.status, TicketStatus::Open);
        assert!(released.ticket.technician_id.is_none());

        let Json(preview) = assignment_preview(
            State(state.clone()),
            Extension(admin),
            Path(ticket.id.0.clone()),
        )
        .await
        .expect("preview");
        assert_eq!(preview.evaluations.len(), 1);
        assert!(preview.evaluations[0].eligible);

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn manual_assignment_rejects_technician_at_capacity() {
        let state = test_state().await;
        let admin = seed_user(&state, "USR-admin", Role::Admin).await;
        let customer = seed_user(&state, "USR-cust", Role::Customer).await;
        let technician = seed_technician(&state, "USR-tech", &["network"], 1).await;
        let first = open_ticket(&state, &customer, "network").await;
        let second = open_ticket(&state, &customer, "network").await;

        for (ticket, expect_ok) in [(&first, true), (&second, false)] {
            let result = assign(
                State(state.clone()),
                Extension(admin.clone()),
                Path(ticket.id.0.clone()),
                Json(AssignRequest { technician_id: technician.id().0.clone() }),
            )
            .await;
            match (result, expect_ok) {
                (Ok(_), true) => {}
                (Err(error), false) => assert_eq!(error.status(), StatusCode::CONFLICT),
                (other, _) => panic!("unexpected assignment result: {:?}", other.map(|_| ())),
            }
        }

        let missing = assign(
            State(state.clone()),
            Extension(admin),
            Path(second.id.0.clone()),
            Json(AssignRequest { technician_id: "USR-ghost".to_string() }),
        )
        .await
        .expect_err("unknown technician");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let forbidden = auto_assign(
            State(state.clone()),
            Extension(customer),
            Path(second.id.0.clone()),
        )
        .await
        .expect_err("customers cannot assign");
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn priority_change_recomputes_deadlines_from_creation() {
        let state = test_state().await;
        let admin = seed_user(&state, "USR-admin", Role::Admin).await;
        let customer = seed_user(&state, "USR-cust", Role::Customer).await;
        let ticket = open_ticket(&state, &customer, "network").await;

        let Json(updated) = set_priority(
            State(state.clone()),
            Extension(admin),
            Path(ticket.id.0.clone()),
            Json(PriorityRequest { priority: TicketPriority::Critical }),
        )
        .await
        .expect("set priority");
        assert_eq!(updated.ticket.priority, TicketPriority::Critical);
        assert_eq!(updated.ticket.created_at, ticket.created_at);
        assert_eq!(updated.ticket.response_due_at - ticket.created_at, Duration::hours(1));
        assert_eq!(updated.ticket.resolution_due_at - ticket.created_at, Duration::hours(4));

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn technician_comment_counts_as_first_response() {
        let state = test_state().await;
        let admin = seed_user(&state, "USR-admin", Role::Admin).await;
        let customer = seed_user(&state, "USR-cust", Role::Customer).await;
        let technician = seed_technician(&state, "USR-tech", &["network"], 3).await;
        let ticket = open_ticket(&state, &customer, "network").await;
        assign(
            State(state.clone()),
            Extension(admin),
            Path(ticket.id.0.clone()),
            Json(AssignRequest { technician_id: technician.id().0.clone() }),
        )
        .await
        .expect("assign");

        add_comment(
            State(state.clone()),
            Extension(customer.clone()),
            Path(ticket.id.0.clone()),
            Json(CommentRequest { body: "Any update?".to_string() }),
        )
        .await
        .expect("customer comment");
        let stored = state.tickets().find_by_id(&ticket.id).await.expect("find").expect("exists");
        assert!(stored.first_response_at.is_none());

        add_comment(
            State(state.clone()),
            Extension(technician.clone()),
            Path(ticket.id.0.clone()),
            Json(CommentRequest { body: "Looking into it".to_string() }),
        )
        .await
        .expect("technician comment");
        let stored = state.tickets().find_by_id(&ticket.id).await.expect("find").expect("exists");
        assert!(stored.first_response_at.is_some());
        assert_eq!(stored.response_sla_met, Some(true));

        let Json(comments) = list_comments(
            State(state.clone()),
            Extension(customer.clone()),
            Path(ticket.id.0.clone()),
        )
        .await
        .expect("list comments");
        assert_eq!(comments.comments.len(), 2);

        let inbox =
            state.notifications().list_for_recipient(customer.id(), false).await.expect("inbox");
        assert!(inbox.iter().any(|note| note.kind == NotificationKind::TicketCommented));

        state.db_pool.close().await;
    }

    #[tokio::test]
    async fn listing_and_reading_are_scoped_by_role() {
        let state = test_state().await;
        let admin = seed_user(&state, "USR-admin", Role::Admin).await;
        let alice = seed_user(&state, "USR-alice", Role::Customer).await;
        let bob = seed_user(&state, "USR-bob", Role::Customer).await;
        let technician = seed_technician(&state, "USR-tech", &["general"], 3).await;
        let alices = open_ticket(&state, &alice, "network").await;
        open_ticket(&state, &bob, "printing").await;

        let count = |user: &AuthUser, status: Option<&str>| {
            let state = state.clone();
            let user = user.clone();
            let status = status.map(str::to_string);
            async move {
                let Json(list) =
                    list(State(state), Extension(user), Query(TicketListQuery { status }))
                        .await
                        .expect("list");
                list.tickets.len()
            }
        };
        assert_eq!(count(&admin, None).await, 2);
        assert_eq!(count(&alice, None).await, 1);
        assert_eq!(count(&technician, None).await, 0);
        assert_eq!(count(&admin, Some("resolved")).await, 0);

        let invalid = list(
            State(state.clone()),
            Extension(admin.clone()),
            Query(TicketListQuery { status: Some("pending".to_string()) }),
        )
        .await
        .expect_err("unknown status");
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let hidden = get_ticket(State(state.clone()), Extension(bob), Path(alices.id.0.clone()))
            .await
            .expect_err("other customer's ticket");
        assert_eq!(hidden.status(), StatusCode::FORBIDDEN);

        let Json(sla) =
            sla_status(State(state.clone()), Extension(alice), Path(alices.id.0.clone()))
                .await
                .expect("sla status");
        assert_eq!(sla.ticket_id, alices.id);

        let Json(report) =
            sla_report(State(state.clone()), Extension(admin)).await.expect("report");
        assert_eq!(report.total_tickets, 2);

        state.db_pool.close().await;
    }
}
