//! Order placement, the kitchen lifecycle and local payment capture.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use helpdesk_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use helpdesk_core::domain::menu::MenuItemId;
use helpdesk_core::domain::notification::{Notification, NotificationKind};
use helpdesk_core::domain::order::{Order, OrderId, OrderStatus, Payment, PaymentStatus};
use helpdesk_core::domain::user::Role;
use helpdesk_core::errors::ApplicationError;
use helpdesk_core::flows::{
    apply_order_outcome, Actor, FlowEngine, OrderAction, OrderContext, OrderLifecycle,
};
use helpdesk_core::orders::{capture_payment, price_order, OrderLineRequest, PaymentRequest};
use helpdesk_db::repositories::{MenuRepository, OrderRepository};

use crate::app::AppState;
use crate::audit;
use crate::auth::{ensure_role, AuthUser};
use crate::error::{bad_request, storage, ApiError, ApiResult};
use crate::notifications::{admin_recipients, deliver};

const MAX_NOTES_LEN: usize = 500;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub lines: Vec<OrderLineRequest>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
}

#[derive(Debug, Serialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateOrderRequest>,
) -> ApiResult<OrderResponse> {
    ensure_role(&user, &[Role::Customer, Role::Admin])?;
    let notes = body.notes.as_deref().map(str::trim).filter(|notes| !notes.is_empty());
    if notes.is_some_and(|notes| notes.chars().count() > MAX_NOTES_LEN) {
        return Err(user.fail(bad_request(format!(
            "notes must be at most {MAX_NOTES_LEN} characters"
        ))));
    }

    let mut item_ids: Vec<MenuItemId> = Vec::with_capacity(body.lines.len());
    for line in &body.lines {
        if !item_ids.contains(&line.item_id) {
            item_ids.push(line.item_id.clone());
        }
    }
    let menu =
        state.menu().load_details(&item_ids).await.map_err(|error| user.fail(storage(error)))?;
    let priced = price_order(
        &body.lines,
        &menu,
        state.settings.tax_rate_pct,
        &state.settings.currency,
    )
    .map_err(|error| user.fail(error))?;

    let now = Utc::now();
    let order = Order {
        id: OrderId(format!("ORD-{}", Uuid::new_v4())),
        customer_id: user.id().clone(),
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Unpaid,
        lines: priced.lines,
        subtotal: priced.subtotal,
        tax: priced.tax,
        total: priced.total,
        currency: priced.currency,
        notes: notes.map(str::to_string),
        created_at: now,
        updated_at: now,
    };
    state.orders().insert(&order).await.map_err(|error| user.fail(storage(error)))?;

    let sink = state.audit_sink();
    sink.emit(
        AuditEvent::from_context(
            &audit_context(&order, &user),
            "order.placed",
            AuditCategory::Order,
            AuditOutcome::Success,
        )
        .with_metadata("total", order.total.to_string())
        .with_metadata("lines", order.lines.len().to_string()),
    );
    audit::flush(&state, &sink).await;

    let notifications = admin_recipients(&state)
        .await
        .into_iter()
        .filter(|admin| admin != user.id())
        .map(|admin| {
            Notification::new(
                admin,
                NotificationKind::OrderStatusChanged,
                order.id.0.clone(),
                format!("New order {} for {} {}", order.id.0, order.total, order.currency),
            )
        })
        .collect();
    deliver(&state, notifications, &user.correlation_id).await;

    info!(
        event_name = "order.placed",
        correlation_id = %user.correlation_id,
        order_id = %order.id.0,
        total = %order.total,
        "order placed"
    );
    Ok(Json(OrderResponse { order, payment: None }))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<OrderList> {
    let customer = if user.is_admin() { None } else { Some(user.id()) };
    let orders = state.orders().list(customer).await.map_err(|error| user.fail(storage(error)))?;
    Ok(Json(OrderList { orders }))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<OrderResponse> {
    let order = load_visible_order(&state, &user, &id).await?;
    let payment =
        state.orders().find_payment(&order.id).await.map_err(|error| user.fail(storage(error)))?;
    Ok(Json(OrderResponse { order, payment }))
}

pub async fn change_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> ApiResult<OrderResponse> {
    let mut order = load_visible_order(&state, &user, &id).await?;
    let context = OrderContext {
        actor: Actor::new(user.id().clone(), user.role()),
        customer_id: order.customer_id.clone(),
        payment_status: order.payment_status,
    };

    let sink = state.audit_sink();
    let audit_context = audit_context(&order, &user);
    let outcome = FlowEngine::new(OrderLifecycle).apply_with_audit(
        order.status,
        body.status,
        &context,
        &sink,
        &audit_context,
    );
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(error) => {
            audit::flush(&state, &sink).await;
            return Err(user.fail(error));
        }
    };

    apply_order_outcome(&mut order, &outcome, Utc::now());
    state.orders().save_status(&order).await.map_err(|error| user.fail(storage(error)))?;

    let refunded = outcome.actions.contains(&OrderAction::RefundPayment);
    if refunded {
        sink.emit(
            AuditEvent::from_context(
                &audit_context,
                "payment.refunded",
                AuditCategory::Payment,
                AuditOutcome::Success,
            )
            .with_metadata("amount", order.total.to_string()),
        );
    }
    audit::flush(&state, &sink).await;

    if outcome.actions.contains(&OrderAction::NotifyCustomer) && &order.customer_id != user.id() {
        let message = if refunded {
            format!(
                "Order {} was cancelled and {} {} refunded",
                order.id.0, order.total, order.currency
            )
        } else {
            format!("Order {} is now {}", order.id.0, order.status.as_str())
        };
        let notification = Notification::new(
            order.customer_id.clone(),
            NotificationKind::OrderStatusChanged,
            order.id.0.clone(),
            message,
        );
        deliver(&state, vec![notification], &user.correlation_id).await;
    }

    info!(
        event_name = "order.status_changed",
        correlation_id = %user.correlation_id,
        order_id = %order.id.0,
        from = outcome.from.as_str(),
        to = outcome.to.as_str(),
        refunded,
        "order status changed"
    );
    let payment =
        state.orders().find_payment(&order.id).await.map_err(|error| user.fail(storage(error)))?;
    Ok(Json(OrderResponse { order, payment }))
}

pub async fn capture(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<PaymentRequest>,
) -> ApiResult<OrderResponse> {
    let mut order = load_visible_order(&state, &user, &id).await?;
    let sink = state.audit_sink();
    let audit_context = audit_context(&order, &user);

    let payment = match capture_payment(&mut order, &body, Utc::now()) {
        Ok(payment) => payment,
        Err(error) => {
            sink.emit(
                AuditEvent::from_context(
                    &audit_context,
                    "payment.rejected",
                    AuditCategory::Payment,
                    AuditOutcome::Rejected,
                )
                .with_metadata("error", error.to_string()),
            );
            audit::flush(&state, &sink).await;
            return Err(user.fail(error));
        }
    };
    state
        .orders()
        .record_payment(&order, &payment)
        .await
        .map_err(|error| user.fail(storage(error)))?;

    sink.emit(
        AuditEvent::from_context(
            &audit_context,
            "payment.captured",
            AuditCategory::Payment,
            AuditOutcome::Success,
        )
        .with_metadata("payment_id", payment.id.0.clone())
        .with_metadata("amount", payment.amount.to_string())
        .with_metadata("method", payment.method.clone()),
    );
    audit::flush(&state, &sink).await;

    let receipt = Notification::new(
        order.customer_id.clone(),
        NotificationKind::PaymentCaptured,
        order.id.0.clone(),
        format!(
            "Payment of {} {} received for order {}",
            payment.amount, order.currency, order.id.0
        ),
    );
    deliver(&state, vec![receipt], &user.correlation_id).await;

    info!(
        event_name = "payment.captured",
        correlation_id = %user.correlation_id,
        order_id = %order.id.0,
        payment_id = %payment.id.0,
        amount = %payment.amount,
        "payment captured"
    );
    Ok(Json(OrderResponse { order, payment: Some(payment) }))
}

/// Owners and admins only; anyone else gets 403.
async fn load_visible_order(
    state: &AppState,
    user: &AuthUser,
    id: &str,
) -> Result<Order, ApiError> {
    let id = OrderId(id.to_string());
    let order = state
        .orders()
        .find_by_id(&id)
        .await
        .map_err(|error| user.fail(storage(error)))?
        .ok_or_else(|| user.fail(ApplicationError::NotFound(format!("order `{}`", id.0))))?;
    if user.role() == Role::Admin || &order.customer_id == user.id() {
        return Ok(order);
    }
    Err(user.fail(ApplicationError::Forbidden(format!("order `{}` belongs to another user", id.0))))
}

fn audit_context(order: &Order, user: &AuthUser) -> AuditContext {
    AuditContext::new(Some(order.id.0.clone()), user.correlation_id.clone(), user.id().0.clone())
}
