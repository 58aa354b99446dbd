use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use helpdesk_core::assignment::AssignmentEngine;
use helpdesk_core::audit::InMemoryAuditSink;
use helpdesk_core::auth::TokenSigner;
use helpdesk_core::config::AppConfig;
use helpdesk_core::sla::{SlaClock, SlaPolicy};
use helpdesk_db::repositories::{
    SqlAuditRepository, SqlMenuRepository, SqlNotificationRepository, SqlOrderRepository,
    SqlTechnicianRepository, SqlTicketRepository, SqlUserRepository,
};
use helpdesk_db::DbPool;

use crate::{auth, health, menu, notifications, orders, technicians, tickets};

/// Everything handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub settings: Arc<ServiceSettings>,
    pub signer: Arc<TokenSigner>,
}

/// Business settings resolved once from config.
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    pub sla_policy: SlaPolicy,
    pub sla_clock: SlaClock,
    pub assignment: AssignmentEngine,
    pub auto_assign: bool,
    pub default_max_active_tickets: u32,
    pub currency: String,
    pub tax_rate_pct: rust_decimal::Decimal,
}

impl AppState {
    pub fn from_config(db_pool: DbPool, config: &AppConfig) -> Self {
        let sla_policy = config.sla.policy();
        let settings = ServiceSettings {
            sla_clock: SlaClock::from_policy(&sla_policy),
            sla_policy,
            assignment: AssignmentEngine::new(config.assignment.weights()),
            auto_assign: config.assignment.auto_assign,
            default_max_active_tickets: config.assignment.default_max_active_tickets,
            currency: config.orders.currency.clone(),
            tax_rate_pct: config.orders.tax_rate_pct,
        };
        let signer =
            TokenSigner::new(config.auth.token_secret.clone(), config.auth.token_ttl_minutes);
        Self { db_pool, settings: Arc::new(settings), signer: Arc::new(signer) }
    }

    pub fn users(&self) -> SqlUserRepository {
        SqlUserRepository::new(self.db_pool.clone())
    }

    pub fn technicians(&self) -> SqlTechnicianRepository {
        SqlTechnicianRepository::new(self.db_pool.clone())
    }

    pub fn tickets(&self) -> SqlTicketRepository {
        SqlTicketRepository::new(self.db_pool.clone())
    }

    pub fn notifications(&self) -> SqlNotificationRepository {
        SqlNotificationRepository::new(self.db_pool.clone())
    }

    pub fn menu(&self) -> SqlMenuRepository {
        SqlMenuRepository::new(self.db_pool.clone())
    }

    pub fn orders(&self) -> SqlOrderRepository {
        SqlOrderRepository::new(self.db_pool.clone())
    }

    pub fn audit(&self) -> SqlAuditRepository {
        SqlAuditRepository::new(self.db_pool.clone())
    }

    /// Fresh per-request buffer; handlers flush it with [`crate::audit::flush`].
    pub fn audit_sink(&self) -> InMemoryAuditSink {
        InMemoryAuditSink::default()
    }
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/menu", get(menu::public_menu));

    let protected = Router::new()
        .route("/api/v1/auth/me", get(auth::me))
        .route("/api/v1/technicians", post(technicians::create).get(technicians::list))
        .route("/api/v1/technicians/{id}", put(technicians::update))
        .route("/api/v1/tickets", post(tickets::create).get(tickets::list))
        .route("/api/v1/tickets/{id}", get(tickets::get_ticket))
        .route("/api/v1/tickets/{id}/transition", post(tickets::transition))
        .route("/api/v1/tickets/{id}/assign", post(tickets::assign))
        .route("/api/v1/tickets/{id}/auto-assign", post(tickets::auto_assign))
        .route("/api/v1/tickets/{id}/assignment-preview", get(tickets::assignment_preview))
        .route("/api/v1/tickets/{id}/priority", put(tickets::set_priority))
        .route(
            "/api/v1/tickets/{id}/comments",
            post(tickets::add_comment).get(tickets::list_comments),
        )
        .route("/api/v1/tickets/{id}/sla", get(tickets::sla_status))
        .route("/api/v1/sla/report", get(tickets::sla_report))
        .route("/api/v1/notifications", get(notifications::list))
        .route("/api/v1/notifications/{id}/read", post(notifications::mark_read))
        .route("/api/v1/menu/categories", post(menu::create_category))
        .route("/api/v1/menu/items", post(menu::create_item))
        .route("/api/v1/menu/items/{id}/availability", put(menu::set_availability))
        .route("/api/v1/menu/items/{id}/variant-groups", post(menu::create_group))
        .route("/api/v1/menu/variant-groups/{id}/options", post(menu::create_option))
        .route("/api/v1/orders", post(orders::create).get(orders::list))
        .route("/api/v1/orders/{id}", get(orders::get_order))
        .route("/api/v1/orders/{id}/status", post(orders::change_status))
        .route("/api/v1/orders/{id}/payment", post(orders::capture))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state.clone())
        .merge(health::router(state.db_pool))
}
