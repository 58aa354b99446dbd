//! Technician accounts and the workload view admins use to balance them.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use helpdesk_core::assignment::TechnicianCandidate;
use helpdesk_core::domain::user::{normalize_specialties, Role, TechnicianProfile, User, UserId};
use helpdesk_core::errors::ApplicationError;
use helpdesk_db::repositories::{TechnicianRepository, UserRepository};

use crate::app::AppState;
use crate::auth::{create_account, ensure_role, AuthUser};
use crate::error::{bad_request, storage, ApiResult};

#[derive(Debug, Deserialize)]
pub struct CreateTechnicianRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub max_active_tickets: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTechnicianRequest {
    #[serde(default)]
    pub specialties: Option<Vec<String>>,
    #[serde(default)]
    pub max_active_tickets: Option<u32>,
    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TechnicianResponse {
    pub user: User,
    pub profile: TechnicianProfile,
}

#[derive(Debug, Serialize)]
pub struct TechnicianList {
    pub technicians: Vec<TechnicianCandidate>,
}

fn validate_capacity(max_active_tickets: u32) -> Result<u32, ApplicationError> {
    if max_active_tickets == 0 {
        return Err(bad_request("max_active_tickets must be at least 1"));
    }
    Ok(max_active_tickets)
}

pub async fn create(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Json(body): Json<CreateTechnicianRequest>,
) -> ApiResult<TechnicianResponse> {
    ensure_role(&admin, &[Role::Admin])?;
    let max_active_tickets = validate_capacity(
        body.max_active_tickets.unwrap_or(state.settings.default_max_active_tickets),
    )
    .map_err(|error| admin.fail(error))?;

    let user = create_account(&state, &body.name, &body.email, &body.password, Role::Technician)
        .await
        .map_err(|error| admin.fail(error))?;
    let profile = TechnicianProfile::new(user.id.clone(), &body.specialties, max_active_tickets);
    state
        .technicians()
        .save_profile(&profile, Utc::now())
        .await
        .map_err(|error| admin.fail(storage(error)))?;

    info!(
        event_name = "technician.created",
        correlation_id = %admin.correlation_id,
        user_id = %user.id.0,
        specialties = ?profile.specialties,
        "technician account created"
    );
    Ok(Json(TechnicianResponse { user, profile }))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
) -> ApiResult<TechnicianList> {
    ensure_role(&admin, &[Role::Admin])?;
    let technicians =
        state.technicians().list_candidates().await.map_err(|error| admin.fail(storage(error)))?;
    Ok(Json(TechnicianList { technicians }))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTechnicianRequest>,
) -> ApiResult<TechnicianResponse> {
    ensure_role(&admin, &[Role::Admin])?;
    let id = UserId(id);
    let not_found = || ApplicationError::NotFound(format!("technician `{}`", id.0));

    let mut user = state
        .users()
        .find_by_id(&id)
        .await
        .map_err(|error| admin.fail(storage(error)))?
        .filter(|user| user.role == Role::Technician)
        .ok_or_else(|| admin.fail(not_found()))?;
    let mut profile = state
        .technicians()
        .find_profile(&id)
        .await
        .map_err(|error| admin.fail(storage(error)))?
        .unwrap_or_else(|| {
            TechnicianProfile::new(
                id.clone(),
                Vec::<String>::new(),
                state.settings.default_max_active_tickets,
            )
        });

    if let Some(specialties) = body.specialties {
        profile.specialties = normalize_specialties(specialties);
    }
    if let Some(max_active_tickets) = body.max_active_tickets {
        profile.max_active_tickets =
            validate_capacity(max_active_tickets).map_err(|error| admin.fail(error))?;
    }
    if let Some(available) = body.available {
        profile.available = available;
    }
    state
        .technicians()
        .save_profile(&profile, Utc::now())
        .await
        .map_err(|error| admin.fail(storage(error)))?;

    if let Some(active) = body.active.filter(|active| *active != user.active) {
        state.users().set_active(&id, active).await.map_err(|error| admin.fail(storage(error)))?;
        user.active = active;
    }

    info!(
        event_name = "technician.updated",
        correlation_id = %admin.correlation_id,
        user_id = %id.0,
        available = profile.available,
        active = user.active,
        "technician profile updated"
    );
    Ok(Json(TechnicianResponse { user, profile }))
}
