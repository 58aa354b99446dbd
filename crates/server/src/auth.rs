//! Bearer-token authentication, role guards, and the register/login/me endpoints.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use helpdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use helpdesk_core::auth::{hash_password, verify_password, IssuedToken};
use helpdesk_core::domain::user::{Role, User, UserId};
use helpdesk_core::errors::ApplicationError;
use helpdesk_db::repositories::UserRepository;

use crate::app::AppState;
use crate::audit;
use crate::error::{bad_request, new_correlation_id, storage, ApiError, ApiResult};

/// The authenticated caller, inserted into request extensions by [`require_auth`].
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user: User,
    pub correlation_id: String,
}

impl AuthUser {
    pub fn id(&self) -> &UserId {
        &self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Admin
    }

    pub fn fail(&self, error: impl Into<ApplicationError>) -> ApiError {
        ApiError::new(error, &self.correlation_id)
    }
}

pub fn ensure_role(user: &AuthUser, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&user.role()) {
        return Ok(());
    }
    Err(user.fail(ApplicationError::Forbidden(format!(
        "role `{}` may not perform this action",
        user.role().as_str()
    ))))
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let correlation_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(new_correlation_id);

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            ApiError::new(
                ApplicationError::Unauthorized("missing bearer token".to_string()),
                &correlation_id,
            )
        })?;

    let claims = state
        .signer
        .verify(token, Utc::now())
        .map_err(|error| ApiError::new(error, &correlation_id))?;

    let user = state
        .users()
        .find_by_id(&claims.user_id)
        .await
        .map_err(|error| ApiError::new(storage(error), &correlation_id))?
        .filter(|user| user.active && user.role == claims.role)
        .ok_or_else(|| {
            ApiError::new(
                ApplicationError::Unauthorized("account is inactive or has changed".to_string()),
                &correlation_id,
            )
        })?;

    request.extensions_mut().insert(AuthUser { user, correlation_id });
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub token: String,
    pub expires_at: String,
}

impl SessionResponse {
    fn new(user: User, issued: IssuedToken) -> Self {
        Self { user, token: issued.token, expires_at: issued.expires_at.to_rfc3339() }
    }
}

/// Creates an account; email uniqueness is enforced by storage.
pub(crate) async fn create_account(
    state: &AppState,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> Result<User, ApplicationError> {
    let name = name.trim();
    let email = email.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(bad_request("name is required"));
    }
    if !is_plausible_email(&email) {
        return Err(bad_request(format!("`{email}` is not a valid email address")));
    }
    let password_hash = hash_password(password)?;

    let user = User {
        id: UserId(format!("USR-{}", Uuid::new_v4())),
        name: name.to_string(),
        email,
        role,
        active: true,
        created_at: Utc::now(),
    };
    state.users().insert(&user, &password_hash).await.map_err(storage)?;
    Ok(user)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<SessionResponse> {
    let correlation_id = new_correlation_id();
    let user = create_account(&state, &body.name, &body.email, &body.password, Role::Customer)
        .await
        .map_err(|error| ApiError::new(error, &correlation_id))?;

    let sink = state.audit_sink();
    sink.emit(AuditEvent::new(
        Some(user.id.0.clone()),
        &correlation_id,
        "auth.registered",
        AuditCategory::Auth,
        &user.id.0,
        AuditOutcome::Success,
    ));
    audit::flush(&state, &sink).await;

    info!(
        event_name = "auth.user.registered",
        correlation_id = %correlation_id,
        user_id = %user.id.0,
        "customer account registered"
    );

    let issued = state.signer.issue(&user.id, user.role, Utc::now());
    Ok(Json(SessionResponse::new(user, issued)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<SessionResponse> {
    let correlation_id = new_correlation_id();
    let rejected = || {
        ApiError::new(
            ApplicationError::Unauthorized("invalid email or password".to_string()),
            &correlation_id,
        )
    };

    let credentials = state
        .users()
        .find_credentials_by_email(&body.email)
        .await
        .map_err(|error| ApiError::new(storage(error), &correlation_id))?;
    let Some(credentials) = credentials else {
        return Err(rejected());
    };

    let password_ok = verify_password(&body.password, &credentials.password_hash)
        .map_err(|error| ApiError::new(error, &correlation_id))?;
    if !password_ok || !credentials.user.active {
        let sink = state.audit_sink();
        sink.emit(AuditEvent::new(
            Some(credentials.user.id.0.clone()),
            &correlation_id,
            "auth.login_rejected",
            AuditCategory::Auth,
            &credentials.user.id.0,
            AuditOutcome::Rejected,
        ));
        audit::flush(&state, &sink).await;
        warn!(
            event_name = "auth.login.rejected",
            correlation_id = %correlation_id,
            user_id = %credentials.user.id.0,
            "login rejected"
        );
        return Err(rejected());
    }

    let user = credentials.user;
    let issued = state.signer.issue(&user.id, user.role, Utc::now());
    info!(
        event_name = "auth.login.succeeded",
        correlation_id = %correlation_id,
        user_id = %user.id.0,
        "user logged in"
    );
    Ok(Json(SessionResponse::new(user, issued)))
}

pub async fn me(Extension(user): Extension<AuthUser>) -> ApiResult<User> {
    Ok(Json(user.user))
}
