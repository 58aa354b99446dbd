use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use helpdesk_core::domain::notification::{Notification, NotificationId};
use helpdesk_core::domain::user::{Role, UserId};
use helpdesk_core::errors::ApplicationError;
use helpdesk_db::repositories::{NotificationRepository, RepositoryError, UserRepository};

use crate::app::AppState;
use crate::auth::AuthUser;
use crate::error::{storage, ApiResult};

/// Stores notification records. Delivery failures are logged and do not fail the request.
pub async fn deliver(state: &AppState, notifications: Vec<Notification>, correlation_id: &str) {
    if notifications.is_empty() {
        return;
    }
    match state.notifications().insert_many(&notifications).await {
        Ok(()) => info!(
            event_name = "notification.recorded",
            correlation_id = %correlation_id,
            count = notifications.len(),
            "notifications recorded"
        ),
        Err(error) => warn!(
            event_name = "notification.record_failed",
            correlation_id = %correlation_id,
            error = %error,
            "failed to record notifications"
        ),
    }
}

/// Active admins, used as the fallback audience for unowned work.
pub async fn active_admins(state: &AppState) -> Result<Vec<UserId>, RepositoryError> {
    let admins = state.users().list_by_role(Role::Admin).await?;
    Ok(admins.into_iter().filter(|admin| admin.active).map(|admin| admin.id).collect())
}

/// [`active_admins`] for best-effort notices; a failed lookup is logged and yields nobody.
pub async fn admin_recipients(state: &AppState) -> Vec<UserId> {
    match active_admins(state).await {
        Ok(admins) => admins,
        Err(error) => {
            warn!(
                event_name = "notification.admin_lookup_failed",
                error = %error,
                "could not load admin recipients"
            );
            Vec::new()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

#[derive(Debug, Serialize)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub unread: usize,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<NotificationList> {
    let notifications = state
        .notifications()
        .list_for_recipient(user.id(), query.unread)
        .await
        .map_err(|error| user.fail(storage(error)))?;
    let unread = notifications.iter().filter(|notification| !notification.read).count();
    Ok(Json(NotificationList { notifications, unread }))
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub id: NotificationId,
    pub read: bool,
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<MarkReadResponse> {
    let id = NotificationId(id);
    let updated = state
        .notifications()
        .mark_read(&id, user.id())
        .await
        .map_err(|error| user.fail(storage(error)))?;
    if !updated {
        return Err(user.fail(ApplicationError::NotFound(format!("notification `{}`", id.0))));
    }
    Ok(Json(MarkReadResponse { id, read: true }))
}
