//! Menu browsing for everyone and menu maintenance for admins.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use helpdesk_core::domain::menu::{
    MenuCategory, MenuCategoryId, MenuItem, MenuItemId, MenuSection, VariantGroup, VariantGroupId,
    VariantOption, VariantOptionId,
};
use helpdesk_core::domain::user::Role;
use helpdesk_core::errors::ApplicationError;
use helpdesk_db::repositories::MenuRepository;

use crate::app::AppState;
use crate::auth::{ensure_role, AuthUser};
use crate::error::{bad_request, new_correlation_id, storage, ApiError, ApiResult};

#[derive(Debug, Serialize)]
pub struct MenuResponse {
    pub sections: Vec<MenuSection>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub position: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub category_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_price: Decimal,
    #[serde(default = "default_true")]
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_max_selections")]
    pub max_selections: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateOptionRequest {
    pub name: String,
    #[serde(default)]
    pub price_delta: Decimal,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_selections() -> u32 {
    1
}

fn required_name(raw: &str, what: &str) -> Result<String, ApplicationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(bad_request(format!("{what} name is required")));
    }
    Ok(name.to_string())
}

/// Available items and options only; sections left empty are dropped.
pub async fn public_menu(State(state): State<AppState>) -> ApiResult<MenuResponse> {
    let sections = state
        .menu()
        .list_sections(false)
        .await
        .map_err(|error| ApiError::new(storage(error), &new_correlation_id()))?;
    Ok(Json(MenuResponse { sections }))
}

pub async fn create_category(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Json(body): Json<CreateCategoryRequest>,
) -> ApiResult<MenuCategory> {
    ensure_role(&admin, &[Role::Admin])?;
    let category = MenuCategory {
        id: MenuCategoryId(format!("CAT-{}", Uuid::new_v4())),
        name: required_name(&body.name, "category").map_err(|error| admin.fail(error))?,
        position: body.position,
    };
    state.menu().insert_category(&category).await.map_err(|error| admin.fail(storage(error)))?;
    info!(
        event_name = "menu.category_created",
        correlation_id = %admin.correlation_id,
        category_id = %category.id.0,
        "menu category created"
    );
    Ok(Json(category))
}

pub async fn create_item(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Json(body): Json<CreateItemRequest>,
) -> ApiResult<MenuItem> {
    ensure_role(&admin, &[Role::Admin])?;
    let name = required_name(&body.name, "item").map_err(|error| admin.fail(error))?;
    if body.base_price.is_sign_negative() {
        return Err(admin.fail(bad_request("base_price must not be negative")));
    }

    let category_id = MenuCategoryId(body.category_id.trim().to_string());
    let categories =
        state.menu().list_categories().await.map_err(|error| admin.fail(storage(error)))?;
    if !categories.iter().any(|category| category.id == category_id) {
        return Err(admin.fail(ApplicationError::NotFound(format!(
            "menu category `{}`",
            category_id.0
        ))));
    }

    let item = MenuItem {
        id: MenuItemId(format!("ITM-{}", Uuid::new_v4())),
        category_id,
        name,
        description: body.description.trim().to_string(),
        base_price: body.base_price,
        available: body.available,
    };
    state.menu().insert_item(&item).await.map_err(|error| admin.fail(storage(error)))?;
    info!(
        event_name = "menu.item_created",
        correlation_id = %admin.correlation_id,
        item_id = %item.id.0,
        "menu item created"
    );
    Ok(Json(item))
}

pub async fn set_availability(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<AvailabilityRequest>,
) -> ApiResult<MenuItem> {
    ensure_role(&admin, &[Role::Admin])?;
    let id = MenuItemId(id);
    let updated = state
        .menu()
        .set_item_availability(&id, body.available)
        .await
        .map_err(|error| admin.fail(storage(error)))?;
    let item = match updated {
        true => state.menu().find_item(&id).await.map_err(|error| admin.fail(storage(error)))?,
        false => None,
    };
    let item = item
        .ok_or_else(|| admin.fail(ApplicationError::NotFound(format!("menu item `{}`", id.0))))?;
    info!(
        event_name = "menu.item_availability_changed",
        correlation_id = %admin.correlation_id,
        item_id = %item.id.0,
        available = item.available,
        "menu item availability changed"
    );
    Ok(Json(item))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(item_id): Path<String>,
    Json(body): Json<CreateGroupRequest>,
) -> ApiResult<VariantGroup> {
    ensure_role(&admin, &[Role::Admin])?;
    let name = required_name(&body.name, "variant group").map_err(|error| admin.fail(error))?;
    if body.max_selections == 0 {
        return Err(admin.fail(bad_request("max_selections must be at least 1")));
    }
    let item_id = MenuItemId(item_id);
    state
        .menu()
        .find_item(&item_id)
        .await
        .map_err(|error| admin.fail(storage(error)))?
        .ok_or_else(|| {
            admin.fail(ApplicationError::NotFound(format!("menu item `{}`", item_id.0)))
        })?;

    let group = VariantGroup {
        id: VariantGroupId(format!("GRP-{}", Uuid::new_v4())),
        item_id,
        name,
        required: body.required,
        max_selections: body.max_selections,
    };
    state.menu().insert_group(&group).await.map_err(|error| admin.fail(storage(error)))?;
    Ok(Json(group))
}

pub async fn create_option(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(group_id): Path<String>,
    Json(body): Json<CreateOptionRequest>,
) -> ApiResult<VariantOption> {
    ensure_role(&admin, &[Role::Admin])?;
    let name = required_name(&body.name, "option").map_err(|error| admin.fail(error))?;
    let group_id = VariantGroupId(group_id);
    state
        .menu()
        .find_group(&group_id)
        .await
        .map_err(|error| admin.fail(storage(error)))?
        .ok_or_else(|| {
            admin.fail(ApplicationError::NotFound(format!("variant group `{}`", group_id.0)))
        })?;

    let option = VariantOption {
        id: VariantOptionId(format!("OPT-{}", Uuid::new_v4())),
        group_id,
        name,
        price_delta: body.price_delta,
        available: body.available,
    };
    state.menu().insert_option(&option).await.map_err(|error| admin.fail(storage(error)))?;
    Ok(Json(option))
}
