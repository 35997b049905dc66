use std::sync::LazyLock;

use axum::{Json, extract::State};
use serde::Deserialize;

use crate::{
    AppState,
    auth::Identity,
    error::{ApiResult, AppError, ErrorBody},
    models::{CreateNavMenuRequest, Envelope, NavMenu, PublicNavMenu, UpdateNavMenuRequest},
    pipeline::{RequestContext, respond, respond_all},
    policy::{Capability, Requirement},
    validation::{FieldRule, Pagination, RawInput, RouteSchema},
};

// Serialized menu tree; stored as text and never interpreted here.
const MAX_HIERARCHY_LEN: usize = 65_535;

static LIST_NAV: LazyLock<RouteSchema> = LazyLock::new(RouteSchema::paginated);

static NAV_BY_ID: LazyLock<RouteSchema> =
    LazyLock::new(|| RouteSchema::new().param("navId", FieldRule::id().required()));

static CREATE_NAV: LazyLock<RouteSchema> = LazyLock::new(|| {
    RouteSchema::new()
        .body("name", FieldRule::name().required())
        .body("hierarchy", FieldRule::text(0, MAX_HIERARCHY_LEN).nullable())
});

static UPDATE_NAV: LazyLock<RouteSchema> = LazyLock::new(|| {
    RouteSchema::new()
        .param("navId", FieldRule::id().required())
        .body("name", FieldRule::name())
        .body("hierarchy", FieldRule::text(0, MAX_HIERARCHY_LEN).nullable())
});

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavPath {
    nav_id: i32,
}

async fn find_menu_or_404(state: &AppState, nav_id: i32) -> ApiResult<NavMenu> {
    state
        .repo
        .find_nav_menu(nav_id)
        .await?
        .ok_or(AppError::NotFound)
}

/// list_nav_menus
///
/// [Public Route]
#[utoipa::path(
    get,
    path = "/nav",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, 0 to 100 (default 10)"),
        ("offset" = Option<i64>, Query, description = "Rows to skip (default 0)")
    ),
    responses(
        (status = 200, description = "Navigation menus", body = Envelope<Vec<PublicNavMenu>>),
        (status = 400, description = "Invalid pagination", body = ErrorBody)
    )
)]
pub async fn list_nav_menus(
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<Vec<PublicNavMenu>>>> {
    let ctx = RequestContext::public(&LIST_NAV, &input)?;
    let Pagination { limit, offset } = ctx.data.query()?;

    let menus = state.repo.list_nav_menus(limit, offset).await?;
    Ok(respond_all(&menus))
}

/// get_nav_menu
///
/// [Public Route]
#[utoipa::path(
    get,
    path = "/nav/{navId}",
    params(("navId" = i32, Path, description = "Navigation menu id")),
    responses(
        (status = 200, description = "Navigation menu", body = Envelope<PublicNavMenu>),
        (status = 404, description = "No such menu", body = ErrorBody)
    )
)]
pub async fn get_nav_menu(
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<PublicNavMenu>>> {
    let ctx = RequestContext::public(&NAV_BY_ID, &input)?;
    let NavPath { nav_id } = ctx.data.params()?;

    let menu = find_menu_or_404(&state, nav_id).await?;
    Ok(respond(&menu))
}

/// create_nav_menu
///
/// [Authenticated Route] Requires a role that manages content.
#[utoipa::path(
    post,
    path = "/nav",
    request_body = CreateNavMenuRequest,
    responses(
        (status = 200, description = "Created menu", body = Envelope<PublicNavMenu>),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "No valid session", body = ErrorBody),
        (status = 403, description = "Role may not manage content", body = ErrorBody)
    )
)]
pub async fn create_nav_menu(
    identity: Identity,
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<PublicNavMenu>>> {
    let ctx = RequestContext::authenticated(identity, &CREATE_NAV, &input)?;
    ctx.authorize(&state.roles, Requirement::role(Capability::ManageContent))?;

    let request: CreateNavMenuRequest = ctx.data.body()?;
    let menu = state.repo.insert_nav_menu(request).await?;

    tracing::info!(nav_id = menu.id, actor = ctx.identity.id, "navigation menu created");
    Ok(respond(&menu))
}

/// update_nav_menu
///
/// [Authenticated Route] Partial update. `hierarchy: null` clears the hierarchy.
#[utoipa::path(
    patch,
    path = "/nav/{navId}",
    params(("navId" = i32, Path, description = "Navigation menu id")),
    request_body = UpdateNavMenuRequest,
    responses(
        (status = 200, description = "Updated menu", body = Envelope<PublicNavMenu>),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "No valid session", body = ErrorBody),
        (status = 403, description = "Role may not manage content", body = ErrorBody),
        (status = 404, description = "No such menu", body = ErrorBody)
    )
)]
pub async fn update_nav_menu(
    identity: Identity,
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<PublicNavMenu>>> {
    let ctx = RequestContext::authenticated(identity, &UPDATE_NAV, &input)?;
    let NavPath { nav_id } = ctx.data.params()?;
    let patch: UpdateNavMenuRequest = ctx.data.body()?;

    let menu = find_menu_or_404(&state, nav_id).await?;
    ctx.authorize(&state.roles, Requirement::role(Capability::ManageContent))?;

    let updated = state
        .repo
        .update_nav_menu(menu.id, patch)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!(nav_id = updated.id, actor = ctx.identity.id, "navigation menu updated");
    Ok(respond(&updated))
}

/// delete_nav_menu
///
/// [Authenticated Route]
#[utoipa::path(
    delete,
    path = "/nav/{navId}",
    params(("navId" = i32, Path, description = "Navigation menu id")),
    responses(
        (status = 200, description = "Deleted menu", body = Envelope<PublicNavMenu>),
        (status = 401, description = "No valid session", body = ErrorBody),
        (status = 403, description = "Role may not manage content", body = ErrorBody),
        (status = 404, description = "No such menu", body = ErrorBody)
    )
)]
pub async fn delete_nav_menu(
    identity: Identity,
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<PublicNavMenu>>> {
    let ctx = RequestContext::authenticated(identity, &NAV_BY_ID, &input)?;
    let NavPath { nav_id } = ctx.data.params()?;

    let menu = find_menu_or_404(&state, nav_id).await?;
    ctx.authorize(&state.roles, Requirement::role(Capability::ManageContent))?;

    if !state.repo.delete_nav_menu(menu.id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(nav_id = menu.id, actor = ctx.identity.id, "navigation menu deleted");
    Ok(respond(&menu))
}
