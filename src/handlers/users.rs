use std::sync::LazyLock;

use axum::{Json, extract::State};
use serde::Deserialize;

use crate::{
    AppState,
    auth::Identity,
    error::{ApiResult, AppError, ErrorBody},
    models::{Envelope, PublicUser, UpdateUserRequest, User},
    pipeline::{RequestContext, respond, respond_all},
    policy::{Capability, Requirement},
    validation::{FieldRule, Pagination, RawInput, RouteSchema},
};

static LIST_USERS: LazyLock<RouteSchema> = LazyLock::new(RouteSchema::paginated);

static USER_BY_ID: LazyLock<RouteSchema> =
    LazyLock::new(|| RouteSchema::new().param("userId", FieldRule::id().required()));

static UPDATE_USER: LazyLock<RouteSchema> = LazyLock::new(|| {
    RouteSchema::new()
        .param("userId", FieldRule::id().required())
        .body("firstName", FieldRule::name())
        .body("lastName", FieldRule::name())
        .body("email", FieldRule::email())
});

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPath {
    user_id: i32,
}

async fn find_user_or_404(state: &AppState, user_id: i32) -> ApiResult<User> {
    state.repo.find_user(user_id).await?.ok_or(AppError::NotFound)
}

/// get_me
///
/// [Authenticated Route] The session user's own public profile.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Profile", body = Envelope<PublicUser>),
        (status = 401, description = "No valid session", body = ErrorBody)
    )
)]
pub async fn get_me(
    identity: Identity,
    State(state): State<AppState>,
) -> ApiResult<Json<Envelope<PublicUser>>> {
    let user = find_user_or_404(&state, identity.id).await?;
    Ok(respond(&user))
}

/// list_users
///
/// [Authenticated Route] Paginated user listing, for roles that may view users.
#[utoipa::path(
    get,
    path = "/users",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, 0 to 100 (default 10)"),
        ("offset" = Option<i64>, Query, description = "Rows to skip (default 0)")
    ),
    responses(
        (status = 200, description = "Users", body = Envelope<Vec<PublicUser>>),
        (status = 400, description = "Invalid pagination", body = ErrorBody),
        (status = 401, description = "No valid session", body = ErrorBody),
        (status = 403, description = "Role may not list users", body = ErrorBody)
    )
)]
pub async fn list_users(
    identity: Identity,
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<Vec<PublicUser>>>> {
    let ctx = RequestContext::authenticated(identity, &LIST_USERS, &input)?;
    ctx.authorize(&state.roles, Requirement::role(Capability::ViewUsers))?;

    let Pagination { limit, offset } = ctx.data.query()?;
    let users = state.repo.list_users(limit, offset).await?;
    Ok(respond_all(&users))
}

/// get_user
///
/// [Authenticated Route] One user's public profile: oneself, or anyone for roles
/// that may view users.
#[utoipa::path(
    get,
    path = "/users/{userId}",
    params(("userId" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = Envelope<PublicUser>),
        (status = 403, description = "Not oneself and role may not view users", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody)
    )
)]
pub async fn get_user(
    identity: Identity,
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<PublicUser>>> {
    let ctx = RequestContext::authenticated(identity, &USER_BY_ID, &input)?;
    let UserPath { user_id } = ctx.data.params()?;

    let user = find_user_or_404(&state, user_id).await?;
    ctx.authorize(
        &state.roles,
        Requirement::self_or(user.id, Capability::ViewUsers),
    )?;

    Ok(respond(&user))
}

/// update_user
///
/// [Authenticated Route] Partial profile update. A user may edit themself; roles
/// that manage users may edit anyone.
#[utoipa::path(
    patch,
    path = "/users/{userId}",
    params(("userId" = i32, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = Envelope<PublicUser>),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "No valid session", body = ErrorBody),
        (status = 403, description = "Not oneself and role may not manage users", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody)
    )
)]
pub async fn update_user(
    identity: Identity,
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<PublicUser>>> {
    let ctx = RequestContext::authenticated(identity, &UPDATE_USER, &input)?;
    let UserPath { user_id } = ctx.data.params()?;
    let patch: UpdateUserRequest = ctx.data.body()?;

    let user = find_user_or_404(&state, user_id).await?;
    ctx.authorize(
        &state.roles,
        Requirement::self_or(user.id, Capability::ManageUsers),
    )?;

    let updated = state
        .repo
        .update_user(user.id, patch)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!(user_id = updated.id, actor = ctx.identity.id, "user updated");
    Ok(respond(&updated))
}

/// delete_user
///
/// [Authenticated Route] Removes a user (and, through the schema, their pages).
/// Same ownership rule as `update_user`. Responds with the removed profile.
#[utoipa::path(
    delete,
    path = "/users/{userId}",
    params(("userId" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "Deleted user", body = Envelope<PublicUser>),
        (status = 403, description = "Not oneself and role may not manage users", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody)
    )
)]
pub async fn delete_user(
    identity: Identity,
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<PublicUser>>> {
    let ctx = RequestContext::authenticated(identity, &USER_BY_ID, &input)?;
    let UserPath { user_id } = ctx.data.params()?;

    let user = find_user_or_404(&state, user_id).await?;
    ctx.authorize(
        &state.roles,
        Requirement::self_or(user.id, Capability::ManageUsers),
    )?;

    if !state.repo.delete_user(user.id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(user_id = user.id, actor = ctx.identity.id, "user deleted");
    Ok(respond(&user))
}
