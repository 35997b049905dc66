use std::sync::LazyLock;

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::json;

use crate::{
    AppState,
    auth::Identity,
    error::{ApiResult, AppError, ErrorBody},
    models::{
        CreatePageRequest, DEFAULT_PAGE_STATUS, Envelope, NewPage, PAGE_STATUSES, Page, PublicPage,
        UpdatePageRequest,
    },
    pipeline::{RequestContext, respond, respond_all},
    policy::{Capability, Requirement},
    validation::{FieldRule, Pagination, RawInput, RouteSchema},
};

const MAX_CONTENT_LEN: usize = 65_535;

static LIST_PAGES: LazyLock<RouteSchema> = LazyLock::new(RouteSchema::paginated);

static PAGE_BY_ID: LazyLock<RouteSchema> =
    LazyLock::new(|| RouteSchema::new().param("pageId", FieldRule::id().required()));

static CREATE_PAGE: LazyLock<RouteSchema> = LazyLock::new(|| {
    RouteSchema::new()
        .body("title", FieldRule::text(1, 255).required())
        .body("content", FieldRule::text(1, MAX_CONTENT_LEN).required())
        .body("slug", FieldRule::slug().required())
        .body(
            "status",
            FieldRule::one_of(PAGE_STATUSES).with_default(json!(DEFAULT_PAGE_STATUS)),
        )
});

static UPDATE_PAGE: LazyLock<RouteSchema> = LazyLock::new(|| {
    RouteSchema::new()
        .param("pageId", FieldRule::id().required())
        .body("title", FieldRule::text(1, 255))
        .body("content", FieldRule::text(1, MAX_CONTENT_LEN))
        .body("slug", FieldRule::slug())
        .body("status", FieldRule::one_of(PAGE_STATUSES))
});

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagePath {
    page_id: i32,
}

async fn find_page_or_404(state: &AppState, page_id: i32) -> ApiResult<Page> {
    state.repo.find_page(page_id).await?.ok_or(AppError::NotFound)
}

/// list_pages
///
/// [Public Route] Paginated page listing, ordered by id.
#[utoipa::path(
    get,
    path = "/pages",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, 0 to 100 (default 10)"),
        ("offset" = Option<i64>, Query, description = "Rows to skip (default 0)")
    ),
    responses(
        (status = 200, description = "Pages", body = Envelope<Vec<PublicPage>>),
        (status = 400, description = "Invalid pagination", body = ErrorBody)
    )
)]
pub async fn list_pages(
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<Vec<PublicPage>>>> {
    let ctx = RequestContext::public(&LIST_PAGES, &input)?;
    let Pagination { limit, offset } = ctx.data.query()?;

    let pages = state.repo.list_pages(limit, offset).await?;
    Ok(respond_all(&pages))
}

/// get_page
///
/// [Public Route]
#[utoipa::path(
    get,
    path = "/pages/{pageId}",
    params(("pageId" = i32, Path, description = "Page id")),
    responses(
        (status = 200, description = "Page", body = Envelope<PublicPage>),
        (status = 400, description = "Invalid page id", body = ErrorBody),
        (status = 404, description = "No such page", body = ErrorBody)
    )
)]
pub async fn get_page(
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<PublicPage>>> {
    let ctx = RequestContext::public(&PAGE_BY_ID, &input)?;
    let PagePath { page_id } = ctx.data.params()?;

    let page = find_page_or_404(&state, page_id).await?;
    Ok(respond(&page))
}

/// create_page
///
/// [Authenticated Route] Creates a page owned by the session user. `status`
/// defaults to `draft`.
#[utoipa::path(
    post,
    path = "/pages",
    request_body = CreatePageRequest,
    responses(
        (status = 200, description = "Created page", body = Envelope<PublicPage>),
        (status = 400, description = "Invalid input or slug already in use", body = ErrorBody),
        (status = 401, description = "No valid session", body = ErrorBody),
        (status = 403, description = "Role may not manage content", body = ErrorBody)
    )
)]
pub async fn create_page(
    identity: Identity,
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<PublicPage>>> {
    let ctx = RequestContext::authenticated(identity, &CREATE_PAGE, &input)?;
    ctx.authorize(&state.roles, Requirement::role(Capability::ManageContent))?;

    let request: CreatePageRequest = ctx.data.body()?;
    let page = state
        .repo
        .insert_page(NewPage {
            title: request.title,
            content: request.content,
            slug: request.slug,
            creator: ctx.identity.id,
            status: request.status,
        })
        .await?;

    tracing::info!(page_id = page.id, actor = ctx.identity.id, "page created");
    Ok(respond(&page))
}

/// update_page
///
/// [Authenticated Route] Partial page update. Absent fields are left unchanged.
#[utoipa::path(
    patch,
    path = "/pages/{pageId}",
    params(("pageId" = i32, Path, description = "Page id")),
    request_body = UpdatePageRequest,
    responses(
        (status = 200, description = "Updated page", body = Envelope<PublicPage>),
        (status = 400, description = "Invalid input or slug already in use", body = ErrorBody),
        (status = 401, description = "No valid session", body = ErrorBody),
        (status = 403, description = "Role may not manage content", body = ErrorBody),
        (status = 404, description = "No such page", body = ErrorBody)
    )
)]
pub async fn update_page(
    identity: Identity,
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<PublicPage>>> {
    let ctx = RequestContext::authenticated(identity, &UPDATE_PAGE, &input)?;
    let PagePath { page_id } = ctx.data.params()?;
    let patch: UpdatePageRequest = ctx.data.body()?;

    let page = find_page_or_404(&state, page_id).await?;
    ctx.authorize(&state.roles, Requirement::role(Capability::ManageContent))?;

    let updated = state
        .repo
        .update_page(page.id, patch)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!(page_id = updated.id, actor = ctx.identity.id, "page updated");
    Ok(respond(&updated))
}

/// delete_page
///
/// [Authenticated Route] Responds with the removed page.
#[utoipa::path(
    delete,
    path = "/pages/{pageId}",
    params(("pageId" = i32, Path, description = "Page id")),
    responses(
        (status = 200, description = "Deleted page", body = Envelope<PublicPage>),
        (status = 401, description = "No valid session", body = ErrorBody),
        (status = 403, description = "Role may not manage content", body = ErrorBody),
        (status = 404, description = "No such page", body = ErrorBody)
    )
)]
pub async fn delete_page(
    identity: Identity,
    State(state): State<AppState>,
    input: RawInput,
) -> ApiResult<Json<Envelope<PublicPage>>> {
    let ctx = RequestContext::authenticated(identity, &PAGE_BY_ID, &input)?;
    let PagePath { page_id } = ctx.data.params()?;

    let page = find_page_or_404(&state, page_id).await?;
    ctx.authorize(&state.roles, Requirement::role(Capability::ManageContent))?;

    if !state.repo.delete_page(page.id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(page_id = page.id, actor = ctx.identity.id, "page deleted");
    Ok(respond(&page))
}
