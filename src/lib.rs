use std::sync::Arc;

use axum::{Router, extract::FromRef, http::HeaderName, routing::get};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Request pipeline stages.
pub mod auth;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod validation;

// Data, persistence and configuration.
pub mod config;
pub mod models;
pub mod repository;

// HTTP surface.
pub mod handlers;
pub mod routes;

use routes::{nav::nav_routes, pages::page_routes, users::user_routes};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use policy::RoleDirectory;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for every route, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::users::get_me, handlers::users::list_users, handlers::users::get_user,
        handlers::users::update_user, handlers::users::delete_user,
        handlers::pages::list_pages, handlers::pages::get_page, handlers::pages::create_page,
        handlers::pages::update_page, handlers::pages::delete_page,
        handlers::nav::list_nav_menus, handlers::nav::get_nav_menu, handlers::nav::create_nav_menu,
        handlers::nav::update_nav_menu, handlers::nav::delete_nav_menu,
    ),
    components(
        schemas(
            models::PublicUser, models::PublicPage, models::PublicNavMenu,
            models::UpdateUserRequest, models::CreatePageRequest, models::UpdatePageRequest,
            models::CreateNavMenuRequest, models::UpdateNavMenuRequest, error::ErrorBody,
        )
    ),
    tags(
        (name = "cms-backend", description = "Content management API: users, pages and navigation menus")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Shared, read-only state of the running service. Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Persistence for users, pages and navigation menus.
    pub repo: RepositoryState,
    pub config: AppConfig,
    /// Role names by id, loaded once at startup.
    pub roles: Arc<RoleDirectory>,
}

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every route, the documentation UI and the middleware stack, and binds
/// the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // GET /health
        // Liveness probe, no session and no database access.
        .route("/health", get(|| async { "ok" }))
        .merge(user_routes())
        .merge(page_routes())
        .merge(nav_routes())
        // Unknown paths go through the error translator like any other failure.
        .fallback(error::route_not_found)
        .method_not_allowed_fallback(error::method_not_allowed)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id))
                // A panicking handler still answers with the generic internal error body.
                .layer(CatchPanicLayer::custom(error::handle_panic)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, tagged with its `x-request-id` so every log line of the
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
