use crate::{AppState, handlers::pages};
use axum::{Router, routing::get};

/// Pages Router
///
/// Reads are anonymous. Writes need a role that manages content; the creator of a new
/// page is always the session user.
pub fn page_routes() -> Router<AppState> {
    Router::new()
        // GET /pages?limit=..&offset=..  |  POST /pages
        .route("/pages", get(pages::list_pages).post(pages::create_page))
        // GET/PATCH/DELETE /pages/{pageId}
        .route(
            "/pages/{pageId}",
            get(pages::get_page)
                .patch(pages::update_page)
                .delete(pages::delete_page),
        )
}
