use crate::{AppState, handlers::nav};
use axum::{Router, routing::get};

/// Navigation Router
pub fn nav_routes() -> Router<AppState> {
    Router::new()
        .route("/nav", get(nav::list_nav_menus).post(nav::create_nav_menu))
        .route(
            "/nav/{navId}",
            get(nav::get_nav_menu)
                .patch(nav::update_nav_menu)
                .delete(nav::delete_nav_menu),
        )
}
