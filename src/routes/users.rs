use crate::{AppState, handlers::users};
use axum::{Router, routing::get};

/// Users Router
///
/// Every route here resolves the session first; listing additionally requires a role
/// that may view users, and by-id operations allow the user themself.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        // GET /me
        // The session user's own profile.
        .route("/me", get(users::get_me))
        // GET /users?limit=..&offset=..
        .route("/users", get(users::list_users))
        // GET/PATCH/DELETE /users/{userId}
        // Existence is checked before ownership, so an unknown id is a 404 for everyone.
        .route(
            "/users/{userId}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
}
