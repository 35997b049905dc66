/// Router Module Index
///
/// One router per resource. Public and auth-required endpoints live side by side:
/// a handler that declares an `Identity` argument is auth-required, and the access
/// decision itself is made inside the handler once the target is known.

/// Users: all endpoints require a session.
pub mod users;

/// Pages: public reads, authenticated writes.
pub mod pages;

/// Navigation menus: public reads, authenticated writes.
pub mod nav;
