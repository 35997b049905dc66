//! Route handlers, one module per resource.
//!
//! Every handler follows the same pipeline: the `Identity` argument (on
//! auth-required routes) resolves the session, the route's `RouteSchema` turns
//! the raw input into a `RequestContext`, by-id operations load the target and
//! answer 404 before any access decision, the context is authorized before anything
//! is written, and the result is sanitized right before responding.

pub mod nav;
pub mod pages;
pub mod users;
