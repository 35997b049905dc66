//! Request context threaded through the pipeline stages.
//!
//! `Received → Authenticating → Validating → Authorizing → Executing → Responding`.
//! Authentication happens in the `Identity` extractor, so a handler starts with an
//! identity (or none, on public routes) and the raw input. Each later stage takes the
//! context produced by the previous one instead of mutating shared request state.

use axum::Json;

use crate::{
    auth::Identity,
    error::AppError,
    models::{Envelope, Sanitize},
    policy::{Requirement, RoleDirectory},
    validation::{RawInput, RouteSchema, Validated},
};

/// RequestContext
///
/// Accumulated, immutable result of the earlier stages: the identity (`()` on
/// public routes) and the validated data.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext<I = ()> {
    pub identity: I,
    pub data: Validated,
}

impl RequestContext<()> {
    /// Validating stage of a public route.
    pub fn public(schema: &RouteSchema, input: &RawInput) -> Result<Self, AppError> {
        Ok(Self {
            identity: (),
            data: schema.validate(input)?,
        })
    }
}

impl RequestContext<Identity> {
    /// Validating stage of an auth-required route. Only reachable with an identity
    /// already resolved.
    pub fn authenticated(
        identity: Identity,
        schema: &RouteSchema,
        input: &RawInput,
    ) -> Result<Self, AppError> {
        Ok(Self {
            identity,
            data: schema.validate(input)?,
        })
    }

    /// Authorizing stage. Must succeed before the handler writes anything.
    pub fn authorize(&self, roles: &RoleDirectory, requirement: Requirement) -> Result<(), AppError> {
        roles.authorize(&self.identity, requirement)
    }
}

/// Responding stage for one record: sanitize, then wrap in `{ "result": .. }`.
pub fn respond<T: Sanitize>(record: &T) -> Json<Envelope<T::Public>> {
    Json(Envelope {
        result: record.sanitize(),
    })
}

/// Responding stage for a list of records.
pub fn respond_all<T: Sanitize>(records: &[T]) -> Json<Envelope<Vec<T::Public>>> {
    Json(Envelope {
        result: records.iter().map(Sanitize::sanitize).collect(),
    })
}
