//! Declarative request validation.
//!
//! A route declares a [`RouteSchema`] once; every request is checked against it
//! before the handler body runs. Unknown fields are dropped, every failing field is
//! reported in a single `ValidationError`, and the normalized [`Validated`] data is
//! the only request input a handler ever reads.

use axum::{
    body::Bytes,
    extract::{
        FromRequest, FromRequestParts, Query, RawPathParams, Request,
        rejection::RawPathParamsRejection,
    },
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};

use crate::error::AppError;

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;
pub const DEFAULT_OFFSET: i64 = 0;
pub const MAX_OFFSET: i64 = i32::MAX as i64;

const MAX_TEXT_LEN: usize = 255;

/// Where a field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Query,
    Params,
    Body,
}

impl Location {
    pub fn as_str(self) -> &'static str {
        match self {
            Location::Query => "query",
            Location::Params => "params",
            Location::Body => "body",
        }
    }

    // Query and path values only ever arrive as text.
    fn is_textual(self) -> bool {
        !matches!(self, Location::Body)
    }
}

/// The shape a field value must have.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Database identifier: an integer in `1..=i32::MAX`.
    Id,
    Integer { min: i64, max: i64 },
    /// Trimmed string whose length in characters lies in `min_len..=max_len`.
    Text { min_len: usize, max_len: usize },
    Email,
    /// Lowercase ASCII letters and digits separated by single hyphens.
    Slug,
    OneOf(&'static [&'static str]),
}

/// FieldRule
///
/// Presence, nullability, default and shape of one declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub kind: FieldKind,
    pub required: bool,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl FieldRule {
    fn of(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            nullable: false,
            default: None,
        }
    }

    pub fn id() -> Self {
        Self::of(FieldKind::Id)
    }

    pub fn integer(min: i64, max: i64) -> Self {
        Self::of(FieldKind::Integer { min, max })
    }

    pub fn text(min_len: usize, max_len: usize) -> Self {
        Self::of(FieldKind::Text { min_len, max_len })
    }

    /// A person's or menu's name.
    pub fn name() -> Self {
        Self::text(1, MAX_TEXT_LEN)
    }

    pub fn email() -> Self {
        Self::of(FieldKind::Email)
    }

    pub fn slug() -> Self {
        Self::of(FieldKind::Slug)
    }

    pub fn one_of(values: &'static [&'static str]) -> Self {
        Self::of(FieldKind::OneOf(values))
    }

    /// Page size: `0..=MAX_LIMIT`, `DEFAULT_LIMIT` when absent.
    pub fn limit() -> Self {
        Self::integer(0, MAX_LIMIT).with_default(json!(DEFAULT_LIMIT))
    }

    /// Page start: `0..=MAX_OFFSET`, `DEFAULT_OFFSET` when absent.
    pub fn offset() -> Self {
        Self::integer(0, MAX_OFFSET).with_default(json!(DEFAULT_OFFSET))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Checks a present, non-null value. Returns the normalized value or the reason
    /// it was rejected.
    fn check(&self, value: &Value, textual: bool) -> Result<Value, String> {
        match &self.kind {
            FieldKind::Id => integer_of(value, textual)
                .filter(|id| (1..=i64::from(i32::MAX)).contains(id))
                .map(Value::from)
                .ok_or_else(|| "must be a positive integer id".to_string()),
            FieldKind::Integer { min, max } => integer_of(value, textual)
                .filter(|n| (*min..=*max).contains(n))
                .map(Value::from)
                .ok_or_else(|| format!("must be an integer between {min} and {max}")),
            FieldKind::Text { min_len, max_len } => value
                .as_str()
                .map(str::trim)
                .filter(|text| (*min_len..=*max_len).contains(&text.chars().count()))
                .map(Value::from)
                .ok_or_else(|| format!("must be a string of {min_len} to {max_len} characters")),
            FieldKind::Email => value
                .as_str()
                .map(str::trim)
                .filter(|text| is_email(text))
                .map(Value::from)
                .ok_or_else(|| "must be a valid email address".to_string()),
            FieldKind::Slug => value
                .as_str()
                .filter(|text| is_slug(text))
                .map(Value::from)
                .ok_or_else(|| {
                    "must be a slug of lowercase letters, digits and single hyphens".to_string()
                }),
            FieldKind::OneOf(allowed) => value
                .as_str()
                .filter(|text| allowed.contains(text))
                .map(Value::from)
                .ok_or_else(|| format!("must be one of: {}", allowed.join(", "))),
        }
    }
}

fn integer_of(value: &Value, textual: bool) -> Option<i64> {
    match value {
        Value::String(text) if textual => text.trim().parse::<i64>().ok(),
        Value::Number(number) if !textual => number.as_i64(),
        _ => None,
    }
}

fn is_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };

    text.len() <= MAX_TEXT_LEN
        && !local.is_empty()
        && !text.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

fn is_slug(text: &str) -> bool {
    !text.is_empty()
        && text.len() <= MAX_TEXT_LEN
        && text.split('-').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}

/// RouteSchema
///
/// Expected fields of one route, per location, in declaration order. Built once
/// (routes keep theirs in a `LazyLock`) and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteSchema {
    query: Vec<(&'static str, FieldRule)>,
    params: Vec<(&'static str, FieldRule)>,
    body: Vec<(&'static str, FieldRule)>,
}

impl RouteSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// `limit` and `offset` query parameters with their defaults.
    pub fn paginated() -> Self {
        Self::new()
            .query("limit", FieldRule::limit())
            .query("offset", FieldRule::offset())
    }

    pub fn query(mut self, name: &'static str, rule: FieldRule) -> Self {
        self.query.push((name, rule));
        self
    }

    pub fn param(mut self, name: &'static str, rule: FieldRule) -> Self {
        self.params.push((name, rule));
        self
    }

    pub fn body(mut self, name: &'static str, rule: FieldRule) -> Self {
        self.body.push((name, rule));
        self
    }

    /// validate
    ///
    /// Applies every rule to the raw input. Pure: the same input always yields the
    /// same normalized data or the same error list.
    pub fn validate(&self, input: &RawInput) -> Result<Validated, AppError> {
        let mut errors = Vec::new();

        let query = validate_location(Location::Query, &self.query, &input.query, &mut errors);
        let params = validate_location(Location::Params, &self.params, &input.params, &mut errors);

        let empty = Map::new();
        let raw_body = match &input.body {
            RawBody::Object(map) => map,
            RawBody::Malformed => {
                if !self.body.is_empty() {
                    errors.push("body must be a JSON object".to_string());
                }
                &empty
            }
        };
        let body = validate_location(Location::Body, &self.body, raw_body, &mut errors);

        if errors.is_empty() {
            Ok(Validated {
                query,
                params,
                body,
            })
        } else {
            tracing::debug!(?errors, "request failed validation");
            Err(AppError::validation(errors))
        }
    }
}

fn validate_location(
    location: Location,
    rules: &[(&'static str, FieldRule)],
    raw: &Map<String, Value>,
    errors: &mut Vec<String>,
) -> Map<String, Value> {
    let mut normalized = Map::new();

    for (name, rule) in rules {
        let path = format!("{}.{}", location.as_str(), name);

        match raw.get(*name) {
            None => match &rule.default {
                Some(default) => {
                    normalized.insert((*name).to_string(), default.clone());
                }
                None if rule.required => errors.push(format!("{path} is required")),
                None => {}
            },
            Some(Value::Null) if rule.nullable => {
                normalized.insert((*name).to_string(), Value::Null);
            }
            Some(Value::Null) if rule.required => errors.push(format!("{path} is required")),
            Some(Value::Null) => errors.push(format!("{path} cannot be null")),
            Some(value) => match rule.check(value, location.is_textual()) {
                Ok(clean) => {
                    normalized.insert((*name).to_string(), clean);
                }
                Err(reason) => errors.push(format!("{path} {reason}")),
            },
        }
    }

    normalized
}

/// The request body as received, before any rule is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBody {
    Object(Map<String, Value>),
    /// Not JSON, or JSON that is not an object.
    Malformed,
}

impl Default for RawBody {
    fn default() -> Self {
        RawBody::Object(Map::new())
    }
}

/// RawInput
///
/// Unvalidated query, path and body values. Handlers never read it directly; it is
/// handed to [`RouteSchema::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawInput {
    pub query: Map<String, Value>,
    pub params: Map<String, Value>,
    pub body: RawBody,
}

impl RawInput {
    pub fn from_parts(
        query: Vec<(String, String)>,
        params: Vec<(String, String)>,
        body: &[u8],
    ) -> Self {
        Self {
            query: text_map(query),
            params: text_map(params),
            body: parse_body(body),
        }
    }

    /// Input made only of a JSON body, as used by tests and internal callers.
    pub fn with_body(body: Value) -> Self {
        Self {
            body: match body {
                Value::Object(map) => RawBody::Object(map),
                _ => RawBody::Malformed,
            },
            ..Self::default()
        }
    }
}

// The first occurrence of a repeated key wins.
fn text_map(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.entry(key).or_insert(Value::String(value));
    }
    map
}

fn parse_body(bytes: &[u8]) -> RawBody {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return RawBody::default();
    }

    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => RawBody::Object(map),
        _ => RawBody::Malformed,
    }
}

impl<S> FromRequest<S> for RawInput
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();

        let Query(query) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map_err(|rejection| {
                AppError::validation(vec![format!(
                    "query string is malformed: {}",
                    rejection.body_text()
                )])
            })?;

        let params = match RawPathParams::from_request_parts(&mut parts, state).await {
            Ok(params) => params
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            Err(RawPathParamsRejection::MissingPathParams(_)) => Vec::new(),
            Err(rejection) => {
                return Err(AppError::validation(vec![format!(
                    "path parameters are malformed: {}",
                    rejection.body_text()
                )]));
            }
        };

        let bytes = Bytes::from_request(Request::from_parts(parts, body), state)
            .await
            .map_err(|rejection| {
                AppError::validation(vec![format!(
                    "body could not be read: {}",
                    rejection.body_text()
                )])
            })?;

        Ok(RawInput::from_parts(query, params, &bytes))
    }
}

/// Validated
///
/// Normalized request data: only declared fields, defaults filled in, integers
/// coerced. Typed views are obtained by deserializing a location into a struct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validated {
    pub query: Map<String, Value>,
    pub params: Map<String, Value>,
    pub body: Map<String, Value>,
}

impl Validated {
    pub fn query<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        decode(Location::Query, &self.query)
    }

    pub fn params<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        decode(Location::Params, &self.params)
    }

    pub fn body<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        decode(Location::Body, &self.body)
    }
}

// A mismatch here means a route's schema and its input type disagree: a bug, not a
// client error.
fn decode<T: DeserializeOwned>(location: Location, map: &Map<String, Value>) -> Result<T, AppError> {
    serde_json::from_value(Value::Object(map.clone())).map_err(|err| {
        AppError::unexpected(format!(
            "validated {} does not match its declared shape: {err}",
            location.as_str()
        ))
    })
}

/// Pagination
///
/// Typed view of [`RouteSchema::paginated`] query data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}
