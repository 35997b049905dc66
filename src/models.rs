use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Core Application Schemas (Mapped to Database) ---

/// Role
///
/// Reference data from the `role` table. Only the name matters to the access policy;
/// `permissions` is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, Default)]
pub struct Role {
    pub id: i32,
    pub name: String,
    pub permissions: String,
}

/// User
///
/// A row of the `users` table. Never serialized to clients as-is: see [`PublicUser`].
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Default)]
pub struct User {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role_id: i32,
}

/// Page
///
/// A row of the `page` table. `creator` is the id of the user who created it.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Page {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub creator: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// NavMenu
///
/// A row of the `nav_menu` table. `hierarchy` is an opaque, optional description of
/// the menu tree.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Default)]
pub struct NavMenu {
    pub id: i32,
    pub name: String,
    pub hierarchy: Option<String>,
}

/// Allowed values of `Page::status`.
pub const PAGE_STATUSES: &[&str] = &["draft", "published"];

/// Status given to pages created without one.
pub const DEFAULT_PAGE_STATUS: &str = "draft";

// --- Partial updates ---

/// Patch
///
/// One field of a partial update. `Absent` leaves the stored value alone, `Value`
/// replaces it and `Null` clears it. Non-nullable columns never see `Null`: their
/// validation rule rejects it first.
///
/// Fields of this type must carry `#[serde(default)]` so that a missing key
/// deserializes to `Absent` while an explicit `null` becomes `Null`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Absent,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Patch::Value(value) => Some(value),
            Patch::Absent | Patch::Null => None,
        }
    }

    /// Applies to a non-nullable column: only `Value` changes it.
    pub fn apply(self, target: &mut T) {
        if let Patch::Value(value) = self {
            *target = value;
        }
    }

    /// Applies to a nullable column.
    pub fn apply_nullable(self, target: &mut Option<T>) {
        match self {
            Patch::Absent => {}
            Patch::Null => *target = None,
            Patch::Value(value) => *target = Some(value),
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(|value| value.map_or(Patch::Null, Patch::Value))
    }
}

// --- Request Payloads (Input Schemas) ---

/// NewUser
///
/// Fields of a user row to insert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role_id: i32,
}

/// UpdateUserRequest
///
/// Partial update of a user profile (PATCH /users/{userId}).
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub first_name: Patch<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub last_name: Patch<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub email: Patch<String>,
}

/// CreatePageRequest
///
/// Input payload for POST /pages. The creator is always the session user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct CreatePageRequest {
    pub title: String,
    pub content: String,
    pub slug: String,
    #[schema(example = "draft")]
    pub status: String,
}

/// NewPage
///
/// Fields of a page row to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPage {
    pub title: String,
    pub content: String,
    pub slug: String,
    pub creator: i32,
    pub status: String,
}

/// UpdatePageRequest
///
/// Partial update of a page (PATCH /pages/{pageId}).
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, ToSchema)]
pub struct UpdatePageRequest {
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub title: Patch<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub content: Patch<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub slug: Patch<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub status: Patch<String>,
}

/// CreateNavMenuRequest
///
/// Input payload for POST /nav.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct CreateNavMenuRequest {
    pub name: String,
    #[serde(default)]
    pub hierarchy: Option<String>,
}

/// UpdateNavMenuRequest
///
/// Partial update of a navigation menu (PATCH /nav/{navId}). `hierarchy: null`
/// clears the stored hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, ToSchema)]
pub struct UpdateNavMenuRequest {
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub name: Patch<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub hierarchy: Patch<String>,
}

// --- Public Payloads (Output Schemas) ---

/// Envelope
///
/// Every successful response body: `{ "result": .. }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Envelope<T> {
    pub result: T,
}

/// PublicUser
///
/// The only user fields ever sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PublicUser {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
}

/// PublicPage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PublicPage {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub status: String,
}

/// PublicNavMenu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PublicNavMenu {
    pub id: i32,
    pub name: String,
    pub hierarchy: Option<String>,
}

/// Sanitize
///
/// Projection of an internal record onto its public allow-list of fields. Runs after
/// the handler, right before the response is built.
pub trait Sanitize {
    type Public: Serialize;

    fn sanitize(&self) -> Self::Public;
}

impl Sanitize for User {
    type Public = PublicUser;

    fn sanitize(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

impl Sanitize for Page {
    type Public = PublicPage;

    fn sanitize(&self) -> PublicPage {
        PublicPage {
            id: self.id,
            title: self.title.clone(),
            content: self.content.clone(),
            slug: self.slug.clone(),
            status: self.status.clone(),
        }
    }
}

impl Sanitize for NavMenu {
    type Public = PublicNavMenu;

    fn sanitize(&self) -> PublicNavMenu {
        PublicNavMenu {
            id: self.id,
            name: self.name.clone(),
            hierarchy: self.hierarchy.clone(),
        }
    }
}
