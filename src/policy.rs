//! Role-based access policy.
//!
//! Role names form a closed set, each mapped to the capabilities it grants. The role
//! table is resolved once at startup into a [`RoleDirectory`], so deciding a request
//! is a pure function of the identity, the ownership fact and the capability asked
//! for.

use std::{collections::HashMap, fmt, str::FromStr};

use crate::{
    auth::Identity,
    error::AppError,
    models::Role,
    repository::{RepositoryError, RepositoryState},
};

/// RoleName
///
/// Every role the system knows. Role rows carrying any other name grant nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleName {
    Admin,
    Manager,
    Editor,
}

impl RoleName {
    pub const ALL: [RoleName; 3] = [RoleName::Admin, RoleName::Manager, RoleName::Editor];

    pub fn as_str(self) -> &'static str {
        match self {
            RoleName::Admin => "admin",
            RoleName::Manager => "manager",
            RoleName::Editor => "editor",
        }
    }

    pub fn grants(self, capability: Capability) -> bool {
        capability.allowed_roles().contains(&self)
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl FromStr for RoleName {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleName::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Capability
///
/// What an operation needs. Each capability is granted to a fixed set of roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Create, update and delete pages and navigation menus.
    ManageContent,
    /// List users and read users other than oneself.
    ViewUsers,
    /// Update and delete users other than oneself.
    ManageUsers,
}

impl Capability {
    pub fn allowed_roles(self) -> &'static [RoleName] {
        match self {
            Capability::ManageContent => &[RoleName::Admin, RoleName::Manager],
            Capability::ViewUsers => &[RoleName::Admin, RoleName::Manager],
            Capability::ManageUsers => &[RoleName::Admin],
        }
    }
}

/// Requirement
///
/// The access rule a route attaches to an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// The identity's role must grant the capability.
    Role(Capability),
    /// The identity owns the target (`owner_id`), or its role grants the capability.
    SelfOrRole { owner_id: i32, capability: Capability },
}

impl Requirement {
    pub fn role(capability: Capability) -> Self {
        Requirement::Role(capability)
    }

    pub fn self_or(owner_id: i32, capability: Capability) -> Self {
        Requirement::SelfOrRole {
            owner_id,
            capability,
        }
    }
}

/// evaluate
///
/// Allow/deny for one identity. `role` is `None` when the identity's role id is not
/// a known role; such identities are only ever allowed through ownership.
pub fn evaluate(identity: &Identity, role: Option<RoleName>, requirement: Requirement) -> bool {
    let role_grants = |capability: Capability| role.is_some_and(|role| role.grants(capability));

    match requirement {
        Requirement::Role(capability) => role_grants(capability),
        Requirement::SelfOrRole {
            owner_id,
            capability,
        } => identity.id == owner_id || role_grants(capability),
    }
}

/// RoleDirectory
///
/// `role id → RoleName`, read from the role table once at startup and shared
/// read-only across requests.
#[derive(Debug, Clone, Default)]
pub struct RoleDirectory {
    by_id: HashMap<i32, RoleName>,
}

impl RoleDirectory {
    /// Builds the directory from role rows. Rows with unknown names are skipped.
    pub fn from_roles(roles: &[Role]) -> Self {
        let mut by_id = HashMap::new();

        for role in roles {
            match role.name.parse::<RoleName>() {
                Ok(name) => {
                    by_id.insert(role.id, name);
                }
                Err(UnknownRole(name)) => {
                    tracing::warn!(role_id = role.id, %name, "ignoring role with unknown name");
                }
            }
        }

        Self { by_id }
    }

    /// load
    ///
    /// Reads the role table through the persistence collaborator.
    pub async fn load(repo: &RepositoryState) -> Result<Self, RepositoryError> {
        let roles = repo.list_roles().await?;
        let directory = Self::from_roles(&roles);
        tracing::info!(roles = directory.by_id.len(), "role directory loaded");
        Ok(directory)
    }

    pub fn role_of(&self, role_id: i32) -> Option<RoleName> {
        self.by_id.get(&role_id).copied()
    }

    pub fn allows(&self, identity: &Identity, requirement: Requirement) -> bool {
        evaluate(identity, self.role_of(identity.role_id), requirement)
    }

    /// authorize
    ///
    /// `Ok(())` on allow, `InvalidAccessError` on deny.
    pub fn authorize(&self, identity: &Identity, requirement: Requirement) -> Result<(), AppError> {
        if self.allows(identity, requirement) {
            tracing::debug!(user_id = identity.id, ?requirement, "access granted");
            Ok(())
        } else {
            tracing::warn!(
                user_id = identity.id,
                role_id = identity.role_id,
                ?requirement,
                "access denied"
            );
            Err(AppError::InvalidAccess)
        }
    }
}
