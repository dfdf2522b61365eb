//! The authenticated caller and its roles.
//!
//! Identity and sessions are provided by an external collaborator; the
//! pipeline only sees the resulting [`Principal`]. Roles are a typed set with
//! explicit membership queries rather than ad-hoc string lists.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{CredentialError, Result};

/// Unique identifier for a learner (the identity provider's subject id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LearnerId(pub String);

impl LearnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for LearnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A platform role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Learner,
    Instructor,
    Admin,
}

impl Role {
    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learner => "learner",
            Self::Instructor => "instructor",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "learner" | "student" => Ok(Self::Learner),
            "instructor" => Ok(Self::Instructor),
            "admin" => Ok(Self::Admin),
            other => Err(CredentialError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

/// The set of roles held by a principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role, returning the updated set.
    pub fn with(mut self, role: Role) -> Self {
        self.0.insert(role);
        self
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.contains(Role::Admin)
    }

    /// Fail with `Forbidden` unless `role` is held.
    pub fn require(&self, role: Role) -> Result<()> {
        if self.contains(role) {
            Ok(())
        } else {
            Err(CredentialError::Forbidden(format!(
                "role '{}' required",
                role.as_str()
            )))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub learner_id: LearnerId,
    pub display_name: Option<String>,
    pub roles: RoleSet,
}

impl Principal {
    /// A principal holding only the learner role.
    pub fn learner(id: impl Into<String>) -> Self {
        Self {
            learner_id: LearnerId::new(id),
            display_name: None,
            roles: RoleSet::new().with(Role::Learner),
        }
    }

    /// A principal holding the admin role.
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            learner_id: LearnerId::new(id),
            display_name: None,
            roles: RoleSet::new().with(Role::Admin),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name shown on certificates, falling back to the learner id.
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.learner_id.0)
    }
}

/// Resolve an optional session into an authenticated principal.
pub fn authenticated(principal: Option<&Principal>) -> Result<&Principal> {
    principal.ok_or(CredentialError::Unauthenticated)
}
