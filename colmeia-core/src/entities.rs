//! Relational entities: users, workspaces, membership and task stubs.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// USERS
// ============================================================================

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserRecord {
    /// Internal numeric id, used as the foreign key for membership and stubs.
    #[serde(skip)]
    pub id: i64,
    pub firebase_uid: String,
    pub email: String,
    pub display_name: String,
}

// ============================================================================
// WORKSPACES
// ============================================================================

/// A collaboration space with an owner, members and tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Workspace {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_public: bool,
    /// Firebase uid of the owner.
    pub owner_uid: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub created_at: Timestamp,
    /// Number of members, the owner included.
    pub members: i64,
}

impl Workspace {
    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner_uid == uid
    }
}

/// Role of a member inside a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    #[default]
    Member,
}

impl MemberRole {
    /// Parse a requested role, falling back to `Member` for anything unknown.
    pub fn parse_or_member(value: Option<&str>) -> Self {
        value
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(MemberRole::Member)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(MemberRole::Admin),
            "member" => Ok(MemberRole::Member),
            _ => Err(format!("Invalid MemberRole: {}", s)),
        }
    }
}

/// A member as listed for a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkspaceMember {
    /// Firebase uid of the member.
    pub user_id: String,
    pub display_name: String,
    pub email: String,
    pub role: MemberRole,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = DateTime))]
    pub joined_at: Timestamp,
}

/// A workspace the caller belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserWorkspace {
    pub id: i64,
    pub name: String,
    pub user_role: MemberRole,
    pub is_owner: bool,
}

// ============================================================================
// TASK STUBS
// ============================================================================

/// Relational record of a task. The task fields live in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStub {
    pub firestore_doc_id: String,
    pub workspace_id: i64,
    /// Internal id of the creator, cleared when the creator is deleted.
    pub created_by: Option<i64>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
