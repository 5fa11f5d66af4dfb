//! Relational store abstraction.
//!
//! Users, workspaces, membership and task stubs. Workspaces are identified by
//! their numeric id and users by their Firebase uid; the internal numeric user
//! id only surfaces where stubs reference it.

use async_trait::async_trait;
use colmeia_core::{
    MemberRole, StoreResult, TaskStub, UserRecord, UserWorkspace, Workspace, WorkspaceMember,
};

/// Description given to a user's private workspace.
pub const PRIVATE_WORKSPACE_DESCRIPTION: &str = "Personal workspace";

#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Cheap connectivity check used by readiness checks.
    async fn ping(&self) -> StoreResult<()>;

    // ========================================================================
    // USERS
    // ========================================================================

    async fn user_get(&self, uid: &str) -> StoreResult<Option<UserRecord>>;

    async fn user_get_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;

    async fn user_list(&self) -> StoreResult<Vec<UserRecord>>;

    /// Insert a user row. Fails with `AlreadyExists` on a duplicate uid or email.
    async fn user_insert(&self, uid: &str, email: &str, display_name: &str)
        -> StoreResult<UserRecord>;

    /// Insert the user row unless it already exists. Returns `true` when created.
    async fn user_ensure(&self, uid: &str, email: &str, display_name: &str) -> StoreResult<bool>;

    /// Returns `false` when no row matched.
    async fn user_update_display_name(&self, uid: &str, display_name: &str) -> StoreResult<bool>;

    /// Returns `false` when no row matched.
    async fn user_delete(&self, uid: &str) -> StoreResult<bool>;

    async fn user_internal_id(&self, uid: &str) -> StoreResult<Option<i64>>;

    // ========================================================================
    // WORKSPACES
    // ========================================================================

    /// Create a public workspace and make the owner its `admin`, atomically.
    async fn workspace_create_public(
        &self,
        owner_uid: &str,
        name: &str,
        description: &str,
    ) -> StoreResult<Workspace>;

    /// Create the owner's private workspace.
    ///
    /// Fails with `AlreadyExists` when the owner already has one.
    async fn workspace_create_private(&self, owner_uid: &str) -> StoreResult<Workspace>;

    async fn workspace_get(&self, id: i64) -> StoreResult<Option<Workspace>>;

    /// Returns `false` when no row matched.
    async fn workspace_update(&self, id: i64, name: &str, description: &str) -> StoreResult<bool>;

    /// Delete a workspace owned by `owner_uid`. Returns `false` when no such row.
    async fn workspace_delete_owned(&self, id: i64, owner_uid: &str) -> StoreResult<bool>;

    /// Workspaces the user belongs to, ordered by name.
    async fn workspace_list_for_user(&self, uid: &str) -> StoreResult<Vec<UserWorkspace>>;

    async fn workspace_owned_count(&self, uid: &str) -> StoreResult<i64>;

    /// Workspace ids greater than `after`, ascending.
    async fn workspace_ids_page(&self, after: i64, limit: i64) -> StoreResult<Vec<i64>>;

    // ========================================================================
    // MEMBERS
    // ========================================================================

    async fn member_is(&self, uid: &str, workspace_id: i64) -> StoreResult<bool>;

    async fn member_list(&self, workspace_id: i64) -> StoreResult<Vec<WorkspaceMember>>;

    /// Add the user with `email`. Fails with `UserNotFound` or `AlreadyMember`.
    async fn member_add(&self, workspace_id: i64, email: &str, role: MemberRole)
        -> StoreResult<()>;

    /// Returns `false` when the user was not a member.
    async fn member_remove(&self, workspace_id: i64, uid: &str) -> StoreResult<bool>;

    // ========================================================================
    // TASK STUBS
    // ========================================================================

    async fn task_stub_insert(
        &self,
        doc_id: &str,
        workspace_id: i64,
        created_by: i64,
    ) -> StoreResult<()>;

    /// Bump `updated_at`. Returns the number of rows touched.
    async fn task_stub_touch(&self, doc_id: &str, workspace_id: i64) -> StoreResult<u64>;

    /// Returns the number of rows deleted.
    async fn task_stub_delete(&self, doc_id: &str, workspace_id: i64) -> StoreResult<u64>;

    async fn task_stub_list(&self, workspace_id: i64) -> StoreResult<Vec<TaskStub>>;
}
