//! In-memory store implementations.
//!
//! Both stores keep their data behind an `RwLock` and are cheap to clone
//! (clones share state). They are intended for tests and local development,
//! not for production use. Each store can be told to fail the next call of a
//! given operation, which is how dual-write compensation paths get exercised.

use crate::document::{Direction, Document, DocumentStore, Fields, ListQuery, MAX_BATCH_WRITES};
use crate::path::{CollectionPath, DocPath};
use crate::relational::{RelationalStore, PRIVATE_WORKSPACE_DESCRIPTION};
use async_trait::async_trait;
use chrono::Utc;
use colmeia_core::{
    MemberRole, StorageError, StoreResult, TaskStub, Timestamp, UserRecord, UserWorkspace,
    Workspace, WorkspaceMember,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

// ============================================================================
// FAILURE INJECTION
// ============================================================================

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    DocGet,
    DocSet,
    DocAdd,
    DocUpdate,
    DocDelete,
    DocList,
    DocDeleteMany,
    UserInsert,
    UserDelete,
    WorkspaceCreate,
    WorkspaceDelete,
    MemberAdd,
    TaskStubInsert,
    TaskStubTouch,
    TaskStubDelete,
}

/// Pending injected failures, counted per operation.
#[derive(Debug, Clone, Default)]
struct FailPoints {
    pending: Arc<RwLock<HashMap<FailPoint, u32>>>,
}

impl FailPoints {
    fn arm(&self, point: FailPoint, times: u32) -> StoreResult<()> {
        let mut pending = self
            .pending
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        *pending.entry(point).or_insert(0) += times;
        Ok(())
    }

    /// Consume one pending failure for `point`, if any.
    fn take(&self, point: FailPoint) -> StoreResult<bool> {
        let mut pending = self
            .pending
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        match pending.get_mut(&point) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn injected(point: FailPoint, document: bool) -> StorageError {
    let reason = format!("injected failure at {:?}", point);
    if document {
        StorageError::document(reason)
    } else {
        StorageError::relational(reason)
    }
}

// ============================================================================
// DOCUMENT STORE
// ============================================================================

/// In-memory [`DocumentStore`], keyed by full document path.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    docs: Arc<RwLock<BTreeMap<DocPath, Fields>>>,
    failures: FailPoints,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `point` fail.
    pub fn fail_next(&self, point: FailPoint) {
        self.fail_times(point, 1);
    }

    /// Make the next `times` calls of `point` fail.
    pub fn fail_times(&self, point: FailPoint, times: u32) {
        // A poisoned lock only happens after a panic in another test thread.
        let _ = self.failures.arm(point, times);
    }

    /// Number of documents stored, across all collections.
    pub fn len(&self) -> usize {
        self.docs.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a document exists at `path`.
    pub fn contains(&self, path: &DocPath) -> bool {
        self.docs
            .read()
            .map(|docs| docs.contains_key(path))
            .unwrap_or(false)
    }

    fn check(&self, point: FailPoint) -> StoreResult<()> {
        if self.failures.take(point)? {
            return Err(injected(point, true));
        }
        Ok(())
    }
}

fn compare_field(a: &Fields, b: &Fields, field: &str) -> Ordering {
    match (a.get(field), b.get(field)) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        self.check(FailPoint::DocGet)?;
        let docs = self.docs.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(docs
            .get(path)
            .map(|fields| Document::new(path.id(), fields.clone())))
    }

    async fn set(&self, path: &DocPath, fields: Fields) -> StoreResult<()> {
        self.check(FailPoint::DocSet)?;
        let mut docs = self.docs.write().map_err(|_| StorageError::LockPoisoned)?;
        docs.insert(path.clone(), fields);
        Ok(())
    }

    async fn add(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<String> {
        self.check(FailPoint::DocAdd)?;
        let id = Uuid::new_v4().simple().to_string();
        let path = collection.doc(&id)?;
        let mut docs = self.docs.write().map_err(|_| StorageError::LockPoisoned)?;
        docs.insert(path, fields);
        Ok(id)
    }

    async fn update(&self, path: &DocPath, fields: Fields) -> StoreResult<()> {
        self.check(FailPoint::DocUpdate)?;
        let mut docs = self.docs.write().map_err(|_| StorageError::LockPoisoned)?;
        let existing = docs
            .get_mut(path)
            .ok_or_else(|| StorageError::not_found("Document", path))?;
        existing.extend(fields);
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<()> {
        self.check(FailPoint::DocDelete)?;
        let mut docs = self.docs.write().map_err(|_| StorageError::LockPoisoned)?;
        docs.remove(path);
        Ok(())
    }

    async fn list(
        &self,
        collection: &CollectionPath,
        query: ListQuery,
    ) -> StoreResult<Vec<Document>> {
        self.check(FailPoint::DocList)?;
        let docs = self.docs.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut found: Vec<Document> = docs
            .iter()
            .filter(|(path, _)| &path.parent() == collection)
            .map(|(path, fields)| Document::new(path.id(), fields.clone()))
            .collect();
        if let Some((field, direction)) = &query.order_by {
            // An ordered query only sees documents that have the field.
            found.retain(|doc| doc.fields.contains_key(field.as_str()));
            found.sort_by(|a, b| {
                let ord = compare_field(&a.fields, &b.fields, field);
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn delete_many(&self, paths: &[DocPath]) -> StoreResult<()> {
        if paths.len() > MAX_BATCH_WRITES {
            return Err(StorageError::BatchTooLarge {
                size: paths.len(),
                limit: MAX_BATCH_WRITES,
            });
        }
        self.check(FailPoint::DocDeleteMany)?;
        let mut docs = self.docs.write().map_err(|_| StorageError::LockPoisoned)?;
        for path in paths {
            docs.remove(path);
        }
        Ok(())
    }
}

// ============================================================================
// RELATIONAL STORE
// ============================================================================

#[derive(Debug, Clone)]
struct WorkspaceRow {
    id: i64,
    name: String,
    description: String,
    is_public: bool,
    owner_uid: String,
    created_at: Timestamp,
}

#[derive(Debug, Clone)]
struct MemberRow {
    workspace_id: i64,
    user_id: i64,
    role: MemberRole,
    joined_at: Timestamp,
}

#[derive(Debug, Default)]
struct RelationalData {
    next_user_id: i64,
    next_workspace_id: i64,
    users: BTreeMap<i64, UserRecord>,
    workspaces: BTreeMap<i64, WorkspaceRow>,
    members: Vec<MemberRow>,
    stubs: Vec<TaskStub>,
}

impl RelationalData {
    fn user_by_uid(&self, uid: &str) -> Option<&UserRecord> {
        self.users.values().find(|u| u.firebase_uid == uid)
    }

    fn user_by_email(&self, email: &str) -> Option<&UserRecord> {
        self.users.values().find(|u| u.email == email)
    }

    fn member_count(&self, workspace_id: i64) -> i64 {
        self.members
            .iter()
            .filter(|m| m.workspace_id == workspace_id)
            .count() as i64
    }

    fn to_workspace(&self, row: &WorkspaceRow) -> Workspace {
        Workspace {
            id: row.id,
            name: row.name.clone(),
            description: row.description.clone(),
            is_public: row.is_public,
            owner_uid: row.owner_uid.clone(),
            created_at: row.created_at,
            members: self.member_count(row.id),
        }
    }

    fn insert_user(&mut self, uid: &str, email: &str, display_name: &str) -> StoreResult<UserRecord> {
        if self.user_by_uid(uid).is_some() {
            return Err(StorageError::AlreadyExists {
                entity: "User",
                reason: format!("uid {} is taken", uid),
            });
        }
        if self.user_by_email(email).is_some() {
            return Err(StorageError::AlreadyExists {
                entity: "User",
                reason: format!("email {} is taken", email),
            });
        }
        self.next_user_id += 1;
        let user = UserRecord {
            id: self.next_user_id,
            firebase_uid: uid.to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
        };
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn insert_workspace(
        &mut self,
        owner_uid: &str,
        name: &str,
        description: &str,
        is_public: bool,
    ) -> StoreResult<WorkspaceRow> {
        let owner_id = self
            .user_by_uid(owner_uid)
            .map(|u| u.id)
            .ok_or_else(|| StorageError::relational(format!("owner {} has no user row", owner_uid)))?;
        self.next_workspace_id += 1;
        let now = Utc::now();
        let row = WorkspaceRow {
            id: self.next_workspace_id,
            name: name.to_string(),
            description: description.to_string(),
            is_public,
            owner_uid: owner_uid.to_string(),
            created_at: now,
        };
        self.workspaces.insert(row.id, row.clone());
        self.members.push(MemberRow {
            workspace_id: row.id,
            user_id: owner_id,
            role: MemberRole::Admin,
            joined_at: now,
        });
        Ok(row)
    }

    fn delete_workspace(&mut self, id: i64) {
        self.workspaces.remove(&id);
        self.members.retain(|m| m.workspace_id != id);
        self.stubs.retain(|s| s.workspace_id != id);
    }
}

/// In-memory [`RelationalStore`] mirroring the SQL schema's constraints and
/// cascades.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRelationalStore {
    data: Arc<RwLock<RelationalData>>,
    failures: FailPoints,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `point` fail.
    pub fn fail_next(&self, point: FailPoint) {
        self.fail_times(point, 1);
    }

    /// Make the next `times` calls of `point` fail.
    pub fn fail_times(&self, point: FailPoint, times: u32) {
        let _ = self.failures.arm(point, times);
    }

    /// Number of task stubs, across all workspaces.
    pub fn task_stub_count(&self) -> usize {
        self.data.read().map(|d| d.stubs.len()).unwrap_or(0)
    }

    fn check(&self, point: FailPoint) -> StoreResult<()> {
        if self.failures.take(point)? {
            return Err(injected(point, false));
        }
        Ok(())
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn ping(&self) -> StoreResult<()> {
        self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(())
    }

    async fn user_get(&self, uid: &str) -> StoreResult<Option<UserRecord>> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data.user_by_uid(uid).cloned())
    }

    async fn user_get_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data.user_by_email(email).cloned())
    }

    async fn user_list(&self) -> StoreResult<Vec<UserRecord>> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut users: Vec<UserRecord> = data.users.values().cloned().collect();
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(users)
    }

    async fn user_insert(
        &self,
        uid: &str,
        email: &str,
        display_name: &str,
    ) -> StoreResult<UserRecord> {
        self.check(FailPoint::UserInsert)?;
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        data.insert_user(uid, email, display_name)
    }

    async fn user_ensure(&self, uid: &str, email: &str, display_name: &str) -> StoreResult<bool> {
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        if data.user_by_uid(uid).is_some() {
            return Ok(false);
        }
        data.insert_user(uid, email, display_name)?;
        Ok(true)
    }

    async fn user_update_display_name(&self, uid: &str, display_name: &str) -> StoreResult<bool> {
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        match data.users.values_mut().find(|u| u.firebase_uid == uid) {
            Some(user) => {
                user.display_name = display_name.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn user_delete(&self, uid: &str) -> StoreResult<bool> {
        self.check(FailPoint::UserDelete)?;
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(id) = data.user_by_uid(uid).map(|u| u.id) else {
            return Ok(false);
        };
        if data.workspaces.values().any(|w| w.owner_uid == uid) {
            return Err(StorageError::relational(format!(
                "user {} still owns workspaces",
                uid
            )));
        }
        data.users.remove(&id);
        data.members.retain(|m| m.user_id != id);
        for stub in data.stubs.iter_mut().filter(|s| s.created_by == Some(id)) {
            stub.created_by = None;
        }
        Ok(true)
    }

    async fn user_internal_id(&self, uid: &str) -> StoreResult<Option<i64>> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data.user_by_uid(uid).map(|u| u.id))
    }

    async fn workspace_create_public(
        &self,
        owner_uid: &str,
        name: &str,
        description: &str,
    ) -> StoreResult<Workspace> {
        self.check(FailPoint::WorkspaceCreate)?;
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        let row = data.insert_workspace(owner_uid, name, description, true)?;
        Ok(data.to_workspace(&row))
    }

    async fn workspace_create_private(&self, owner_uid: &str) -> StoreResult<Workspace> {
        self.check(FailPoint::WorkspaceCreate)?;
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        if data
            .workspaces
            .values()
            .any(|w| !w.is_public && w.owner_uid == owner_uid)
        {
            return Err(StorageError::AlreadyExists {
                entity: "Workspace",
                reason: format!("{} already has a private workspace", owner_uid),
            });
        }
        let row =
            data.insert_workspace(owner_uid, owner_uid, PRIVATE_WORKSPACE_DESCRIPTION, false)?;
        Ok(data.to_workspace(&row))
    }

    async fn workspace_get(&self, id: i64) -> StoreResult<Option<Workspace>> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data.workspaces.get(&id).map(|row| data.to_workspace(row)))
    }

    async fn workspace_update(&self, id: i64, name: &str, description: &str) -> StoreResult<bool> {
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        match data.workspaces.get_mut(&id) {
            Some(row) => {
                row.name = name.to_string();
                row.description = description.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn workspace_delete_owned(&self, id: i64, owner_uid: &str) -> StoreResult<bool> {
        self.check(FailPoint::WorkspaceDelete)?;
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        let owned = data
            .workspaces
            .get(&id)
            .map(|row| row.owner_uid == owner_uid)
            .unwrap_or(false);
        if owned {
            data.delete_workspace(id);
        }
        Ok(owned)
    }

    async fn workspace_list_for_user(&self, uid: &str) -> StoreResult<Vec<UserWorkspace>> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        let Some(user_id) = data.user_by_uid(uid).map(|u| u.id) else {
            return Ok(Vec::new());
        };
        let mut list: Vec<UserWorkspace> = data
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                data.workspaces.get(&m.workspace_id).map(|w| UserWorkspace {
                    id: w.id,
                    name: w.name.clone(),
                    user_role: m.role,
                    is_owner: w.owner_uid == uid,
                })
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn workspace_owned_count(&self, uid: &str) -> StoreResult<i64> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data
            .workspaces
            .values()
            .filter(|w| w.owner_uid == uid)
            .count() as i64)
    }

    async fn workspace_ids_page(&self, after: i64, limit: i64) -> StoreResult<Vec<i64>> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data
            .workspaces
            .range(after.saturating_add(1)..)
            .map(|(id, _)| *id)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn member_is(&self, uid: &str, workspace_id: i64) -> StoreResult<bool> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        let Some(user_id) = data.user_by_uid(uid).map(|u| u.id) else {
            return Ok(false);
        };
        Ok(data
            .members
            .iter()
            .any(|m| m.workspace_id == workspace_id && m.user_id == user_id))
    }

    async fn member_list(&self, workspace_id: i64) -> StoreResult<Vec<WorkspaceMember>> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut list: Vec<WorkspaceMember> = data
            .members
            .iter()
            .filter(|m| m.workspace_id == workspace_id)
            .filter_map(|m| {
                data.users.get(&m.user_id).map(|u| WorkspaceMember {
                    user_id: u.firebase_uid.clone(),
                    display_name: u.display_name.clone(),
                    email: u.email.clone(),
                    role: m.role,
                    joined_at: m.joined_at,
                })
            })
            .collect();
        list.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(list)
    }

    async fn member_add(
        &self,
        workspace_id: i64,
        email: &str,
        role: MemberRole,
    ) -> StoreResult<()> {
        self.check(FailPoint::MemberAdd)?;
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        if !data.workspaces.contains_key(&workspace_id) {
            return Err(StorageError::not_found("Workspace", workspace_id));
        }
        let user_id = data
            .user_by_email(email)
            .map(|u| u.id)
            .ok_or_else(|| StorageError::UserNotFound {
                email: email.to_string(),
            })?;
        if data
            .members
            .iter()
            .any(|m| m.workspace_id == workspace_id && m.user_id == user_id)
        {
            return Err(StorageError::AlreadyMember {
                email: email.to_string(),
                workspace_id,
            });
        }
        data.members.push(MemberRow {
            workspace_id,
            user_id,
            role,
            joined_at: Utc::now(),
        });
        Ok(())
    }

    async fn member_remove(&self, workspace_id: i64, uid: &str) -> StoreResult<bool> {
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(user_id) = data.user_by_uid(uid).map(|u| u.id) else {
            return Ok(false);
        };
        let before = data.members.len();
        data.members
            .retain(|m| !(m.workspace_id == workspace_id && m.user_id == user_id));
        Ok(data.members.len() < before)
    }

    async fn task_stub_insert(
        &self,
        doc_id: &str,
        workspace_id: i64,
        created_by: i64,
    ) -> StoreResult<()> {
        self.check(FailPoint::TaskStubInsert)?;
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        if !data.workspaces.contains_key(&workspace_id) {
            return Err(StorageError::relational(format!(
                "workspace {} does not exist",
                workspace_id
            )));
        }
        if data.stubs.iter().any(|s| s.firestore_doc_id == doc_id) {
            return Err(StorageError::AlreadyExists {
                entity: "Task",
                reason: format!("stub {} exists", doc_id),
            });
        }
        let now = Utc::now();
        data.stubs.push(TaskStub {
            firestore_doc_id: doc_id.to_string(),
            workspace_id,
            created_by: Some(created_by),
            created_at: now,
            updated_at: now,
        });
        Ok(())
    }

    async fn task_stub_touch(&self, doc_id: &str, workspace_id: i64) -> StoreResult<u64> {
        self.check(FailPoint::TaskStubTouch)?;
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        let now = Utc::now();
        let mut touched = 0;
        for stub in data
            .stubs
            .iter_mut()
            .filter(|s| s.firestore_doc_id == doc_id && s.workspace_id == workspace_id)
        {
            stub.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    async fn task_stub_delete(&self, doc_id: &str, workspace_id: i64) -> StoreResult<u64> {
        self.check(FailPoint::TaskStubDelete)?;
        let mut data = self.data.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = data.stubs.len();
        data.stubs
            .retain(|s| !(s.firestore_doc_id == doc_id && s.workspace_id == workspace_id));
        Ok((before - data.stubs.len()) as u64)
    }

    async fn task_stub_list(&self, workspace_id: i64) -> StoreResult<Vec<TaskStub>> {
        let data = self.data.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(data
            .stubs
            .iter()
            .filter(|s| s.workspace_id == workspace_id)
            .cloned()
            .collect())
    }
}
