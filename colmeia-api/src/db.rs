//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and [`PgStore`],
//! the production [`RelationalStore`].
//!
//! Statement errors are classified into [`StorageError`] variants so callers
//! see the same errors as with the in-memory store: unique violations become
//! `AlreadyExists`, a lost connection becomes `Unavailable`.

use crate::constants::{DEFAULT_DB_POOL_MAX_SIZE, DEFAULT_DB_POOL_TIMEOUT_MS};
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use colmeia_core::{
    MemberRole, StorageError, StoreKind, StoreResult, TaskStub, Timestamp, UserRecord,
    UserWorkspace, Workspace, WorkspaceMember,
};
use colmeia_storage::{RelationalStore, PRIVATE_WORKSPACE_DESCRIPTION};
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

/// Schema shipped with the server, applied by [`PgStore::apply_migrations`].
pub const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: SecretString,
    /// Requested SSL mode. Only `disable` is supported.
    pub sslmode: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait, create and recycle timeout for pooled connections
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "colmeia".to_string(),
            user: "postgres".to_string(),
            password: SecretString::from(String::new()),
            sslmode: "disable".to_string(),
            max_size: DEFAULT_DB_POOL_MAX_SIZE,
            timeout: Duration::from_millis(DEFAULT_DB_POOL_TIMEOUT_MS),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// Reads `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`,
    /// `DB_SSLMODE`, `DB_POOL_MAX_SIZE` and `DB_POOL_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("DB_USER").unwrap_or(defaults.user),
            password: std::env::var("DB_PASSWORD")
                .map(SecretString::from)
                .unwrap_or(defaults.password),
            sslmode: std::env::var("DB_SSLMODE").unwrap_or(defaults.sslmode),
            max_size: std::env::var("DB_POOL_MAX_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("DB_POOL_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    ///
    /// Connections are established lazily, so this succeeds even when the
    /// database is down; readiness checks report that case.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        if !self.sslmode.eq_ignore_ascii_case("disable") {
            tracing::warn!(
                sslmode = %self.sslmode,
                "Only sslmode=disable is supported, connecting without TLS"
            );
        }

        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.expose_secret().to_string());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = PoolConfig::new(self.max_size.max(1));
        pool_config.timeouts = Timeouts {
            wait: Some(self.timeout),
            create: Some(self.timeout),
            recycle: Some(self.timeout),
        };
        cfg.pool = Some(pool_config);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// ERROR CLASSIFICATION
// ============================================================================

fn pg_error(entity: &'static str, err: tokio_postgres::Error) -> StorageError {
    if let Some(db) = err.as_db_error() {
        let constraint = db.constraint().unwrap_or("unknown").to_string();
        if db.code() == &SqlState::UNIQUE_VIOLATION {
            return StorageError::AlreadyExists {
                entity,
                reason: constraint,
            };
        }
        if db.code() == &SqlState::FOREIGN_KEY_VIOLATION {
            return StorageError::relational(format!(
                "{} violates foreign key {}",
                entity, constraint
            ));
        }
    }
    if err.is_closed() {
        return StorageError::Unavailable {
            store: StoreKind::Relational,
            reason: err.to_string(),
        };
    }
    tracing::error!(entity, error = ?err, "Database statement failed");
    StorageError::relational(format!("{} statement failed", entity))
}

fn pool_error(err: PoolError) -> StorageError {
    StorageError::Unavailable {
        store: StoreKind::Relational,
        reason: err.to_string(),
    }
}

fn is_foreign_key_violation(err: &tokio_postgres::Error) -> bool {
    err.as_db_error()
        .map(|db| db.code() == &SqlState::FOREIGN_KEY_VIOLATION)
        .unwrap_or(false)
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const USER_COLUMNS: &str = "id, firebase_uid, email, display_name";

const WORKSPACE_COLUMNS: &str = "w.id, w.name, w.description, w.is_public, w.owner_uid, \
     w.created_at, (SELECT COUNT(*) FROM workspace_members m WHERE m.workspace_id = w.id) AS members";

fn user_from_row(row: &Row) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        firebase_uid: row.get("firebase_uid"),
        email: row.get("email"),
        display_name: row.get("display_name"),
    }
}

fn workspace_from_row(row: &Row) -> Workspace {
    Workspace {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        is_public: row.get("is_public"),
        owner_uid: row.get("owner_uid"),
        created_at: row.get("created_at"),
        members: row.get("members"),
    }
}

fn role_from_row(row: &Row, column: &str) -> MemberRole {
    let raw: String = row.get(column);
    MemberRole::parse_or_member(Some(&raw))
}

// ============================================================================
// POSTGRES STORE
// ============================================================================

/// [`RelationalStore`] over a deadpool-postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size, for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Apply the bundled schema. Safe to run repeatedly.
    pub async fn apply_migrations(&self) -> ApiResult<()> {
        let client = self.pool.get().await?;
        client.batch_execute(INIT_SQL).await?;
        tracing::info!("Database schema applied");
        Ok(())
    }

    async fn client(&self) -> StoreResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    async fn create_workspace(
        &self,
        owner_uid: &str,
        name: &str,
        description: &str,
        is_public: bool,
    ) -> StoreResult<Workspace> {
        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| pg_error("Workspace", e))?;

        let owner_id: i64 = tx
            .query_opt("SELECT id FROM users WHERE firebase_uid = $1", &[&owner_uid])
            .await
            .map_err(|e| pg_error("User", e))?
            .map(|row| row.get(0))
            .ok_or_else(|| {
                StorageError::relational(format!("owner {} has no user row", owner_uid))
            })?;

        let row = tx
            .query_one(
                "INSERT INTO workspaces (name, description, is_public, owner_uid) \
                 VALUES ($1, $2, $3, $4) RETURNING id, created_at",
                &[&name, &description, &is_public, &owner_uid],
            )
            .await
            .map_err(|e| pg_error("Workspace", e))?;
        let id: i64 = row.get("id");
        let created_at: Timestamp = row.get("created_at");

        tx.execute(
            "INSERT INTO workspace_members (workspace_id, user_id, role) VALUES ($1, $2, $3)",
            &[&id, &owner_id, &MemberRole::Admin.as_str()],
        )
        .await
        .map_err(|e| pg_error("WorkspaceMember", e))?;

        tx.commit().await.map_err(|e| pg_error("Workspace", e))?;

        Ok(Workspace {
            id,
            name: name.to_string(),
            description: description.to_string(),
            is_public,
            owner_uid: owner_uid.to_string(),
            created_at,
            members: 1,
        })
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PgStore")
            .field("size", &status.size)
            .field("available", &status.available)
            .finish()
    }
}

#[async_trait]
impl RelationalStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        let client = self.client().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| pg_error("Ping", e))?;
        Ok(())
    }

    // ========================================================================
    // USERS
    // ========================================================================

    async fn user_get(&self, uid: &str) -> StoreResult<Option<UserRecord>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM users WHERE firebase_uid = $1", USER_COLUMNS),
                &[&uid],
            )
            .await
            .map_err(|e| pg_error("User", e))?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn user_get_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS),
                &[&email],
            )
            .await
            .map_err(|e| pg_error("User", e))?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn user_list(&self) -> StoreResult<Vec<UserRecord>> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!("SELECT {} FROM users ORDER BY display_name, id", USER_COLUMNS),
                &[],
            )
            .await
            .map_err(|e| pg_error("User", e))?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn user_insert(
        &self,
        uid: &str,
        email: &str,
        display_name: &str,
    ) -> StoreResult<UserRecord> {
        let client = self.client().await?;
        let row = client
            .query_one(
                &format!(
                    "INSERT INTO users (firebase_uid, email, display_name) VALUES ($1, $2, $3) \
                     RETURNING {}",
                    USER_COLUMNS
                ),
                &[&uid, &email, &display_name],
            )
            .await
            .map_err(|e| pg_error("User", e))?;
        Ok(user_from_row(&row))
    }

    async fn user_ensure(&self, uid: &str, email: &str, display_name: &str) -> StoreResult<bool> {
        let client = self.client().await?;
        let inserted = client
            .execute(
                "INSERT INTO users (firebase_uid, email, display_name) VALUES ($1, $2, $3) \
                 ON CONFLICT DO NOTHING",
                &[&uid, &email, &display_name],
            )
            .await
            .map_err(|e| pg_error("User", e))?;
        Ok(inserted == 1)
    }

    async fn user_update_display_name(&self, uid: &str, display_name: &str) -> StoreResult<bool> {
        let client = self.client().await?;
        let updated = client
            .execute(
                "UPDATE users SET display_name = $2 WHERE firebase_uid = $1",
                &[&uid, &display_name],
            )
            .await
            .map_err(|e| pg_error("User", e))?;
        Ok(updated > 0)
    }

    async fn user_delete(&self, uid: &str) -> StoreResult<bool> {
        let client = self.client().await?;
        let deleted = client
            .execute("DELETE FROM users WHERE firebase_uid = $1", &[&uid])
            .await
            .map_err(|e| pg_error("User", e))?;
        Ok(deleted > 0)
    }

    async fn user_internal_id(&self, uid: &str) -> StoreResult<Option<i64>> {
        let client = self.client().await?;
        let row = client
            .query_opt("SELECT id FROM users WHERE firebase_uid = $1", &[&uid])
            .await
            .map_err(|e| pg_error("User", e))?;
        Ok(row.map(|r| r.get(0)))
    }

    // ========================================================================
    // WORKSPACES
    // ========================================================================

    async fn workspace_create_public(
        &self,
        owner_uid: &str,
        name: &str,
        description: &str,
    ) -> StoreResult<Workspace> {
        self.create_workspace(owner_uid, name, description, true)
            .await
    }

    async fn workspace_create_private(&self, owner_uid: &str) -> StoreResult<Workspace> {
        self.create_workspace(owner_uid, owner_uid, PRIVATE_WORKSPACE_DESCRIPTION, false)
            .await
            .map_err(|e| match e {
                StorageError::AlreadyExists { .. } => StorageError::AlreadyExists {
                    entity: "Workspace",
                    reason: format!("{} already has a private workspace", owner_uid),
                },
                other => other,
            })
    }

    async fn workspace_get(&self, id: i64) -> StoreResult<Option<Workspace>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM workspaces w WHERE w.id = $1", WORKSPACE_COLUMNS),
                &[&id],
            )
            .await
            .map_err(|e| pg_error("Workspace", e))?;
        Ok(row.as_ref().map(workspace_from_row))
    }

    async fn workspace_update(&self, id: i64, name: &str, description: &str) -> StoreResult<bool> {
        let client = self.client().await?;
        let updated = client
            .execute(
                "UPDATE workspaces SET name = $2, description = $3, updated_at = now() \
                 WHERE id = $1",
                &[&id, &name, &description],
            )
            .await
            .map_err(|e| pg_error("Workspace", e))?;
        Ok(updated > 0)
    }

    async fn workspace_delete_owned(&self, id: i64, owner_uid: &str) -> StoreResult<bool> {
        let client = self.client().await?;
        let deleted = client
            .execute(
                "DELETE FROM workspaces WHERE id = $1 AND owner_uid = $2",
                &[&id, &owner_uid],
            )
            .await
            .map_err(|e| pg_error("Workspace", e))?;
        Ok(deleted > 0)
    }

    async fn workspace_list_for_user(&self, uid: &str) -> StoreResult<Vec<UserWorkspace>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT w.id, w.name, m.role, (w.owner_uid = $1) AS is_owner \
                 FROM workspaces w \
                 JOIN workspace_members m ON m.workspace_id = w.id \
                 JOIN users u ON u.id = m.user_id \
                 WHERE u.firebase_uid = $1 \
                 ORDER BY w.name, w.id",
                &[&uid],
            )
            .await
            .map_err(|e| pg_error("Workspace", e))?;
        Ok(rows
            .iter()
            .map(|row| UserWorkspace {
                id: row.get("id"),
                name: row.get("name"),
                user_role: role_from_row(row, "role"),
                is_owner: row.get("is_owner"),
            })
            .collect())
    }

    async fn workspace_owned_count(&self, uid: &str) -> StoreResult<i64> {
        let client = self.client().await?;
        let row = client
            .query_one("SELECT COUNT(*) FROM workspaces WHERE owner_uid = $1", &[&uid])
            .await
            .map_err(|e| pg_error("Workspace", e))?;
        Ok(row.get(0))
    }

    async fn workspace_ids_page(&self, after: i64, limit: i64) -> StoreResult<Vec<i64>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id FROM workspaces WHERE id > $1 ORDER BY id LIMIT $2",
                &[&after, &limit.max(0)],
            )
            .await
            .map_err(|e| pg_error("Workspace", e))?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    // ========================================================================
    // MEMBERS
    // ========================================================================

    async fn member_is(&self, uid: &str, workspace_id: i64) -> StoreResult<bool> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM workspace_members m \
                 JOIN users u ON u.id = m.user_id \
                 WHERE u.firebase_uid = $1 AND m.workspace_id = $2)",
                &[&uid, &workspace_id],
            )
            .await
            .map_err(|e| pg_error("WorkspaceMember", e))?;
        Ok(row.get(0))
    }

    async fn member_list(&self, workspace_id: i64) -> StoreResult<Vec<WorkspaceMember>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT u.firebase_uid, u.display_name, u.email, m.role, m.joined_at \
                 FROM workspace_members m JOIN users u ON u.id = m.user_id \
                 WHERE m.workspace_id = $1 \
                 ORDER BY u.display_name, u.id",
                &[&workspace_id],
            )
            .await
            .map_err(|e| pg_error("WorkspaceMember", e))?;
        Ok(rows
            .iter()
            .map(|row| WorkspaceMember {
                user_id: row.get("firebase_uid"),
                display_name: row.get("display_name"),
                email: row.get("email"),
                role: role_from_row(row, "role"),
                joined_at: row.get("joined_at"),
            })
            .collect())
    }

    async fn member_add(
        &self,
        workspace_id: i64,
        email: &str,
        role: MemberRole,
    ) -> StoreResult<()> {
        let client = self.client().await?;
        let user_id: i64 = client
            .query_opt("SELECT id FROM users WHERE email = $1", &[&email])
            .await
            .map_err(|e| pg_error("User", e))?
            .map(|row| row.get(0))
            .ok_or_else(|| StorageError::UserNotFound {
                email: email.to_string(),
            })?;

        let inserted = client
            .execute(
                "INSERT INTO workspace_members (workspace_id, user_id, role) VALUES ($1, $2, $3) \
                 ON CONFLICT (workspace_id, user_id) DO NOTHING",
                &[&workspace_id, &user_id, &role.as_str()],
            )
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StorageError::not_found("Workspace", workspace_id)
                } else {
                    pg_error("WorkspaceMember", e)
                }
            })?;

        if inserted == 0 {
            return Err(StorageError::AlreadyMember {
                email: email.to_string(),
                workspace_id,
            });
        }
        Ok(())
    }

    async fn member_remove(&self, workspace_id: i64, uid: &str) -> StoreResult<bool> {
        let client = self.client().await?;
        let deleted = client
            .execute(
                "DELETE FROM workspace_members m USING users u \
                 WHERE m.user_id = u.id AND m.workspace_id = $1 AND u.firebase_uid = $2",
                &[&workspace_id, &uid],
            )
            .await
            .map_err(|e| pg_error("WorkspaceMember", e))?;
        Ok(deleted > 0)
    }

    // ========================================================================
    // TASK STUBS
    // ========================================================================

    async fn task_stub_insert(
        &self,
        doc_id: &str,
        workspace_id: i64,
        created_by: i64,
    ) -> StoreResult<()> {
        let client = self.client().await?;
        client
            .execute(
                "INSERT INTO tarefas (firestore_doc_id, workspace_id, criado_por) \
                 VALUES ($1, $2, $3)",
                &[&doc_id, &workspace_id, &created_by],
            )
            .await
            .map_err(|e| pg_error("Task", e))?;
        Ok(())
    }

    async fn task_stub_touch(&self, doc_id: &str, workspace_id: i64) -> StoreResult<u64> {
        let client = self.client().await?;
        client
            .execute(
                "UPDATE tarefas SET updated_at = now() \
                 WHERE firestore_doc_id = $1 AND workspace_id = $2",
                &[&doc_id, &workspace_id],
            )
            .await
            .map_err(|e| pg_error("Task", e))
    }

    async fn task_stub_delete(&self, doc_id: &str, workspace_id: i64) -> StoreResult<u64> {
        let client = self.client().await?;
        client
            .execute(
                "DELETE FROM tarefas WHERE firestore_doc_id = $1 AND workspace_id = $2",
                &[&doc_id, &workspace_id],
            )
            .await
            .map_err(|e| pg_error("Task", e))
    }

    async fn task_stub_list(&self, workspace_id: i64) -> StoreResult<Vec<TaskStub>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT firestore_doc_id, workspace_id, criado_por, created_at, updated_at \
                 FROM tarefas WHERE workspace_id = $1 ORDER BY created_at, id",
                &[&workspace_id],
            )
            .await
            .map_err(|e| pg_error("Task", e))?;
        Ok(rows
            .iter()
            .map(|row| TaskStub {
                firestore_doc_id: row.get("firestore_doc_id"),
                workspace_id: row.get("workspace_id"),
                created_by: row.get("criado_por"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }
}
