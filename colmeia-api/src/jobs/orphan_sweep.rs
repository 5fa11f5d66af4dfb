//! Orphan Sweep Background Task
//!
//! Periodically reconciles task stubs with task documents across all
//! workspaces (see [`crate::services::reconcile`]). It catches the leftovers
//! of dual writes whose compensation could not run:
//!
//! - stubs whose document was deleted but whose own delete failed
//! - documents whose create compensation failed
//!
//! Each pass walks workspace ids in pages of `batch_size`. A failure on one
//! workspace is logged and counted, and the pass moves on to the next.
//!
//! The sweep is off unless `COLMEIA_ORPHAN_SWEEP_ENABLED` is set.

use crate::config::{env_flag, env_parse};
use crate::constants::{
    DEFAULT_ORPHAN_SWEEP_BATCH, DEFAULT_ORPHAN_SWEEP_GRACE_SECS,
    DEFAULT_ORPHAN_SWEEP_INTERVAL_SECS,
};
use crate::services::reconcile_workspace;
use crate::state::{SharedDocuments, SharedRelational};
use crate::telemetry::metrics::with_metrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the orphan sweep.
#[derive(Debug, Clone)]
pub struct OrphanSweepConfig {
    pub enabled: bool,

    /// Time between passes (default: 15 minutes)
    pub check_interval: Duration,

    /// Minimum age of a stub-less document before it is removed
    /// (default: 5 minutes)
    pub grace: Duration,

    /// Workspaces fetched per page (default: 50)
    pub batch_size: i64,
}

impl Default for OrphanSweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval: Duration::from_secs(DEFAULT_ORPHAN_SWEEP_INTERVAL_SECS),
            grace: Duration::from_secs(DEFAULT_ORPHAN_SWEEP_GRACE_SECS),
            batch_size: DEFAULT_ORPHAN_SWEEP_BATCH,
        }
    }
}

impl OrphanSweepConfig {
    /// Create OrphanSweepConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `COLMEIA_ORPHAN_SWEEP_ENABLED`: Run the sweep (default: false)
    /// - `COLMEIA_ORPHAN_SWEEP_INTERVAL_SECS`: Seconds between passes (default: 900)
    /// - `COLMEIA_ORPHAN_SWEEP_GRACE_SECS`: Grace period for documents (default: 300)
    /// - `COLMEIA_ORPHAN_SWEEP_BATCH`: Workspaces per page (default: 50)
    pub fn from_env() -> Self {
        Self {
            enabled: env_flag("COLMEIA_ORPHAN_SWEEP_ENABLED", false),
            check_interval: Duration::from_secs(
                env_parse(
                    "COLMEIA_ORPHAN_SWEEP_INTERVAL_SECS",
                    DEFAULT_ORPHAN_SWEEP_INTERVAL_SECS,
                )
                .max(1),
            ),
            grace: Duration::from_secs(env_parse(
                "COLMEIA_ORPHAN_SWEEP_GRACE_SECS",
                DEFAULT_ORPHAN_SWEEP_GRACE_SECS,
            )),
            batch_size: env_parse("COLMEIA_ORPHAN_SWEEP_BATCH", DEFAULT_ORPHAN_SWEEP_BATCH).max(1),
        }
    }

    fn grace_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.grace).unwrap_or_else(|_| {
            chrono::Duration::seconds(DEFAULT_ORPHAN_SWEEP_GRACE_SECS as i64)
        })
    }
}

// ============================================================================
// STATS
// ============================================================================

/// Counters kept for the lifetime of the task.
#[derive(Debug, Default)]
pub struct OrphanSweepStats {
    pub passes: AtomicU64,
    pub workspaces_checked: AtomicU64,
    pub stubs_removed: AtomicU64,
    pub documents_removed: AtomicU64,
    pub errors: AtomicU64,
}

impl OrphanSweepStats {
    pub fn snapshot(&self) -> OrphanSweepSnapshot {
        OrphanSweepSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            workspaces_checked: self.workspaces_checked.load(Ordering::Relaxed),
            stubs_removed: self.stubs_removed.load(Ordering::Relaxed),
            documents_removed: self.documents_removed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanSweepSnapshot {
    pub passes: u64,
    pub workspaces_checked: u64,
    pub stubs_removed: u64,
    pub documents_removed: u64,
    pub errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run sweeps until the shutdown signal flips to `true`.
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(orphan_sweep_task(relational, documents, config, shutdown_rx));
/// // ...
/// let _ = shutdown_tx.send(true);
/// let stats = handle.await?;
/// ```
pub async fn orphan_sweep_task(
    relational: SharedRelational,
    documents: SharedDocuments,
    config: OrphanSweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<OrphanSweepStats> {
    let stats = Arc::new(OrphanSweepStats::default());

    let mut ticker = interval(config.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_secs = config.check_interval.as_secs(),
        grace_secs = config.grace.as_secs(),
        batch_size = config.batch_size,
        "Orphan sweep task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Orphan sweep task shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                sweep_once(relational.as_ref(), documents.as_ref(), &config, &stats).await;
            }
        }
    }

    let snapshot = stats.snapshot();
    tracing::info!(
        passes = snapshot.passes,
        workspaces_checked = snapshot.workspaces_checked,
        stubs_removed = snapshot.stubs_removed,
        documents_removed = snapshot.documents_removed,
        errors = snapshot.errors,
        "Orphan sweep task completed"
    );

    stats
}

/// One full pass over every workspace.
pub async fn sweep_once(
    relational: &dyn colmeia_storage::RelationalStore,
    documents: &dyn colmeia_storage::DocumentStore,
    config: &OrphanSweepConfig,
    stats: &OrphanSweepStats,
) {
    let grace = config.grace_delta();
    let now = chrono::Utc::now();
    let mut after = 0i64;

    loop {
        let page = match relational.workspace_ids_page(after, config.batch_size).await {
            Ok(page) => page,
            Err(e) => {
                tracing::error!(after, error = %e, "Orphan sweep could not list workspaces");
                stats.errors.fetch_add(1, Ordering::Relaxed);
                break;
            }
        };
        let Some(&last) = page.last() else {
            break;
        };

        for workspace_id in page {
            stats.workspaces_checked.fetch_add(1, Ordering::Relaxed);
            match reconcile_workspace(relational, documents, workspace_id, grace, now).await {
                Ok(report) if report.is_clean() => {}
                Ok(report) => {
                    stats
                        .stubs_removed
                        .fetch_add(report.stubs_removed, Ordering::Relaxed);
                    stats
                        .documents_removed
                        .fetch_add(report.documents_removed, Ordering::Relaxed);
                    with_metrics(|m| {
                        m.record_orphans_removed("stub", report.stubs_removed);
                        m.record_orphans_removed("document", report.documents_removed);
                    });
                    tracing::info!(
                        workspace_id,
                        stubs_removed = report.stubs_removed,
                        documents_removed = report.documents_removed,
                        "Workspace reconciled"
                    );
                }
                Err(e) => {
                    tracing::warn!(workspace_id, error = %e, "Workspace reconciliation failed");
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        after = last;
    }

    stats.passes.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use colmeia_storage::{path, DocumentStore, RelationalStore};
    use colmeia_test_utils::{fixtures, FailPoint, InMemoryDocumentStore, InMemoryRelationalStore};

    fn config() -> OrphanSweepConfig {
        OrphanSweepConfig {
            enabled: true,
            check_interval: Duration::from_millis(10),
            grace: Duration::from_secs(0),
            batch_size: 2,
        }
    }

    async fn seeded(workspaces: usize) -> (InMemoryRelationalStore, InMemoryDocumentStore, Vec<i64>) {
        let relational = InMemoryRelationalStore::new();
        relational
            .user_insert("uid-1", "ana@colmeia.io", "Ana")
            .await
            .unwrap();
        let mut ids = Vec::new();
        for i in 0..workspaces {
            let ws = relational
                .workspace_create_public("uid-1", &format!("ws {}", i), "")
                .await
                .unwrap();
            ids.push(ws.id);
        }
        (relational, InMemoryDocumentStore::new(), ids)
    }

    #[test]
    fn test_default_is_disabled() {
        let config = OrphanSweepConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.check_interval, Duration::from_secs(900));
        assert_eq!(config.batch_size, 50);
    }

    #[tokio::test]
    async fn test_sweep_pages_through_every_workspace() {
        let (relational, documents, ids) = seeded(5).await;
        for ws in &ids {
            let detail = fixtures::task_detail(*ws, "uid-1", "orphan");
            documents
                .set(&path::task_doc(*ws, "orphan").unwrap(), detail.into_fields().unwrap())
                .await
                .unwrap();
        }

        let stats = OrphanSweepStats::default();
        sweep_once(&relational, &documents, &config(), &stats).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.passes, 1);
        assert_eq!(snapshot.workspaces_checked, 5);
        assert_eq!(snapshot.documents_removed, 5);
        assert_eq!(snapshot.errors, 0);
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn test_failed_workspace_does_not_stop_pass() {
        let (relational, documents, _) = seeded(3).await;
        documents.fail_next(FailPoint::DocList);

        let stats = OrphanSweepStats::default();
        sweep_once(&relational, &documents, &config(), &stats).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.workspaces_checked, 3);
        assert_eq!(snapshot.errors, 1);
    }

    #[tokio::test]
    async fn test_task_stops_on_shutdown() {
        let (relational, documents, _) = seeded(1).await;
        let relational: SharedRelational = Arc::new(relational);
        let documents: SharedDocuments = Arc::new(documents);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(orphan_sweep_task(relational, documents, config(), shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let stats = handle.await.unwrap();
        assert!(stats.snapshot().passes >= 1);
    }
}
