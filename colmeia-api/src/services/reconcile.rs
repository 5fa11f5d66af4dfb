//! Stub/document reconciliation for one workspace.
//!
//! Two kinds of leftovers come out of partial dual-write failures:
//! - a stub without a document, when a task delete removed the document but
//!   not the stub;
//! - a document without a stub, when the compensating delete of a failed
//!   create did not go through.
//!
//! Documents younger than the grace period are left alone, since a create in
//! flight writes its document before its stub.

use std::collections::HashSet;

use colmeia_core::{parse_doc_timestamp, task::fields, StoreResult, Timestamp};
use colmeia_storage::{path, DocPath, DocumentStore, ListQuery, RelationalStore, MAX_BATCH_WRITES};

/// What one reconciliation removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub stubs_removed: u64,
    pub documents_removed: u64,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.stubs_removed == 0 && self.documents_removed == 0
    }
}

pub async fn reconcile_workspace(
    relational: &dyn RelationalStore,
    documents: &dyn DocumentStore,
    workspace_id: i64,
    grace: chrono::Duration,
    now: Timestamp,
) -> StoreResult<ReconcileReport> {
    // Stubs are listed before documents: a stub seen here always has its
    // document written already.
    let stubs = relational.task_stub_list(workspace_id).await?;
    let collection = path::tasks_collection(workspace_id);
    let docs = documents.list(&collection, ListQuery::all()).await?;

    let doc_ids: HashSet<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    let stub_ids: HashSet<&str> = stubs.iter().map(|s| s.firestore_doc_id.as_str()).collect();

    let mut report = ReconcileReport::default();

    for stub in stubs.iter().filter(|s| !doc_ids.contains(s.firestore_doc_id.as_str())) {
        report.stubs_removed += relational
            .task_stub_delete(&stub.firestore_doc_id, workspace_id)
            .await?;
        tracing::warn!(workspace_id, doc_id = %stub.firestore_doc_id, "Removed task stub without document");
    }

    let cutoff = now - grace;
    let mut orphans: Vec<DocPath> = Vec::new();
    for doc in docs.iter().filter(|d| !stub_ids.contains(d.id.as_str())) {
        match doc.str_field(fields::CREATED_AT).and_then(parse_doc_timestamp) {
            Some(created_at) if created_at <= cutoff => orphans.push(collection.doc(&doc.id)?),
            Some(_) => {}
            None => tracing::warn!(
                workspace_id,
                doc_id = %doc.id,
                "Task document without stub has no createdAt, leaving it"
            ),
        }
    }

    for batch in orphans.chunks(MAX_BATCH_WRITES) {
        documents.delete_many(batch).await?;
        report.documents_removed += batch.len() as u64;
        for orphan in batch {
            tracing::warn!(workspace_id, doc_id = %orphan.id(), "Removed orphan task document");
        }
    }

    Ok(report)
}
