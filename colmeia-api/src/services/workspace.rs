//! Workspace deletion cascade.
//!
//! Documents go first: every subcollection is drained in batches, then the
//! workspace document itself. The relational row is only deleted once the
//! purge succeeded, so a failed purge leaves a workspace that can be deleted
//! again.

use colmeia_core::StoreResult;
use colmeia_storage::{
    path, DocPath, DocumentStore, ListQuery, RelationalStore, MAX_BATCH_WRITES,
};

use crate::error::{ApiError, ApiResult};

/// Documents removed by [`purge_workspace_documents`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub documents_deleted: usize,
}

/// Delete every document under `workspaces/{id}`, then the workspace document.
pub async fn purge_workspace_documents(
    documents: &dyn DocumentStore,
    workspace_id: i64,
) -> StoreResult<PurgeReport> {
    let mut report = PurgeReport::default();

    for name in path::WORKSPACE_SUBCOLLECTIONS {
        let collection = path::workspace_collection(workspace_id, name)?;
        loop {
            let page = documents
                .list(&collection, ListQuery::all().limit(MAX_BATCH_WRITES))
                .await?;
            if page.is_empty() {
                break;
            }
            let paths = page
                .iter()
                .map(|doc| collection.doc(&doc.id))
                .collect::<StoreResult<Vec<DocPath>>>()?;
            documents.delete_many(&paths).await?;
            report.documents_deleted += paths.len();
            tracing::debug!(workspace_id, collection = %name, batch = paths.len(), "Purged batch");
        }
    }

    documents.delete(&path::workspace_doc(workspace_id)).await?;
    Ok(report)
}

/// Delete a workspace the caller owns, documents first.
pub async fn delete_workspace(
    relational: &dyn RelationalStore,
    documents: &dyn DocumentStore,
    workspace_id: i64,
    caller_uid: &str,
) -> ApiResult<()> {
    let workspace = relational
        .workspace_get(workspace_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Workspace not found"))?;
    if !workspace.is_owned_by(caller_uid) {
        return Err(ApiError::forbidden(
            "Only the owner can delete this workspace",
        ));
    }

    let report = purge_workspace_documents(documents, workspace_id)
        .await
        .map_err(|e| {
            tracing::error!(workspace_id, error = %e, "Workspace document purge failed");
            ApiError::document_store_error("Failed to delete workspace data")
        })?;

    if !relational
        .workspace_delete_owned(workspace_id, caller_uid)
        .await?
    {
        tracing::warn!(
            workspace_id,
            user_id = %caller_uid,
            documents_deleted = report.documents_deleted,
            "Workspace row not deleted after its documents were purged"
        );
        return Err(ApiError::forbidden(
            "Only the owner can delete this workspace",
        ));
    }

    tracing::info!(
        workspace_id,
        user_id = %caller_uid,
        documents_deleted = report.documents_deleted,
        "Workspace deleted"
    );
    Ok(())
}
