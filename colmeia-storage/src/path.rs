//! Document store paths.
//!
//! Paths alternate collection and document segments, starting with a
//! collection: `workspaces/12/tasks/<uuid>` is a document path and
//! `workspaces/12/tasks` a collection path.

use colmeia_core::{StorageError, StoreResult};
use std::fmt;

/// Top-level collection holding one document per workspace.
pub const WORKSPACES: &str = "workspaces";
/// Subcollection of task detail documents.
pub const TASKS: &str = "tasks";
/// Subcollection of AI interaction history entries.
pub const AI_HISTORY: &str = "ai_request_history";

/// Subcollections removed when a workspace is deleted.
pub const WORKSPACE_SUBCOLLECTIONS: &[&str] = &[TASKS, AI_HISTORY];

fn validate_segment(path: &str, segment: &str) -> StoreResult<()> {
    if segment.is_empty() {
        return Err(StorageError::InvalidPath {
            path: path.to_string(),
            reason: "empty segment".to_string(),
        });
    }
    if segment.contains('/') {
        return Err(StorageError::InvalidPath {
            path: path.to_string(),
            reason: format!("segment '{}' contains '/'", segment),
        });
    }
    if segment == "." || segment == ".." {
        return Err(StorageError::InvalidPath {
            path: path.to_string(),
            reason: "relative segment".to_string(),
        });
    }
    Ok(())
}

fn split_validated(raw: &str) -> StoreResult<Vec<String>> {
    let segments: Vec<&str> = raw.split('/').collect();
    for segment in &segments {
        validate_segment(raw, segment)?;
    }
    Ok(segments.into_iter().map(str::to_string).collect())
}

/// Path of a collection (odd number of segments).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
    segments: Vec<String>,
}

/// Path of a document (even number of segments).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    segments: Vec<String>,
}

impl CollectionPath {
    /// A top-level collection.
    pub fn root(name: &str) -> StoreResult<Self> {
        validate_segment(name, name)?;
        Ok(Self {
            segments: vec![name.to_string()],
        })
    }

    /// Parse a slash-separated collection path.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let segments = split_validated(raw)?;
        if segments.len() % 2 == 0 {
            return Err(StorageError::InvalidPath {
                path: raw.to_string(),
                reason: "collection paths have an odd number of segments".to_string(),
            });
        }
        Ok(Self { segments })
    }

    /// The document `id` inside this collection.
    pub fn doc(&self, id: &str) -> StoreResult<DocPath> {
        validate_segment(&format!("{}/{}", self, id), id)?;
        let mut segments = self.segments.clone();
        segments.push(id.to_string());
        Ok(DocPath { segments })
    }

    /// Last segment, the collection id.
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Document owning this collection, `None` for top-level collections.
    pub fn parent(&self) -> Option<DocPath> {
        if self.segments.len() < 3 {
            return None;
        }
        Some(DocPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl DocPath {
    /// Parse a slash-separated document path.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let segments = split_validated(raw)?;
        if segments.len() % 2 != 0 {
            return Err(StorageError::InvalidPath {
                path: raw.to_string(),
                reason: "document paths have an even number of segments".to_string(),
            });
        }
        Ok(Self { segments })
    }

    /// A subcollection under this document.
    pub fn collection(&self, name: &str) -> StoreResult<CollectionPath> {
        validate_segment(&format!("{}/{}", self, name), name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(CollectionPath { segments })
    }

    /// Last segment, the document id.
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Collection containing this document.
    pub fn parent(&self) -> CollectionPath {
        CollectionPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

// ============================================================================
// WELL-KNOWN PATHS
// ============================================================================

/// `workspaces/{workspace_id}`
pub fn workspace_doc(workspace_id: i64) -> DocPath {
    DocPath {
        segments: vec![WORKSPACES.to_string(), workspace_id.to_string()],
    }
}

/// `workspaces/{workspace_id}/{name}`
pub fn workspace_collection(workspace_id: i64, name: &str) -> StoreResult<CollectionPath> {
    workspace_doc(workspace_id).collection(name)
}

/// `workspaces/{workspace_id}/tasks`
pub fn tasks_collection(workspace_id: i64) -> CollectionPath {
    CollectionPath {
        segments: vec![
            WORKSPACES.to_string(),
            workspace_id.to_string(),
            TASKS.to_string(),
        ],
    }
}

/// `workspaces/{workspace_id}/tasks/{task_doc_id}`
pub fn task_doc(workspace_id: i64, task_doc_id: &str) -> StoreResult<DocPath> {
    tasks_collection(workspace_id).doc(task_doc_id)
}

/// `workspaces/{workspace_id}/ai_request_history`
pub fn history_collection(workspace_id: i64) -> CollectionPath {
    CollectionPath {
        segments: vec![
            WORKSPACES.to_string(),
            workspace_id.to_string(),
            AI_HISTORY.to_string(),
        ],
    }
}
