//! AI interaction history, stored under `workspaces/{id}/ai_request_history`.

use colmeia_core::{AiHistoryEntry, StorageError, StoreResult};
use colmeia_storage::{path, Direction, DocumentStore, Fields, ListQuery};
use serde_json::Value;

fn entry_fields(entry: &AiHistoryEntry) -> StoreResult<Fields> {
    match serde_json::to_value(entry) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StorageError::Decode {
            reason: "history entry is not an object".to_string(),
        }),
        Err(e) => Err(StorageError::Decode {
            reason: e.to_string(),
        }),
    }
}

/// Append an entry. Failures are logged and swallowed.
pub async fn record(documents: &dyn DocumentStore, entry: AiHistoryEntry) {
    let workspace_id = entry.workspace_id_pg;
    let service = entry.ai_service_type;
    let result = async {
        let fields = entry_fields(&entry)?;
        documents
            .add(&path::history_collection(workspace_id), fields)
            .await
    }
    .await;

    match result {
        Ok(id) => tracing::debug!(workspace_id, service = %service, history_id = %id, "AI call recorded"),
        Err(e) => tracing::warn!(
            workspace_id,
            service = %service,
            error = %e,
            "Failed to record AI interaction history"
        ),
    }
}

/// Most recent entries first, each with its document `id`.
pub async fn list_recent(
    documents: &dyn DocumentStore,
    workspace_id: i64,
    limit: usize,
) -> StoreResult<Vec<Value>> {
    let query = ListQuery::all()
        .order_by("timestamp", Direction::Descending)
        .limit(limit);
    let docs = documents
        .list(&path::history_collection(workspace_id), query)
        .await?;
    Ok(docs
        .into_iter()
        .map(|doc| {
            let mut fields = doc.fields;
            fields.insert("id".to_string(), Value::String(doc.id));
            Value::Object(fields)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use colmeia_core::AiServiceType;
    use colmeia_test_utils::{FailPoint, InMemoryDocumentStore};
    use serde_json::json;

    fn entry(workspace_id: i64, timestamp: &str) -> AiHistoryEntry {
        AiHistoryEntry {
            user_id: "uid-1".to_string(),
            workspace_id_pg: workspace_id,
            ai_service_type: AiServiceType::TextSummary,
            timestamp: timestamp.to_string(),
            frontend_request_payload: json!({"text": "t"}),
            request_to_ai: json!({"text": "t"}),
            response_from_ai: json!({"summary": "s"}),
            ai_status_code: 200,
            ai_error: None,
        }
    }

    #[tokio::test]
    async fn test_record_then_list_newest_first() {
        let store = InMemoryDocumentStore::new();
        record(&store, entry(3, "2024-01-01T00:00:00.000Z")).await;
        record(&store, entry(3, "2024-01-02T00:00:00.000Z")).await;
        record(&store, entry(4, "2024-01-03T00:00:00.000Z")).await;

        let listed = list_recent(&store, 3, 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["timestamp"], "2024-01-02T00:00:00.000Z");
        assert_eq!(listed[0]["aiServiceType"], "text_summary");
        assert!(listed[0]["id"].is_string());
    }

    #[tokio::test]
    async fn test_list_respects_limit() {
        let store = InMemoryDocumentStore::new();
        for day in 1..=5 {
            record(&store, entry(1, &format!("2024-01-0{}T00:00:00.000Z", day))).await;
        }
        assert_eq!(list_recent(&store, 1, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_record_failure_is_swallowed() {
        let store = InMemoryDocumentStore::new();
        store.fail_next(FailPoint::DocAdd);
        record(&store, entry(1, "2024-01-01T00:00:00.000Z")).await;
        assert!(store.is_empty());
    }
}
