//! Document store abstraction.

use crate::path::{CollectionPath, DocPath};
use async_trait::async_trait;
use colmeia_core::StoreResult;
use serde_json::{Map, Value};

/// Maximum number of writes accepted by a single [`DocumentStore::delete_many`].
pub const MAX_BATCH_WRITES: usize = 500;

/// Field map of a document.
pub type Fields = Map<String, Value>;

/// A document read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Last segment of the document path.
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Read a string field.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Sort direction for [`ListQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering and limit for a collection listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Async document store.
///
/// Implementations are shared across handlers, so they must be `Send + Sync`.
/// `delete` is idempotent: removing a missing document succeeds.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document.
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>>;

    /// Create or overwrite a document.
    async fn set(&self, path: &DocPath, fields: Fields) -> StoreResult<()>;

    /// Create a document with a generated id, returning the id.
    async fn add(&self, collection: &CollectionPath, fields: Fields) -> StoreResult<String>;

    /// Merge `fields` into an existing document.
    ///
    /// Fails with `StorageError::NotFound` when the document does not exist.
    async fn update(&self, path: &DocPath, fields: Fields) -> StoreResult<()>;

    /// Delete a document.
    async fn delete(&self, path: &DocPath) -> StoreResult<()>;

    /// List the documents of a collection.
    ///
    /// With `order_by` set, documents missing that field are left out.
    async fn list(&self, collection: &CollectionPath, query: ListQuery)
        -> StoreResult<Vec<Document>>;

    /// Delete up to [`MAX_BATCH_WRITES`] documents atomically.
    async fn delete_many(&self, paths: &[DocPath]) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_builder() {
        let query = ListQuery::all()
            .order_by("lastUpdatedAt", Direction::Descending)
            .limit(15);
        assert_eq!(
            query.order_by,
            Some(("lastUpdatedAt".to_string(), Direction::Descending))
        );
        assert_eq!(query.limit, Some(15));
    }

    #[test]
    fn test_document_str_field() {
        let mut fields = Fields::new();
        fields.insert("title".into(), Value::String("a".into()));
        fields.insert("n".into(), Value::from(3));
        let doc = Document::new("x", fields);
        assert_eq!(doc.str_field("title"), Some("a"));
        assert_eq!(doc.str_field("n"), None);
    }
}
