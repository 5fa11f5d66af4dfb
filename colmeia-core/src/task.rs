//! Task detail documents.
//!
//! A task is split across the two stores: the relational stub (see
//! [`crate::TaskStub`]) carries ownership, while the detail document below
//! carries every user-visible field. Documents are exchanged with the store as
//! plain JSON maps, so the conversions here are the single place where field
//! names are decided.

use crate::Timestamp;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status assigned when a task is created without one.
pub const DEFAULT_TASK_STATUS: &str = "pending";

/// Document field names used in queries.
pub mod fields {
    pub const CREATED_AT: &str = "createdAt";
    pub const LAST_UPDATED_AT: &str = "lastUpdatedAt";
    pub const LAST_UPDATED_BY: &str = "lastUpdatedByFirebaseUid";
}

/// Render a timestamp the way documents store it.
///
/// Fixed-width UTC with millisecond precision, so lexicographic order on the
/// stored strings matches chronological order.
pub fn format_doc_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored document timestamp.
pub fn parse_doc_timestamp(raw: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

mod doc_time {
    use super::{format_doc_timestamp, parse_doc_timestamp};
    use crate::Timestamp;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Timestamp, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_doc_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(d)?;
        parse_doc_timestamp(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use crate::task::{format_doc_timestamp, parse_doc_timestamp};
        use crate::Timestamp;
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(ts: &Option<Timestamp>, s: S) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => s.serialize_str(&format_doc_timestamp(ts)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Timestamp>, D::Error> {
            match Option::<String>::deserialize(d)? {
                None => Ok(None),
                Some(raw) if raw.is_empty() => Ok(None),
                Some(raw) => parse_doc_timestamp(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}"))),
            }
        }
    }
}

/// The document-store record of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default, with = "doc_time::option")]
    pub expiration_date: Option<Timestamp>,
    #[serde(default)]
    pub attachment: Option<Value>,
    pub workspace_id_pg: i64,
    pub creator_firebase_uid: String,
    #[serde(with = "doc_time")]
    pub created_at: Timestamp,
    #[serde(with = "doc_time")]
    pub last_updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_by_firebase_uid: Option<String>,
}

impl TaskDetail {
    /// Convert into the field map written to the document store.
    pub fn into_fields(self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "task detail serialized to non-object: {other}"
            ))),
        }
    }

    /// Decode a field map read from the document store.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(fields))
    }
}

/// Partial update of a task detail. `None` leaves the field untouched.
///
/// `expirationDate` and `attachment` also accept an explicit `null`, which
/// clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "present")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, nullable))]
    pub expiration_date: Option<Option<Timestamp>>,
    #[serde(default, deserialize_with = "present")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>, nullable))]
    pub attachment: Option<Option<Value>>,
}

/// A key that is present maps to `Some`, even when its value is `null`.
fn present<'de, T, D>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.expiration_date.is_none()
            && self.attachment.is_none()
    }

    /// Build the fields to merge into the document, audit fields included.
    ///
    /// Returns `None` when the patch carries no user field.
    pub fn to_update_fields(&self, updated_by: &str, now: &Timestamp) -> Option<Map<String, Value>> {
        if self.is_empty() {
            return None;
        }
        let mut map = Map::new();
        if let Some(title) = &self.title {
            map.insert("title".into(), Value::String(title.trim().to_string()));
        }
        if let Some(description) = &self.description {
            map.insert("description".into(), Value::String(description.clone()));
        }
        if let Some(status) = &self.status {
            map.insert("status".into(), Value::String(status.clone()));
        }
        if let Some(priority) = &self.priority {
            map.insert("priority".into(), Value::String(priority.clone()));
        }
        if let Some(expiration) = &self.expiration_date {
            let value = expiration
                .as_ref()
                .map_or(Value::Null, |ts| Value::String(format_doc_timestamp(ts)));
            map.insert("expirationDate".into(), value);
        }
        if let Some(attachment) = &self.attachment {
            map.insert("attachment".into(), attachment.clone().unwrap_or(Value::Null));
        }
        map.insert(
            fields::LAST_UPDATED_BY.into(),
            Value::String(updated_by.to_string()),
        );
        map.insert(
            fields::LAST_UPDATED_AT.into(),
            Value::String(format_doc_timestamp(now)),
        );
        Some(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_detail() -> TaskDetail {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        TaskDetail {
            title: "Write report".to_string(),
            description: String::new(),
            status: DEFAULT_TASK_STATUS.to_string(),
            priority: "high".to_string(),
            expiration_date: None,
            attachment: None,
            workspace_id_pg: 7,
            creator_firebase_uid: "uid-1".to_string(),
            created_at: ts,
            last_updated_at: ts,
            last_updated_by_firebase_uid: None,
        }
    }

    #[test]
    fn test_into_fields_uses_camel_case_and_fixed_timestamps() {
        let fields = sample_detail().into_fields().unwrap();
        assert_eq!(fields["workspaceIdPg"], 7);
        assert_eq!(fields["creatorFirebaseUid"], "uid-1");
        assert_eq!(fields["createdAt"], "2024-05-01T12:00:00.000Z");
        assert!(fields.get("lastUpdatedByFirebaseUid").is_none());
    }

    #[test]
    fn test_from_fields_accepts_missing_optional_fields() {
        let mut fields = Map::new();
        fields.insert("title".into(), "t".into());
        fields.insert("workspaceIdPg".into(), 3.into());
        fields.insert("creatorFirebaseUid".into(), "u".into());
        fields.insert("createdAt".into(), "2024-05-01T12:00:00.000Z".into());
        fields.insert("lastUpdatedAt".into(), "2024-05-01T12:00:00.000Z".into());
        let detail = TaskDetail::from_fields(fields).unwrap();
        assert_eq!(detail.status, "");
        assert!(detail.expiration_date.is_none());
    }

    #[test]
    fn test_empty_patch_produces_no_update() {
        let patch = TaskPatch::default();
        assert!(patch.to_update_fields("uid", &Utc::now()).is_none());
    }

    #[test]
    fn test_patch_adds_audit_fields() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
        let patch = TaskPatch {
            status: Some("done".to_string()),
            ..Default::default()
        };
        let fields = patch.to_update_fields("uid-9", &now).unwrap();
        assert_eq!(fields["status"], "done");
        assert_eq!(fields[fields::LAST_UPDATED_BY], "uid-9");
        assert_eq!(fields[fields::LAST_UPDATED_AT], "2024-06-01T08:30:00.000Z");
        assert!(fields.get("title").is_none());
    }

    #[test]
    fn test_patch_null_clears_optional_fields() {
        let patch: TaskPatch =
            serde_json::from_str(r#"{"expirationDate": null, "attachment": null}"#).unwrap();
        assert_eq!(patch.expiration_date, Some(None));
        assert_eq!(patch.attachment, Some(None));
        assert!(!patch.is_empty());

        let fields = patch.to_update_fields("uid", &Utc::now()).unwrap();
        assert_eq!(fields["expirationDate"], Value::Null);
        assert_eq!(fields["attachment"], Value::Null);
    }

    #[test]
    fn test_patch_absent_and_set_optional_fields() {
        let absent: TaskPatch = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(absent.expiration_date, None);
        assert_eq!(absent.attachment, None);
        let fields = absent.to_update_fields("uid", &Utc::now()).unwrap();
        assert!(fields.get("expirationDate").is_none());
        assert!(fields.get("attachment").is_none());

        let set: TaskPatch = serde_json::from_str(
            r#"{"expirationDate": "2024-07-01T00:00:00Z", "attachment": {"url": "u"}}"#,
        )
        .unwrap();
        let fields = set.to_update_fields("uid", &Utc::now()).unwrap();
        assert_eq!(fields["expirationDate"], "2024-07-01T00:00:00.000Z");
        assert_eq!(fields["attachment"]["url"], "u");
    }

    #[test]
    fn test_doc_timestamps_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        assert!(format_doc_timestamp(&earlier) < format_doc_timestamp(&later));
    }
}
