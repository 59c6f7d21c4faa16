//! Types exchanged with the storage service.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Metadata for one stored object, as returned by the listing and metadata endpoints.  This is a
/// snapshot of server state at the time of the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptor {
    pub id: String,

    /// Object type, such as `callrecording` or `voicemail`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_state: Option<String>,

    /// Creation time exactly as reported by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_bytes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_type: Option<String>,

    /// Any other fields reported by the server
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Parameters for a listing request.  The filter expression uses the server's syntax, for
/// example `type==callrecording,name==+1`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub filter: String,
    pub sort_field: String,
    pub sort_direction: SortDirection,
    /// Maximum number of items per page (the `limit` parameter)
    pub page_size: u32,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            filter: String::new(),
            sort_field: "createdTime".to_owned(),
            sort_direction: SortDirection::Desc,
            page_size: 100,
        }
    }
}

impl ListingQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn sort<S: Into<String>>(mut self, field: S, direction: SortDirection) -> Self {
        self.sort_field = field.into();
        self.sort_direction = direction;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Position of a page within a listing.  The cursor only advances by the number of items a
/// page actually carried, so it stays correct if the page size differs between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageCursor(u64);

impl PageCursor {
    /// The cursor for the first page.
    pub fn start() -> Self {
        Self(0)
    }

    /// The cursor following the given page.
    pub fn after(self, page: &Page) -> Self {
        Self(self.0 + page.content.len() as u64)
    }

    /// The `pageKey` value to send for this cursor.
    pub fn page_key(&self) -> String {
        self.0.to_string()
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub content: Vec<ObjectDescriptor>,
    pub last_page: bool,
}

/// Status of one zip artifact produced by a bulk download request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactStatus {
    NotStarted,
    InProgress,
    Done,
    Failed,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactStatus::NotStarted => "NOT_STARTED",
            ArtifactStatus::InProgress => "IN_PROGRESS",
            ArtifactStatus::Done => "DONE",
            ArtifactStatus::Failed => "FAILED",
            ArtifactStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// One entry of a bulk download start or status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEntry {
    pub zip_name: String,
    pub status: ArtifactStatus,
}

impl BulkEntry {
    pub fn new<S: Into<String>>(zip_name: S, status: ArtifactStatus) -> Self {
        Self {
            zip_name: zip_name.into(),
            status,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_from_listing_json() {
        let d: ObjectDescriptor = serde_json::from_value(json!({
            "id": "abc",
            "type": "callrecording",
            "mimeType": "audio/wav",
            "createdTime": "2023-01-02T03:04:05Z",
            "storedBytes": 1234,
            "checksum": "d41d8cd98f00b204e9800998ecf8427e",
            "bucketId": 7,
        }))
        .unwrap();
        assert_eq!(d.id, "abc");
        assert_eq!(d.object_type.as_deref(), Some("callrecording"));
        assert_eq!(d.mime_type.as_deref(), Some("audio/wav"));
        assert_eq!(d.stored_bytes, Some(1234));
        assert_eq!(d.extra.get("bucketId"), Some(&json!(7)));
    }

    #[test]
    fn descriptor_requires_id() {
        assert!(serde_json::from_value::<ObjectDescriptor>(json!({"type": "x"})).is_err());
    }

    #[test]
    fn page_requires_last_page() {
        assert!(serde_json::from_value::<Page>(json!({"content": []})).is_err());
        assert!(serde_json::from_value::<Page>(json!({"lastPage": true})).is_err());
    }

    #[test]
    fn cursor_advances_by_items_received() {
        let page: Page = serde_json::from_value(json!({
            "content": [{"id": "a"}, {"id": "b"}, {"id": "c"}],
            "lastPage": false,
        }))
        .unwrap();
        let cursor = PageCursor::start().after(&page);
        assert_eq!(cursor.page_key(), "3");
        assert_eq!(cursor.after(&page).page_key(), "6");
    }

    #[test]
    fn bulk_entries_parse_statuses() {
        let entries: Vec<BulkEntry> = serde_json::from_value(json!([
            {"zipName": "a.zip", "status": "DONE"},
            {"zipName": "b.zip", "status": "NOT_STARTED"},
            {"zipName": "c.zip", "status": "IN_PROGRESS"},
            {"zipName": "d.zip", "status": "FAILED"},
            {"zipName": "e.zip", "status": "SOMETHING_NEW"},
        ]))
        .unwrap();
        let statuses: Vec<_> = entries.iter().map(|e| e.status.clone()).collect();
        assert_eq!(
            statuses,
            vec![
                ArtifactStatus::Done,
                ArtifactStatus::NotStarted,
                ArtifactStatus::InProgress,
                ArtifactStatus::Failed,
                ArtifactStatus::Unknown,
            ]
        );
    }

    #[test]
    fn listing_query_defaults() {
        let q = ListingQuery::new().filter("type==voicemail");
        assert_eq!(q.sort_field, "createdTime");
        assert_eq!(q.sort_direction.as_str(), "DESC");
        assert_eq!(q.page_size, 100);
        assert_eq!(q.filter, "type==voicemail");
    }
}
