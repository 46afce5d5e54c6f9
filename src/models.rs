//! Data models for extracted articles and the rows written to the database.
//!
//! - [`ReadabilityArticle`]: the structured response of the extraction service
//! - [`ArticleRecord`]: one JSON object of the per-source snapshot file; a
//!   readability response with its source URL attached
//! - [`FieldValue`] / [`FieldMap`]: the column/value pairs handed to the
//!   persistence adapter
//!
//! The readability fields use camelCase names to match the JSON produced by the
//! extraction service, hence the `#[allow(non_snake_case)]` attribute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::CategoryId;

/// Response body of `POST /api/readability`.
///
/// `title`, `textContent` and `content` must be present but may be `null`.
/// Anything else the service returns (byline, excerpt, siteName, ...) is
/// carried along in `extra` so the snapshot keeps the full response.
#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReadabilityArticle {
    /// Article headline.
    #[serde(deserialize_with = "Option::deserialize")]
    pub title: Option<String>,
    /// Plain-text body.
    #[serde(deserialize_with = "Option::deserialize")]
    pub textContent: Option<String>,
    /// Cleaned article HTML.
    #[serde(deserialize_with = "Option::deserialize")]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An article object as recorded in the snapshot file.
///
/// Records written by earlier runs are kept exactly as they were read, so the
/// record is an open JSON object rather than a fixed struct. Identity for
/// deduplication is the `url` key.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ArticleRecord {
    fields: Map<String, Value>,
}

impl ArticleRecord {
    /// Attach the source URL to a readability response.
    pub fn from_readability(article: ReadabilityArticle, url: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("title".into(), Value::from(article.title));
        fields.insert("textContent".into(), Value::from(article.textContent));
        fields.insert("content".into(), Value::from(article.content));
        fields.extend(article.extra);
        // The service never sends `url`, but if it did ours must win.
        fields.insert("url".into(), Value::String(url.into()));
        Self { fields }
    }

    /// Wrap a JSON object read back from a snapshot.
    pub fn from_object(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// The article URL, when the record carries a string `url`.
    pub fn url(&self) -> Option<&str> {
        self.fields.get("url").and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }

    /// Build the `content` table row for this record.
    ///
    /// `created_at` and `updated_at` are both set to `now`; the row id is a
    /// fresh v4 UUID.
    pub fn to_content_row(&self, category_id: Option<&CategoryId>, now: DateTime<Utc>) -> FieldMap {
        let mut row = FieldMap::new();
        row.push("id", FieldValue::Uuid(Uuid::new_v4()));
        row.push(
            "category_id",
            category_id.map(FieldValue::from).unwrap_or(FieldValue::Null),
        );
        row.push("link", self.column("url"));
        row.push("title", self.column("title"));
        row.push("content", self.column("textContent"));
        row.push("html_content", self.column("content"));
        row.push("created_at", FieldValue::Timestamp(now));
        row.push("updated_at", FieldValue::Timestamp(now));
        row
    }

    fn column(&self, key: &str) -> FieldValue {
        match self.fields.get(key) {
            None | Some(Value::Null) => FieldValue::Null,
            Some(Value::String(s)) => FieldValue::Text(s.clone()),
            Some(other) => FieldValue::Text(other.to_string()),
        }
    }
}

/// A single column value for a generic insert.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Null,
}

impl From<&CategoryId> for FieldValue {
    /// Textual ids that are UUIDs bind as `uuid` so they fit a `uuid` column.
    fn from(id: &CategoryId) -> Self {
        match id {
            CategoryId::Number(n) => FieldValue::Integer(*n),
            CategoryId::Text(s) => match Uuid::parse_str(s) {
                Ok(uuid) => FieldValue::Uuid(uuid),
                Err(_) => FieldValue::Text(s.clone()),
            },
        }
    }
}

/// Ordered column/value pairs for one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    fields: Vec<(String, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column` to `value`, replacing an earlier value for the same column.
    pub fn push(&mut self, column: impl Into<String>, value: FieldValue) {
        let column = column.into();
        match self.fields.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(c, v)| (c.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_readability() -> ReadabilityArticle {
        serde_json::from_str(r#"{"title":"T","textContent":"C","content":"<p>C</p>"}"#).unwrap()
    }

    #[test]
    fn test_record_serializes_with_url() {
        let record = ArticleRecord::from_readability(sample_readability(), "http://news.example/a");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "title": "T",
                "textContent": "C",
                "content": "<p>C</p>",
                "url": "http://news.example/a"
            })
        );
        assert_eq!(record.url(), Some("http://news.example/a"));
    }

    #[test]
    fn test_extra_service_fields_are_kept() {
        let article: ReadabilityArticle = serde_json::from_str(
            r#"{"title":"T","textContent":"C","content":"<p>C</p>","byline":"Jane","length":1}"#,
        )
        .unwrap();
        let record = ArticleRecord::from_readability(article, "http://news.example/a");

        assert_eq!(serde_json::to_value(&record).unwrap()["byline"], "Jane");
        let back: ArticleRecord =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let parsed = serde_json::from_str::<ReadabilityArticle>(r#"{"title":"T","content":""}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_null_readability_fields_are_accepted() {
        let article: ReadabilityArticle =
            serde_json::from_str(r#"{"title":null,"textContent":"C","content":null}"#).unwrap();
        assert_eq!(article.title, None);

        let record = ArticleRecord::from_readability(article, "http://news.example/a");
        assert_eq!(serde_json::to_value(&record).unwrap()["title"], Value::Null);

        let row = record.to_content_row(None, Utc::now());
        assert_eq!(row.get("title"), Some(&FieldValue::Null));
        assert_eq!(row.get("html_content"), Some(&FieldValue::Null));
        assert_eq!(row.get("content"), Some(&FieldValue::Text("C".into())));
    }

    #[test]
    fn test_record_keeps_key_order() {
        let article: ReadabilityArticle = serde_json::from_str(
            r#"{"excerpt":"E","title":"T","textContent":"C","content":"<p>C</p>"}"#,
        )
        .unwrap();
        let record = ArticleRecord::from_readability(article, "http://news.example/a");

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.starts_with(r#"{"title":"T","textContent":"C","content":"<p>C</p>","excerpt":"E""#));
        assert!(json.ends_with(r#""url":"http://news.example/a"}"#));
    }

    #[test]
    fn test_content_row_columns() {
        let record = ArticleRecord::from_readability(sample_readability(), "http://news.example/a");
        let now = Utc.with_ymd_and_hms(2025, 5, 6, 14, 30, 0).unwrap();
        let row = record.to_content_row(Some(&CategoryId::Number(7)), now);

        let columns: Vec<&str> = row.iter().map(|(c, _)| c).collect();
        assert_eq!(
            columns,
            [
                "id",
                "category_id",
                "link",
                "title",
                "content",
                "html_content",
                "created_at",
                "updated_at"
            ]
        );
        assert_eq!(row.get("category_id"), Some(&FieldValue::Integer(7)));
        assert_eq!(
            row.get("link"),
            Some(&FieldValue::Text("http://news.example/a".to_string()))
        );
        assert_eq!(row.get("content"), Some(&FieldValue::Text("C".to_string())));
        assert_eq!(
            row.get("html_content"),
            Some(&FieldValue::Text("<p>C</p>".to_string()))
        );
        assert_eq!(row.get("created_at"), Some(&FieldValue::Timestamp(now)));
    }

    #[test]
    fn test_content_row_without_category() {
        let record = ArticleRecord::from_readability(sample_readability(), "http://news.example/a");
        let row = record.to_content_row(None, Utc::now());
        assert_eq!(row.get("category_id"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_uuid_category_id_binds_as_uuid() {
        let raw = "3f2e8b1c-6d4a-4c1e-9a77-0b5d2c9e4f10";
        let record = ArticleRecord::from_readability(sample_readability(), "http://news.example/a");
        let row = record.to_content_row(Some(&CategoryId::Text(raw.into())), Utc::now());

        assert_eq!(
            row.get("category_id"),
            Some(&FieldValue::Uuid(Uuid::parse_str(raw).unwrap()))
        );
        assert_eq!(
            FieldValue::from(&CategoryId::Text("world".into())),
            FieldValue::Text("world".into())
        );
    }

    #[test]
    fn test_field_map_replaces_existing_column() {
        let mut row = FieldMap::new();
        row.push("title", FieldValue::Text("old".into()));
        row.push("title", FieldValue::Text("new".into()));
        assert_eq!(row.len(), 1);
        assert_eq!(row.get("title"), Some(&FieldValue::Text("new".into())));
    }
}
