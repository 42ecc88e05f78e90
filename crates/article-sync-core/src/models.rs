//! Core data models used throughout article-sync.
//!
//! A record moves through three shapes: [`SourceRecord`] (one extraction
//! cycle), [`MirrorRecord`] (one row of the relational mirror) and
//! [`IndexDocument`] (one entity in the search index). The source id is the
//! only identity shared by all three.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A related article attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedItem {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub link: String,
}

/// Editorial flags carried by every article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub is_comment: bool,
    pub is_active: bool,
    pub is_hot: bool,
    pub is_important: bool,
    pub is_top: bool,
    pub has_video: bool,
}

/// Engagement counters carried by every article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub comment_count: i64,
    pub like_count: i64,
    pub dislike_count: i64,
    pub hit_count: i64,
}

/// Snapshot of one published article as read from the source store.
///
/// Built by the extractor once per cycle and folded into a
/// [`MirrorRecord`] right after.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: i64,
    pub link: String,
    pub category_name: Option<String>,
    pub title: Option<String>,
    pub header: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub flags: Flags,
    pub counters: Counters,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub published_time: Option<NaiveDateTime>,
    pub related: Vec<RelatedItem>,
}

/// One row of the mirror table, keyed by source id.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorRecord {
    pub id: i64,
    pub link: Option<String>,
    pub category_name: Option<String>,
    pub title: Option<String>,
    pub header: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub flags: Flags,
    pub counters: Counters,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub published_time: Option<DateTime<Utc>>,
    pub related: Vec<RelatedItem>,
}

impl From<SourceRecord> for MirrorRecord {
    /// Source timestamps carry no zone; they are stored in the mirror as UTC.
    fn from(rec: SourceRecord) -> Self {
        MirrorRecord {
            id: rec.id,
            link: Some(rec.link),
            category_name: rec.category_name,
            title: rec.title,
            header: rec.header,
            body: rec.body,
            author: rec.author,
            flags: rec.flags,
            counters: rec.counters,
            created_at: rec.created_at.map(|t| t.and_utc()),
            updated_at: rec.updated_at.map(|t| t.and_utc()),
            published_time: rec.published_time.map(|t| t.and_utc()),
            related: rec.related,
        }
    }
}

/// A document as stored in the search index.
///
/// `pk` is assigned by the index on insert and is unrelated to the source
/// id; the source id lives in [`IndexMetadata::source_id`] and is what
/// lookups resolve against.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub pk: Option<i64>,
    pub text: String,
    pub metadata: IndexMetadata,
}

/// Flat metadata stored next to the indexed text.
///
/// Field names are the index schema's field names. Nullable index fields
/// decode to their empty value so that both comparison sides agree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub source_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub header: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub link: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub published_time: String,
    /// Related items serialized as JSON text.
    #[serde(default, deserialize_with = "null_as_default")]
    pub related_json: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_comment: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_active: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_hot: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_important: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_top: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_video: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comment_count: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub like_count: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dislike_count: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hit_count: i64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
