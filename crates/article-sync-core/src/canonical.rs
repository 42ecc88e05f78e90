//! Canonical form used to compare a rendered document with the index's copy.
//!
//! The mirror side and the index side serialize the same values differently:
//! the mirror renders timestamps with a UTC offset while older index entries
//! may hold naive timestamps, and the related-items aggregate is JSON text
//! whose formatting is not significant. Both sides are parsed into a
//! [`CanonicalRecord`] (structured aggregate, timezone-naive timestamps)
//! before any field is compared.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::models::IndexMetadata;

/// Serializes a mirror timestamp the way it is stored in the index.
///
/// `None` becomes the empty string.
pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, false))
        .unwrap_or_default()
}

/// Parses an index timestamp into a timezone-naive instant.
///
/// Offsets are dropped without conversion: `2024-01-01T00:00:00+07:00` and
/// `2024-01-01T00:00:00` are the same canonical instant. The empty string is
/// `None`.
pub fn parse_timestamp(s: &str) -> Result<Option<NaiveDateTime>, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.naive_local()));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Some(naive));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(Some(dt.naive_local()));
        }
    }
    Err(format!("unparseable timestamp '{}'", s))
}

/// Metadata fields in comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    SourceId,
    Title,
    Header,
    Author,
    CategoryName,
    Link,
    CreatedAt,
    UpdatedAt,
    PublishedTime,
    RelatedJson,
    IsComment,
    IsActive,
    IsHot,
    IsImportant,
    IsTop,
    HasVideo,
    CommentCount,
    LikeCount,
    DislikeCount,
    HitCount,
}

impl MetadataField {
    /// Index schema field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataField::SourceId => "source_id",
            MetadataField::Title => "title",
            MetadataField::Header => "header",
            MetadataField::Author => "author",
            MetadataField::CategoryName => "category_name",
            MetadataField::Link => "link",
            MetadataField::CreatedAt => "created_at",
            MetadataField::UpdatedAt => "updated_at",
            MetadataField::PublishedTime => "published_time",
            MetadataField::RelatedJson => "related_json",
            MetadataField::IsComment => "is_comment",
            MetadataField::IsActive => "is_active",
            MetadataField::IsHot => "is_hot",
            MetadataField::IsImportant => "is_important",
            MetadataField::IsTop => "is_top",
            MetadataField::HasVideo => "has_video",
            MetadataField::CommentCount => "comment_count",
            MetadataField::LikeCount => "like_count",
            MetadataField::DislikeCount => "dislike_count",
            MetadataField::HitCount => "hit_count",
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized metadata, comparable across the mirror and index paths.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub source_id: i64,
    pub title: String,
    pub header: String,
    pub author: String,
    pub category_name: String,
    pub link: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub published_time: Option<NaiveDateTime>,
    pub related: serde_json::Value,
    pub flags: [i32; 6],
    pub counters: [i64; 4],
}

impl CanonicalRecord {
    pub fn from_metadata(meta: &IndexMetadata) -> Result<Self, String> {
        let related = if meta.related_json.trim().is_empty() {
            serde_json::Value::Array(Vec::new())
        } else {
            serde_json::from_str(&meta.related_json)
                .map_err(|e| format!("related_json is not valid JSON: {}", e))?
        };
        Ok(Self {
            source_id: meta.source_id,
            title: meta.title.clone(),
            header: meta.header.clone(),
            author: meta.author.clone(),
            category_name: meta.category_name.clone(),
            link: meta.link.clone(),
            created_at: parse_timestamp(&meta.created_at)?,
            updated_at: parse_timestamp(&meta.updated_at)?,
            published_time: parse_timestamp(&meta.published_time)?,
            related,
            flags: [
                meta.is_comment,
                meta.is_active,
                meta.is_hot,
                meta.is_important,
                meta.is_top,
                meta.has_video,
            ],
            counters: [
                meta.comment_count,
                meta.like_count,
                meta.dislike_count,
                meta.hit_count,
            ],
        })
    }

    /// First field, in [`MetadataField`] order, whose values differ.
    pub fn first_mismatch(&self, other: &Self) -> Option<MetadataField> {
        use MetadataField::*;

        if self.source_id != other.source_id {
            return Some(SourceId);
        }
        let text_fields = [
            (Title, &self.title, &other.title),
            (Header, &self.header, &other.header),
            (Author, &self.author, &other.author),
            (CategoryName, &self.category_name, &other.category_name),
            (Link, &self.link, &other.link),
        ];
        if let Some((field, _, _)) = text_fields.iter().find(|(_, a, b)| a != b) {
            return Some(*field);
        }
        let time_fields = [
            (CreatedAt, self.created_at, other.created_at),
            (UpdatedAt, self.updated_at, other.updated_at),
            (PublishedTime, self.published_time, other.published_time),
        ];
        if let Some((field, _, _)) = time_fields.iter().find(|(_, a, b)| a != b) {
            return Some(*field);
        }
        if self.related != other.related {
            return Some(RelatedJson);
        }
        let flag_fields = [IsComment, IsActive, IsHot, IsImportant, IsTop, HasVideo];
        if let Some(i) = (0..flag_fields.len()).find(|&i| self.flags[i] != other.flags[i]) {
            return Some(flag_fields[i]);
        }
        let counter_fields = [CommentCount, LikeCount, DislikeCount, HitCount];
        (0..counter_fields.len())
            .find(|&i| self.counters[i] != other.counters[i])
            .map(|i| counter_fields[i])
    }
}
