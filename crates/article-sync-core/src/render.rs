//! Render transform shared by first-time indexing and reconciliation.
//!
//! Turns a mirror row into the document the search index should hold: a
//! normalized text (title heading, header heading, author line, then the
//! article body converted from HTML) plus flat metadata. Both the indexer and
//! the differ go through [`Renderer::to_index_document`], so a record that
//! has not changed always renders to the same document.
//!
//! # Body conversion
//!
//! 1. Hyperlinks whose `href` is longer than `max_url_len` are unwrapped:
//!    the anchor text stays, the link goes.
//! 2. Images without a `src`, or with a `src` longer than `max_url_len`,
//!    are removed. Root-relative sources are resolved against
//!    `base_domain` and the length is checked again on the absolute URL.
//!    Surviving images are kept as `![alt](url)`.
//! 3. The cleaned HTML is converted to text with `html2text`, blank and
//!    non-breaking-space-only paragraphs are dropped, and repeated
//!    paragraphs are kept only once.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use url::Url;

use crate::canonical::format_timestamp;
use crate::error::SyncError;
use crate::models::{IndexDocument, IndexMetadata, MirrorRecord};

/// Line width handed to `html2text`; wide enough that it never wraps a kept URL.
const RENDER_WIDTH: usize = 4096;

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Domain used to resolve root-relative image sources.
    pub base_domain: String,
    /// Longest URL kept in rendered output.
    pub max_url_len: usize,
    /// Label of the author line.
    pub author_label: String,
    /// Author shown when the record has none.
    pub unknown_author: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            base_domain: "https://nguoidonghanh.viettel.vn".to_string(),
            max_url_len: 300,
            author_label: "Tác giả".to_string(),
            unknown_author: "không xác định".to_string(),
        }
    }
}

/// Renders mirror rows into index documents.
#[derive(Debug, Clone)]
pub struct Renderer {
    config: RenderConfig,
    base: Option<Url>,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        let base = Url::parse(&config.base_domain).ok();
        if base.is_none() {
            tracing::warn!(
                base_domain = %config.base_domain,
                "render base domain is not a valid URL; root-relative images will be dropped"
            );
        }
        Self { config, base }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Builds the document the index should hold for `rec`.
    ///
    /// The returned document has no `pk`; callers that patch an existing
    /// entity copy the key over from the index side.
    pub fn to_index_document(&self, rec: &MirrorRecord) -> Result<IndexDocument, SyncError> {
        let text = self
            .render_text(
                rec.title.as_deref(),
                rec.header.as_deref(),
                rec.author.as_deref(),
                rec.body.as_deref().unwrap_or(""),
            )
            .map_err(|e| SyncError::per_record(rec.id, e))?;

        let related_json = serde_json::to_string_pretty(&rec.related)
            .map_err(|e| SyncError::per_record(rec.id, format!("related items: {e}")))?;

        let metadata = IndexMetadata {
            source_id: rec.id,
            title: rec.title.clone().unwrap_or_default(),
            header: rec.header.clone().unwrap_or_default(),
            author: rec.author.clone().unwrap_or_default(),
            category_name: rec.category_name.clone().unwrap_or_default(),
            link: rec.link.clone().unwrap_or_default(),
            created_at: format_timestamp(rec.created_at),
            updated_at: format_timestamp(rec.updated_at),
            published_time: format_timestamp(rec.published_time),
            related_json,
            is_comment: rec.flags.is_comment.into(),
            is_active: rec.flags.is_active.into(),
            is_hot: rec.flags.is_hot.into(),
            is_important: rec.flags.is_important.into(),
            is_top: rec.flags.is_top.into(),
            has_video: rec.flags.has_video.into(),
            comment_count: rec.counters.comment_count,
            like_count: rec.counters.like_count,
            dislike_count: rec.counters.dislike_count,
            hit_count: rec.counters.hit_count,
        };

        Ok(IndexDocument {
            pk: None,
            text,
            metadata,
        })
    }

    /// Heading lines followed by the converted body.
    pub fn render_text(
        &self,
        title: Option<&str>,
        header: Option<&str>,
        author: Option<&str>,
        body_html: &str,
    ) -> Result<String, String> {
        let author = match author.map(str::trim) {
            Some(a) if !a.is_empty() => a,
            _ => self.config.unknown_author.as_str(),
        };
        let body = self.render_body(body_html)?;
        Ok(format!(
            "# {}\n\n## {}\n\n{}: {}\n\n{}",
            title.unwrap_or(""),
            header.unwrap_or(""),
            self.config.author_label,
            author,
            body
        ))
    }

    /// Converts an HTML body into normalized text.
    pub fn render_body(&self, html: &str) -> Result<String, String> {
        if html.trim().is_empty() {
            return Ok(String::new());
        }
        let cleaned = self.filter_images(&self.filter_links(html));
        let text = html2text::from_read(cleaned.as_bytes(), RENDER_WIDTH)
            .map_err(|e| format!("html conversion failed: {e}"))?;
        Ok(normalize_paragraphs(&text))
    }

    fn filter_links(&self, html: &str) -> String {
        anchor_re()
            .replace_all(html, |caps: &Captures| {
                match attribute(&caps[1], "href") {
                    Some(href) if href.len() > self.config.max_url_len => caps[2].to_string(),
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn filter_images(&self, html: &str) -> String {
        image_re()
            .replace_all(html, |caps: &Captures| {
                let attrs = &caps[1];
                let Some(src) = attribute(attrs, "src").filter(|s| !s.trim().is_empty()) else {
                    return String::new();
                };
                let Some(url) = self.resolve_image(src.trim()) else {
                    return String::new();
                };
                let alt = attribute(attrs, "caption")
                    .or_else(|| attribute(attrs, "alt"))
                    .unwrap_or_default();
                format!(
                    "<span>![{}]({})</span>",
                    escape_html(alt.trim()),
                    escape_html(&url)
                )
            })
            .into_owned()
    }

    /// Absolute image URL, or `None` when the image must be dropped.
    fn resolve_image(&self, src: &str) -> Option<String> {
        let max = self.config.max_url_len;
        if src.len() > max {
            return None;
        }
        let resolved = if src.starts_with('/') {
            self.base.as_ref()?.join(src).ok()?.to_string()
        } else {
            Url::parse(src)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| src.to_string())
        };
        (resolved.len() <= max).then_some(resolved)
    }
}

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").unwrap())
}

fn image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<img\b([^>]*)>").unwrap())
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
            .unwrap()
    })
}

/// Value of attribute `name` inside a tag's attribute string, entity-decoded.
fn attribute(attrs: &str, name: &str) -> Option<String> {
    attribute_re().captures_iter(attrs).find_map(|caps| {
        if !caps[1].eq_ignore_ascii_case(name) {
            return None;
        }
        let raw = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
            .unwrap_or("");
        Some(decode_entities(raw))
    })
}

fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn normalize_paragraphs(text: &str) -> String {
    let mut seen = HashSet::new();
    let mut parts: Vec<String> = Vec::new();
    for para in text.split("\n\n") {
        let para = para
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        let para = para.trim();
        if para.chars().all(|c| c.is_whitespace() || c == '\u{a0}') {
            continue;
        }
        if seen.insert(para.to_string()) {
            parts.push(para.to_string());
        }
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Counters, Flags, RelatedItem};
    use chrono::{TimeZone, Utc};

    fn renderer() -> Renderer {
        Renderer::new(RenderConfig {
            base_domain: "https://example.vn".to_string(),
            ..RenderConfig::default()
        })
    }

    #[test]
    fn test_long_href_is_unwrapped() {
        let href = format!("https://example.vn/{}", "x".repeat(400));
        let html = format!("<p>Xem <a href=\"{}\">chi tiết tại đây</a> nhé</p>", href);
        let out = renderer().render_body(&html).unwrap();
        assert!(out.contains("chi tiết tại đây"), "got: {}", out);
        assert!(!out.contains(&href));
        assert!(!out.contains("xxxxxxxxxx"));
    }

    #[test]
    fn test_short_href_keeps_anchor_markup() {
        let r = renderer();
        let html = "<p><a href=\"https://example.vn/a\">ok</a></p>";
        assert_eq!(r.filter_links(html), html);
    }

    #[test]
    fn test_resolved_image_over_limit_is_omitted() {
        let src = format!("/images/{}.jpg", "p".repeat(285));
        assert!(src.len() <= 300);
        let html = format!(
            "<p>Mở đầu</p><p><img src=\"{}\" alt=\"anh-qua-dai\"></p><p>Kết</p>",
            src
        );
        let out = renderer().render_body(&html).unwrap();
        assert!(!out.contains("anh-qua-dai"), "got: {}", out);
        assert!(!out.contains("pppppppppp"));
        assert!(out.contains("Mở đầu"));
        assert!(out.contains("Kết"));
    }

    #[test]
    fn test_root_relative_image_is_resolved() {
        let out = renderer()
            .render_body("<p><img src=\"/images/logo.png\" alt=\"logo\"></p>")
            .unwrap();
        assert!(
            out.contains("![logo](https://example.vn/images/logo.png)"),
            "got: {}",
            out
        );
    }

    #[test]
    fn test_image_without_src_is_dropped() {
        let out = renderer()
            .render_body("<p>Chữ <img alt=\"khong-nguon\"></p>")
            .unwrap();
        assert!(!out.contains("khong-nguon"));
        assert!(out.contains("Chữ"));
    }

    #[test]
    fn test_caption_preferred_over_alt() {
        let r = renderer();
        let cleaned =
            r.filter_images("<img src=\"https://cdn.vn/a.png\" alt=\"alt\" caption=\"chu thich\">");
        assert_eq!(cleaned, "<span>![chu thich](https://cdn.vn/a.png)</span>");
    }

    #[test]
    fn test_repeated_and_blank_paragraphs_are_dropped() {
        let out = normalize_paragraphs("Một\n\n\u{a0}\n\nHai\n\nMột\n\n   \n\nBa");
        assert_eq!(out, "Một\n\nHai\n\nBa");
    }

    #[test]
    fn test_render_text_layout() {
        let text = renderer()
            .render_text(Some("Tiêu đề"), Some("Sapo"), None, "")
            .unwrap();
        assert_eq!(
            text,
            "# Tiêu đề\n\n## Sapo\n\nTác giả: không xác định\n\n"
        );
    }

    #[test]
    fn test_index_document_metadata_shape() {
        let rec = MirrorRecord {
            id: 42,
            link: Some("https://example.vn/tin-tuc/the-thao/a".to_string()),
            category_name: Some("Thể thao".to_string()),
            title: Some("A".to_string()),
            header: None,
            body: Some("<p>Nội dung</p>".to_string()),
            author: Some("Lan".to_string()),
            flags: Flags {
                is_hot: true,
                ..Flags::default()
            },
            counters: Counters {
                hit_count: 10,
                ..Counters::default()
            },
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            updated_at: None,
            published_time: None,
            related: vec![RelatedItem {
                title: "B".to_string(),
                link: "https://example.vn/tin-tuc/b".to_string(),
            }],
        };
        let doc = renderer().to_index_document(&rec).unwrap();
        assert_eq!(doc.pk, None);
        assert!(doc.text.starts_with("# A\n\n## \n\nTác giả: Lan\n\n"));
        assert!(doc.text.contains("Nội dung"));
        assert_eq!(doc.metadata.source_id, 42);
        assert_eq!(doc.metadata.created_at, "2024-01-01T00:00:00+00:00");
        assert_eq!(doc.metadata.updated_at, "");
        assert_eq!(doc.metadata.is_hot, 1);
        assert_eq!(doc.metadata.is_top, 0);
        assert_eq!(doc.metadata.hit_count, 10);
        let related: serde_json::Value = serde_json::from_str(&doc.metadata.related_json).unwrap();
        assert_eq!(related[0]["title"], "B");
    }
}
