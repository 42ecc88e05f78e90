//! Source extraction: raw source rows in, [`SourceRecord`]s out.
//!
//! A [`SourceStore`](crate::store::SourceStore) hands back one
//! [`SourceSnapshot`] per cycle: the published articles, the category
//! hierarchy and the related-items edge list. [`assemble`] joins them in
//! memory:
//!
//! ```text
//! articles ──┬── dedupe by id (last row wins) ── sort by id
//!            │
//! categories ┴── permalink per article ({base}/{root}/{leaf}/{slug})
//!                   │
//! edges ─────────── related items per article, same permalink rule
//! ```
//!
//! Articles whose category chain does not resolve are skipped and counted
//! in [`Extraction::skipped`]. Related items whose chain does not resolve
//! are dropped from the owning record.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDateTime;

use crate::models::{Counters, Flags, RelatedItem, SourceRecord};
use crate::permalink::{Category, CategoryTree, PermalinkBuilder};

/// One published article as stored in the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleRow {
    pub id: i64,
    pub slug: String,
    pub category_id: i64,
    pub title: Option<String>,
    pub header: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub flags: Flags,
    pub counters: Counters,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub published_time: Option<NaiveDateTime>,
}

/// A related-items edge: `article_id` links to `related_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelatedEdge {
    pub article_id: i64,
    pub related_id: i64,
    pub related_title: String,
    pub related_slug: String,
    pub related_category_id: i64,
}

/// Everything read from the source in one cycle.
#[derive(Debug, Clone, Default)]
pub struct SourceSnapshot {
    pub articles: Vec<ArticleRow>,
    pub categories: Vec<Category>,
    pub related: Vec<RelatedEdge>,
}

impl SourceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

/// Result of [`assemble`].
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Records ordered by id, one per distinct source id.
    pub records: Vec<SourceRecord>,
    /// Ids left out because their category chain did not resolve.
    pub skipped: Vec<i64>,
    /// Rows dropped as duplicates of a later row with the same id.
    pub duplicates: usize,
}

/// Joins a snapshot into source records.
pub fn assemble(snapshot: SourceSnapshot, links: &PermalinkBuilder) -> Extraction {
    let SourceSnapshot {
        articles,
        categories,
        related,
    } = snapshot;
    let tree = CategoryTree::new(categories);

    let total_rows = articles.len();
    let mut by_id: BTreeMap<i64, ArticleRow> = BTreeMap::new();
    for row in articles {
        by_id.insert(row.id, row);
    }
    let duplicates = total_rows - by_id.len();
    if duplicates > 0 {
        tracing::warn!(duplicates, "source returned repeated article ids; keeping the last row of each");
    }

    let mut related_by_article = group_related(related, &tree, links);

    let mut records = Vec::with_capacity(by_id.len());
    let mut skipped = Vec::new();
    for (id, row) in by_id {
        let Some(link) = links.for_item(&tree, row.category_id, &row.slug) else {
            tracing::warn!(
                id,
                category_id = row.category_id,
                "category chain does not resolve; article skipped"
            );
            skipped.push(id);
            continue;
        };
        let category_name = tree.get(row.category_id).map(|c| c.name.clone());
        records.push(SourceRecord {
            id,
            link,
            category_name,
            title: row.title,
            header: row.header,
            body: row.body,
            author: row.author,
            flags: row.flags,
            counters: row.counters,
            created_at: row.created_at,
            updated_at: row.updated_at,
            published_time: row.published_time,
            related: related_by_article.remove(&id).unwrap_or_default(),
        });
    }

    Extraction {
        records,
        skipped,
        duplicates,
    }
}

/// Groups edges per article, ordered by related id whatever order the
/// source returned them in.
fn group_related(
    mut edges: Vec<RelatedEdge>,
    tree: &CategoryTree,
    links: &PermalinkBuilder,
) -> HashMap<i64, Vec<RelatedItem>> {
    edges.sort_by_key(|edge| (edge.article_id, edge.related_id));
    let mut seen = HashSet::new();
    let mut grouped: HashMap<i64, Vec<RelatedItem>> = HashMap::new();
    for edge in edges {
        if !seen.insert((edge.article_id, edge.related_id)) {
            continue;
        }
        match links.for_item(tree, edge.related_category_id, &edge.related_slug) {
            Some(link) => grouped.entry(edge.article_id).or_default().push(RelatedItem {
                title: edge.related_title,
                link,
            }),
            None => tracing::debug!(
                article_id = edge.article_id,
                related_id = edge.related_id,
                "related item has no permalink; dropped"
            ),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: i64, parent_id: Option<i64>, slug: &str, name: &str) -> Category {
        Category {
            id,
            parent_id,
            slug: slug.to_string(),
            name: name.to_string(),
        }
    }

    fn article(id: i64, category_id: i64, slug: &str, title: &str) -> ArticleRow {
        ArticleRow {
            id,
            slug: slug.to_string(),
            category_id,
            title: Some(title.to_string()),
            ..ArticleRow::default()
        }
    }

    fn snapshot() -> SourceSnapshot {
        SourceSnapshot {
            articles: vec![
                article(2, 2, "bai-2", "Hai"),
                article(1, 2, "bai-1", "Một"),
            ],
            categories: vec![
                cat(1, None, "tin-tuc", "Tin tức"),
                cat(2, Some(1), "the-thao", "Thể thao"),
            ],
            related: vec![],
        }
    }

    fn links() -> PermalinkBuilder {
        PermalinkBuilder::new("https://example.vn", "tin-tuc")
    }

    #[test]
    fn test_records_sorted_with_links_and_category() {
        let out = assemble(snapshot(), &links());
        let ids: Vec<i64> = out.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(out.records[0].link, "https://example.vn/tin-tuc/the-thao/bai-1");
        assert_eq!(out.records[0].category_name.as_deref(), Some("Thể thao"));
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn test_repeated_id_keeps_last_row() {
        let mut snap = snapshot();
        snap.articles.push(article(1, 2, "bai-1", "Một (sửa)"));
        let out = assemble(snap, &links());
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.duplicates, 1);
        assert_eq!(out.records[0].title.as_deref(), Some("Một (sửa)"));
    }

    #[test]
    fn test_unresolvable_category_is_skipped() {
        let mut snap = snapshot();
        snap.articles.push(article(3, 99, "lac", "Lạc"));
        let out = assemble(snap, &links());
        assert_eq!(out.skipped, vec![3]);
        assert!(out.records.iter().all(|r| r.id != 3));
    }

    #[test]
    fn test_related_items_joined_and_deduplicated() {
        let mut snap = snapshot();
        let edge = RelatedEdge {
            article_id: 1,
            related_id: 2,
            related_title: "Hai".to_string(),
            related_slug: "bai-2".to_string(),
            related_category_id: 2,
        };
        snap.related = vec![
            edge.clone(),
            edge,
            RelatedEdge {
                article_id: 1,
                related_id: 5,
                related_title: "Mất".to_string(),
                related_slug: "mat".to_string(),
                related_category_id: 42,
            },
        ];
        let out = assemble(snap, &links());
        assert_eq!(
            out.records[0].related,
            vec![RelatedItem {
                title: "Hai".to_string(),
                link: "https://example.vn/tin-tuc/the-thao/bai-2".to_string(),
            }]
        );
        assert!(out.records[1].related.is_empty());
    }

    #[test]
    fn test_related_items_follow_related_id_order() {
        let edge = |related_id: i64| RelatedEdge {
            article_id: 1,
            related_id,
            related_title: format!("Bài {related_id}"),
            related_slug: format!("bai-{related_id}"),
            related_category_id: 2,
        };
        let mut forward = snapshot();
        forward.related = vec![edge(2), edge(7)];
        let mut backward = snapshot();
        backward.related = vec![edge(7), edge(2)];

        let a = assemble(forward, &links());
        let b = assemble(backward, &links());
        assert_eq!(a.records[0].related, b.records[0].related);
        assert_eq!(a.records[0].related[0].title, "Bài 2");
    }

    #[test]
    fn test_empty_snapshot() {
        let out = assemble(SourceSnapshot::default(), &links());
        assert!(out.records.is_empty());
        assert!(SourceSnapshot::default().is_empty());
    }
}
