//! Permalink construction from the category hierarchy.
//!
//! Every article belongs to one category; categories point at their parent
//! up to a top-level category with no parent. The public URL of an article
//! is `{base}/{root}/{leaf}/{item}` where `root` is the slug of the
//! top-level category and `leaf` the slug of the article's own category.
//! When the article sits directly in a top-level category (root == leaf),
//! the default section takes the root's place:
//! `{base}/{default_section}/{leaf}/{item}`.
//!
//! # Example
//!
//! ```rust
//! use article_sync_core::permalink::{Category, CategoryTree, PermalinkBuilder};
//!
//! let tree = CategoryTree::new(vec![
//!     Category { id: 1, parent_id: None, slug: "tin-tuc".into(), name: "Tin tức".into() },
//!     Category { id: 2, parent_id: Some(1), slug: "the-thao".into(), name: "Thể thao".into() },
//! ]);
//! let links = PermalinkBuilder::new("https://example.vn", "tin-tuc");
//! assert_eq!(
//!     links.for_item(&tree, 2, "bai-viet-1").as_deref(),
//!     Some("https://example.vn/tin-tuc/the-thao/bai-viet-1"),
//! );
//! ```

use std::collections::{HashMap, HashSet};

/// One node of the category hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub slug: String,
    pub name: String,
}

/// Category hierarchy indexed by id.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    by_id: HashMap<i64, Category>,
}

impl CategoryTree {
    pub fn new(categories: Vec<Category>) -> Self {
        Self {
            by_id: categories.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn get(&self, id: i64) -> Option<&Category> {
        self.by_id.get(&id)
    }

    /// Walks from `leaf_id` up to the top-level category.
    ///
    /// Returns `(root, leaf)`, or `None` when a category on the way is
    /// missing or the parent links form a cycle.
    pub fn root_and_leaf(&self, leaf_id: i64) -> Option<(&Category, &Category)> {
        let leaf = self.by_id.get(&leaf_id)?;
        let mut seen = HashSet::new();
        let mut current = leaf;
        while let Some(parent_id) = current.parent_id {
            if !seen.insert(current.id) {
                return None;
            }
            current = self.by_id.get(&parent_id)?;
        }
        Some((current, leaf))
    }
}

/// Composes article permalinks.
#[derive(Debug, Clone)]
pub struct PermalinkBuilder {
    base_url: String,
    default_section: String,
}

impl PermalinkBuilder {
    pub fn new(base_url: &str, default_section: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_section: default_section.trim_matches('/').to_string(),
        }
    }

    pub fn compose(&self, root_slug: &str, leaf_slug: &str, item_slug: &str) -> String {
        let section = if root_slug == leaf_slug {
            self.default_section.as_str()
        } else {
            root_slug
        };
        format!("{}/{}/{}/{}", self.base_url, section, leaf_slug, item_slug)
    }

    /// Permalink for an item filed under `category_id`, if its chain resolves.
    pub fn for_item(&self, tree: &CategoryTree, category_id: i64, item_slug: &str) -> Option<String> {
        let (root, leaf) = tree.root_and_leaf(category_id)?;
        Some(self.compose(&root.slug, &leaf.slug, item_slug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: i64, parent_id: Option<i64>, slug: &str) -> Category {
        Category {
            id,
            parent_id,
            slug: slug.to_string(),
            name: slug.to_uppercase(),
        }
    }

    fn tree() -> CategoryTree {
        CategoryTree::new(vec![
            cat(1, None, "tin-tuc"),
            cat(2, Some(1), "the-thao"),
            cat(3, Some(2), "bong-da"),
            cat(4, None, "su-kien"),
        ])
    }

    #[test]
    fn test_root_and_leaf_slugs() {
        let links = PermalinkBuilder::new("https://example.vn/", "tin-tuc");
        assert_eq!(
            links.for_item(&tree(), 2, "bai-viet-1").unwrap(),
            "https://example.vn/tin-tuc/the-thao/bai-viet-1"
        );
    }

    #[test]
    fn test_deep_chain_uses_top_and_own_category() {
        let links = PermalinkBuilder::new("https://example.vn", "tin-tuc");
        assert_eq!(
            links.for_item(&tree(), 3, "tran-dau").unwrap(),
            "https://example.vn/tin-tuc/bong-da/tran-dau"
        );
    }

    #[test]
    fn test_top_level_category_falls_back_to_default_section() {
        let links = PermalinkBuilder::new("https://example.vn", "tin-tuc");
        assert_eq!(
            links.for_item(&tree(), 4, "khai-mac").unwrap(),
            "https://example.vn/tin-tuc/su-kien/khai-mac"
        );
    }

    #[test]
    fn test_missing_category_has_no_permalink() {
        let links = PermalinkBuilder::new("https://example.vn", "tin-tuc");
        assert!(links.for_item(&tree(), 99, "x").is_none());

        let orphan = CategoryTree::new(vec![cat(5, Some(77), "mo-coi")]);
        assert!(links.for_item(&orphan, 5, "x").is_none());
    }

    #[test]
    fn test_cycle_has_no_permalink() {
        let cyclic = CategoryTree::new(vec![cat(1, Some(2), "a"), cat(2, Some(1), "b")]);
        let links = PermalinkBuilder::new("https://example.vn", "tin-tuc");
        assert!(links.for_item(&cyclic, 1, "x").is_none());
    }
}
