//! First-time indexing of the new set.
//!
//! Each new record is rendered and inserted on its own. A record that fails
//! to render or is rejected by the index is logged and skipped; an
//! unreachable index fails the whole step.
//!
//! There is no existence check here. The new set computed by
//! [`upsert_mirror`](crate::mirror::upsert_mirror) is trusted as-is.

use std::collections::BTreeSet;

use crate::error::SyncError;
use crate::models::MirrorRecord;
use crate::render::Renderer;
use crate::store::SearchIndex;

/// Counts from one [`index_new`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub failed: Vec<i64>,
}

/// Renders and inserts every record whose id is in `new_ids`.
pub async fn index_new(
    index: &dyn SearchIndex,
    renderer: &Renderer,
    records: &[MirrorRecord],
    new_ids: &BTreeSet<i64>,
) -> Result<IndexReport, SyncError> {
    let mut report = IndexReport::default();

    for rec in records.iter().filter(|r| new_ids.contains(&r.id)) {
        let doc = match renderer.to_index_document(rec) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(id = rec.id, error = %e, "render failed; record not indexed");
                report.failed.push(rec.id);
                continue;
            }
        };

        match index.insert(std::slice::from_ref(&doc)).await {
            Ok(keys) => {
                tracing::debug!(id = rec.id, pk = ?keys.first(), "indexed");
                report.indexed += 1;
            }
            Err(e) if e.is_connectivity() => return Err(e),
            Err(e) => {
                tracing::warn!(id = rec.id, error = %e, "index insert failed; record skipped");
                report.failed.push(rec.id);
            }
        }
    }

    tracing::info!(
        indexed = report.indexed,
        failed = report.failed.len(),
        "new-record indexing complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Counters, Flags};
    use crate::render::RenderConfig;
    use crate::store::memory::InMemoryIndex;

    fn rec(id: i64) -> MirrorRecord {
        MirrorRecord {
            id,
            link: Some(format!("https://example.vn/tin-tuc/a/{id}")),
            category_name: None,
            title: Some(format!("Bài {id}")),
            header: None,
            body: Some("<p>Nội dung</p>".to_string()),
            author: None,
            flags: Flags::default(),
            counters: Counters::default(),
            created_at: None,
            updated_at: None,
            published_time: None,
            related: vec![],
        }
    }

    #[tokio::test]
    async fn test_only_new_ids_are_indexed() {
        let index = InMemoryIndex::new();
        let renderer = Renderer::new(RenderConfig::default());
        let records = vec![rec(1), rec(2), rec(3)];

        let report = index_new(&index, &renderer, &records, &BTreeSet::from([1, 3]))
            .await
            .unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(index.len(), 2);
        assert!(index.documents_for(2).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_insert_does_not_block_others() {
        let index = InMemoryIndex::new();
        index.fail_insert_for(2);
        let renderer = Renderer::new(RenderConfig::default());
        let records = vec![rec(1), rec(2), rec(3)];

        let report = index_new(&index, &renderer, &records, &BTreeSet::from([1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(report.failed, vec![2]);
    }

    #[tokio::test]
    async fn test_unreachable_index_fails_the_step() {
        let index = InMemoryIndex::new();
        index.set_unreachable(true);
        let renderer = Renderer::new(RenderConfig::default());

        let err = index_new(&index, &renderer, &[rec(1)], &BTreeSet::from([1]))
            .await
            .unwrap_err();
        assert!(err.is_connectivity());
    }
}
